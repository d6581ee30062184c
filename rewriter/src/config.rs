use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {config_path}: {source}")]
    Read {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {config_path}: {source}")]
    Parse {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Which attribute supplies the timestamp when an `<obs>` tag carries both
/// `time=` and `date=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhenPrecedence {
    #[default]
    Time,
    Date,
}

/// What happens to an `<err>` scope still open at the end of its block sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclosedDebug {
    /// Drop the open marker and everything accumulated after it.
    #[default]
    Discard,
    /// Emit the open marker and the accumulated content unchanged.
    Literal,
}

/// Presentation table shared by both rewriters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Styles {
    pub annotation_prefix: String,
    pub annotation_body: String,
    pub debug_label: String,
    pub debug_label_style: String,
    pub debug_body: String,
    pub debug_outer: String,
}

impl Styles {
    pub const ANNOTATION_PREFIX: &'static str = "font-size:85%; color:green;";
    pub const ANNOTATION_BODY: &'static str = "color:blue;";
    pub const DEBUG_LABEL: &'static str = "DEBUG:";
    pub const DEBUG_LABEL_STYLE: &'static str = "color:grey;";
    pub const DEBUG_BODY: &'static str = "margin-left:1em;";
    pub const DEBUG_OUTER: &'static str = "border-left:2px solid grey; padding-left:0.5em; margin:0.5em 0;";
}

impl Default for Styles {
    fn default() -> Self {
        Styles {
            annotation_prefix: Self::ANNOTATION_PREFIX.to_string(),
            annotation_body: Self::ANNOTATION_BODY.to_string(),
            debug_label: Self::DEBUG_LABEL.to_string(),
            debug_label_style: Self::DEBUG_LABEL_STYLE.to_string(),
            debug_body: Self::DEBUG_BODY.to_string(),
            debug_outer: Self::DEBUG_OUTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    pub when_precedence: WhenPrecedence,
    pub unclosed_debug: UnclosedDebug,
    pub styles: Styles,
}

impl RewriteConfig {
    /// Name of the config file picked up next to an input document.
    pub const FILE_NAME: &'static str = "obsmark.toml";

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();

        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            config_path: config_path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            config_path: config_path.to_path_buf(),
            source,
        })
    }

    /// Load `obsmark.toml` from `dir` if present, otherwise the defaults.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let candidate = dir.as_ref().join(Self::FILE_NAME);
        if candidate.is_file() {
            log::debug!("using config {}", candidate.display());
            Self::load_from_path(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}
