pub mod attributes;
pub mod block;
pub mod config;
pub mod inline;
pub mod lint;
pub mod marker;
pub mod pass;

pub use block::{BlockRewriter, rewrite_blocks};
pub use config::{ConfigError, RewriteConfig, Styles, UnclosedDebug, WhenPrecedence};
pub use inline::rewrite_inlines;
pub use lint::check_markers;
pub use pass::rewrite_document;
