use thiserror::Error;

use crate::config::WhenPrecedence;

/// Attributes carried by an `<obs>` open tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub author: Option<String>,
    pub when: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("unknown attribute `{0}`")]
    UnknownKey(String),
    #[error("attribute `{0}` given more than once")]
    DuplicateKey(String),
    #[error("attribute `{0}` has no `=`")]
    MissingEquals(String),
    #[error("value of `{0}` is not double-quoted")]
    UnquotedValue(String),
    #[error("value of `{0}` has no closing quote")]
    UnterminatedValue(String),
    #[error("expected whitespace after the value of `{0}`")]
    MissingSeparator(String),
}

impl Attributes {
    /// Text of the prefix span: `"when author:"`, `"when:"` or `"author:"`.
    /// None when neither attribute is present.
    pub fn prefix_text(&self) -> Option<String> {
        let parts: Vec<&str> = [self.when.as_deref(), self.author.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("{}:", parts.join(" ")))
        }
    }
}

/// Parse the attribute text of an `<obs ...>` tag: whitespace-separated
/// `key="value"` pairs with keys `author`, `time` and `date`.
///
/// Empty values count as absent. Any deviation from the grammar rejects the
/// whole tag.
pub fn parse_attributes(text: &str, precedence: WhenPrecedence) -> Result<Attributes, AttributeError> {
    let mut author = None;
    let mut time = None;
    let mut date = None;

    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];

        let slot = match key {
            "author" => &mut author,
            "time" => &mut time,
            "date" => &mut date,
            _ => return Err(AttributeError::UnknownKey(key.to_string())),
        };

        let after_eq = rest[key_end..]
            .strip_prefix('=')
            .ok_or_else(|| AttributeError::MissingEquals(key.to_string()))?;
        let quoted = after_eq
            .strip_prefix('"')
            .ok_or_else(|| AttributeError::UnquotedValue(key.to_string()))?;
        let close = quoted
            .find('"')
            .ok_or_else(|| AttributeError::UnterminatedValue(key.to_string()))?;

        if slot.is_some() {
            return Err(AttributeError::DuplicateKey(key.to_string()));
        }
        *slot = Some(quoted[..close].to_string());

        rest = &quoted[close + 1..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Err(AttributeError::MissingSeparator(key.to_string()));
        }
    }

    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (time, date) = (non_empty(time), non_empty(date));
    let when = match precedence {
        WhenPrecedence::Time => time.or(date),
        WhenPrecedence::Date => date.or(time),
    };

    Ok(Attributes {
        author: non_empty(author),
        when,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn attrs(author: Option<&str>, when: Option<&str>) -> Attributes {
        Attributes {
            author: author.map(str::to_string),
            when: when.map(str::to_string),
        }
    }

    #[rstest]
    #[case("", attrs(None, None))]
    #[case(" author=\"A\"", attrs(Some("A"), None))]
    #[case(" date=\"1/1/20\"", attrs(None, Some("1/1/20")))]
    #[case(" time=\"noon\"", attrs(None, Some("noon")))]
    #[case(" time=\"T\" author=\"A\"", attrs(Some("A"), Some("T")))]
    #[case(" author=\"A\"   date=\"D\" ", attrs(Some("A"), Some("D")))]
    #[case(" author=\"Ann Lee\"", attrs(Some("Ann Lee"), None))]
    #[case(" author=\"\"", attrs(None, None))]
    fn well_formed(#[case] text: &str, #[case] expected: Attributes) {
        assert_eq!(parse_attributes(text, WhenPrecedence::Time), Ok(expected));
    }

    #[rstest]
    #[case(" colour=\"red\"", AttributeError::UnknownKey("colour".into()))]
    #[case(" author", AttributeError::MissingEquals("author".into()))]
    #[case(" author = \"A\"", AttributeError::MissingEquals("author".into()))]
    #[case(" author=A", AttributeError::UnquotedValue("author".into()))]
    #[case(" author=\"A", AttributeError::UnterminatedValue("author".into()))]
    #[case(" author=\"A\" author=\"B\"", AttributeError::DuplicateKey("author".into()))]
    #[case(" author=\"A\"date=\"D\"", AttributeError::MissingSeparator("author".into()))]
    fn malformed(#[case] text: &str, #[case] expected: AttributeError) {
        assert_eq!(parse_attributes(text, WhenPrecedence::Time), Err(expected));
    }

    #[test]
    fn time_wins_by_default() {
        let parsed = parse_attributes(" date=\"D\" time=\"T\"", WhenPrecedence::Time).unwrap();
        assert_eq!(parsed.when.as_deref(), Some("T"));
    }

    #[test]
    fn date_precedence_is_configurable() {
        let parsed = parse_attributes(" time=\"T\" date=\"D\"", WhenPrecedence::Date).unwrap();
        assert_eq!(parsed.when.as_deref(), Some("D"));
    }

    #[test]
    fn empty_preferred_value_falls_back_to_synonym() {
        let parsed = parse_attributes(" time=\"\" date=\"D\"", WhenPrecedence::Time).unwrap();
        assert_eq!(parsed.when.as_deref(), Some("D"));
    }

    #[test]
    fn prefix_orders_when_before_author() {
        assert_eq!(attrs(Some("A"), Some("T")).prefix_text().as_deref(), Some("T A:"));
        assert_eq!(attrs(Some("A"), None).prefix_text().as_deref(), Some("A:"));
        assert_eq!(attrs(None, Some("T")).prefix_text().as_deref(), Some("T:"));
        assert_eq!(attrs(None, None).prefix_text(), None);
    }
}
