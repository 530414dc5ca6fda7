use std::fmt;
use std::str::FromStr;

const KEY_MAX_LEN: usize = 50;
const VALUE_MAX_LEN: usize = 100;
const LABEL_VALUE: &str = "true";

/// Annotation attached to a run at upload time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Bare label such as `smoke`
    Label(String),
    /// Key-value pair such as `env:production`
    Pair { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error(
        "invalid tag key '{0}': must start with a letter and be 1-50 characters long; allowed characters are letters, numbers, '_', '-', '.'"
    )]
    Key(String),
    #[error(
        "invalid tag value '{0}': must be 1-100 characters long; allowed characters are letters, numbers, spaces, '_', '-', '.', '/'"
    )]
    Value(String),
}

impl Tag {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Tag::Label(key) | Tag::Pair { key, .. } => key,
        }
    }

    /// Form sent to the service. Labels travel as `label:true`.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Tag::Label(key) => format!("{key}:{LABEL_VALUE}"),
            Tag::Pair { key, value } => format!("{key}:{value}"),
        }
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((key, value)) => {
                let key = validate_key(key.trim())?;
                let value = validate_value(value.trim())?;
                Ok(Tag::Pair {
                    key: key.to_owned(),
                    value: value.to_owned(),
                })
            }
            None => Ok(Tag::Label(validate_key(s.trim())?.to_owned())),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Label(key) => write!(f, "{key}"),
            Tag::Pair { key, value } => write!(f, "{key}:{value}"),
        }
    }
}

fn validate_key(key: &str) -> Result<&str, TagError> {
    let mut chars = key.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid = starts_with_letter
        && key.chars().count() <= KEY_MAX_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(key)
    } else {
        Err(TagError::Key(key.to_owned()))
    }
}

fn validate_value(value: &str) -> Result<&str, TagError> {
    let len = value.chars().count();
    let valid = (1..=VALUE_MAX_LEN).contains(&len)
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '.' | '-' | '/')
        });
    if valid {
        Ok(value)
    } else {
        Err(TagError::Value(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rstest::rstest;

    #[test]
    fn pair_and_label() {
        // Act
        let pair: Tag = "env:production".parse().unwrap();
        let label: Tag = "smoke".parse().unwrap();

        // Assert
        assert_eq!(
            pair,
            Tag::Pair {
                key: "env".to_owned(),
                value: "production".to_owned()
            }
        );
        assert_eq!(label, Tag::Label("smoke".to_owned()));
        assert_eq!(label.to_wire(), "smoke:true");
        assert_eq!(pair.to_wire(), "env:production");
    }

    #[test]
    fn value_keeps_everything_after_first_colon() {
        // Act
        let tag: Tag = "branch:feature/a".parse().unwrap();

        // Assert
        assert_eq!(tag.to_string(), "branch:feature/a");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        // Act
        let tag: Tag = " os : windows 11 ".parse().unwrap();

        // Assert
        assert_eq!(tag.to_wire(), "os:windows 11");
    }

    #[rstest]
    #[case("key:", TagError::Value(String::new()))]
    #[case(":value", TagError::Key(String::new()))]
    #[case("", TagError::Key(String::new()))]
    #[case("1abc", TagError::Key("1abc".to_owned()))]
    #[case("ke y:v", TagError::Key("ke y".to_owned()))]
    #[case("k:v:w", TagError::Value("v:w".to_owned()))]
    #[case("k:<script>", TagError::Value("<script>".to_owned()))]
    #[trace]
    fn malformed_tags_are_rejected(#[case] input: &str, #[case] expected: TagError) {
        // Act
        let result = input.parse::<Tag>();

        // Assert
        assert_eq!(result, Err(expected));
    }

    #[test]
    fn key_length_limit() {
        // Arrange
        let longest = format!("a{}", "b".repeat(49));
        let too_long = format!("a{}", "b".repeat(50));

        // Act & Assert
        assert!(longest.parse::<Tag>().is_ok());
        assert!(too_long.parse::<Tag>().is_err());
    }
}
