//! Opaque session token issued by the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token presented after a reconnect to ask for the previous session context.
///
/// The server decides whether it is honoured; the client treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TokenParseError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(TokenParseError::Whitespace(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SessionToken {
    type Error = TokenParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}

/// Error parsing a session token.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenParseError {
    #[error("session token cannot be empty")]
    Empty,
    #[error("session token cannot contain whitespace, got: {0:?}")]
    Whitespace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token() {
        let token: SessionToken = "10.0.0.4-8f2c".parse().unwrap();
        assert_eq!(token.as_str(), "10.0.0.4-8f2c");
        assert_eq!(token.to_string(), "10.0.0.4-8f2c");
    }

    #[test]
    fn reject_bad_tokens() {
        assert!("".parse::<SessionToken>().is_err());
        assert!("a b".parse::<SessionToken>().is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        assert!(serde_json::from_str::<SessionToken>(r#""""#).is_err());
        let token: SessionToken = serde_json::from_str(r#""n0nce""#).unwrap();
        assert_eq!(serde_json::to_string(&token).unwrap(), r#""n0nce""#);
    }
}
