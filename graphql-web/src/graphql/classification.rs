use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A coarse category assigned to a GraphQL [`Error`](super::Error) for client-side handling.
///
/// The known categories form a closed set. Adopters can tag errors with their
/// own categories through [`ErrorClassification::Custom`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorClassification {
    /// The request could not be understood, e.g. invalid syntax or arguments.
    BadRequest,
    /// The request requires authentication.
    Unauthorized,
    /// The caller is authenticated but not allowed to access the field.
    Forbidden,
    /// The requested value does not exist.
    NotFound,
    /// An unexpected failure. The default for unresolved exceptions.
    InternalError,
    /// No classification was attached.
    Unknown,
    /// A category outside of the known set.
    Custom(String),
}

impl ErrorClassification {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorClassification::BadRequest => "BAD_REQUEST",
            ErrorClassification::Unauthorized => "UNAUTHORIZED",
            ErrorClassification::Forbidden => "FORBIDDEN",
            ErrorClassification::NotFound => "NOT_FOUND",
            ErrorClassification::InternalError => "INTERNAL_ERROR",
            ErrorClassification::Unknown => "UNKNOWN",
            ErrorClassification::Custom(tag) => tag,
        }
    }
}

impl From<&str> for ErrorClassification {
    fn from(tag: &str) -> Self {
        match tag {
            "BAD_REQUEST" => ErrorClassification::BadRequest,
            "UNAUTHORIZED" => ErrorClassification::Unauthorized,
            "FORBIDDEN" => ErrorClassification::Forbidden,
            "NOT_FOUND" => ErrorClassification::NotFound,
            "INTERNAL_ERROR" => ErrorClassification::InternalError,
            "UNKNOWN" => ErrorClassification::Unknown,
            other => ErrorClassification::Custom(other.to_string()),
        }
    }
}

impl From<String> for ErrorClassification {
    fn from(tag: String) -> Self {
        ErrorClassification::from(tag.as_str())
    }
}

impl From<ErrorClassification> for String {
    fn from(classification: ErrorClassification) -> Self {
        classification.as_str().to_string()
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_round_trip() {
        for classification in [
            ErrorClassification::BadRequest,
            ErrorClassification::Unauthorized,
            ErrorClassification::Forbidden,
            ErrorClassification::NotFound,
            ErrorClassification::InternalError,
        ] {
            let tag = classification.to_string();
            assert_eq!(ErrorClassification::from(tag.as_str()), classification);
        }
    }

    #[test]
    fn unrecognized_tag_is_custom() {
        let parsed: ErrorClassification = serde_json::from_str("\"RATE_LIMITED\"").unwrap();
        assert_eq!(
            parsed,
            ErrorClassification::Custom("RATE_LIMITED".to_string())
        );
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"RATE_LIMITED\"");
    }
}
