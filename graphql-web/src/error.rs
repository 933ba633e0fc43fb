//! Crate errors.
use std::time::Duration;

use displaydoc::Display;
use thiserror::Error;
use tower::BoxError;

pub use crate::configuration::ConfigurationError;
use crate::graphql::Error;
use crate::graphql::ErrorClassification;
use crate::graphql::IntoGraphQLErrors;

/// A GraphQL request that cannot be executed.
///
/// These are raised when the request is built, before the engine is involved.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum RequestError {
    /// Must provide query string.
    MissingQuery,

    /// invalid type for '{field}': expected {expected}
    InvalidField {
        /// The offending field of the request body.
        field: &'static str,
        /// The JSON type that was expected.
        expected: &'static str,
    },

    /// request body must be a JSON object
    NotAnObject,
}

impl RequestError {
    /// Convert the request error to a GraphQL error.
    pub(crate) fn to_graphql_error(&self) -> Error {
        Error::builder()
            .message(self.to_string())
            .classification(ErrorClassification::BadRequest)
            .build()
    }
}

impl IntoGraphQLErrors for RequestError {
    fn into_graphql_errors(self) -> Vec<Error> {
        vec![self.to_graphql_error()]
    }
}

/// A failure of the exception resolution chain itself.
///
/// Never surfaced to clients: the field falls back to the default error.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub(crate) enum ResolutionError {
    /// exception resolution did not complete within {0:?}
    Timeout(Duration),

    /// exception resolver panicked: {0}
    Panicked(String),

    /// exception resolver failed: {0}
    Resolver(BoxError),
}
