//! Types related to GraphQL requests, responses, etc.

mod classification;
mod request;
mod response;

use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

pub use self::classification::ErrorClassification;
pub use self::request::ExecutionInputConfigurer;
pub use self::request::Request;
pub use self::response::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::ValueExt;

/// The extension key an [`Error`]'s classification is stored under.
pub(crate) const CLASSIFICATION_KEY: &str = "classification";

/// An asynchronous [`Stream`] of GraphQL [`Response`]s.
///
/// Subscriptions produce one response per event.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Response> + Send>>;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The error location
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

impl From<async_graphql::Pos> for Location {
    fn from(pos: async_graphql::Pos) -> Self {
        Location {
            line: pos.line as u32,
            column: pos.column as u32,
        }
    }
}

impl From<Location> for async_graphql::Pos {
    fn from(location: Location) -> Self {
        async_graphql::Pos {
            line: location.line as usize,
            column: location.column as usize,
        }
    }
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// The [`ErrorClassification`] lives in the `classification` extension, which
/// is also how clients see it on the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets [`Error::message`].
    ///
    /// * `.location(impl Into<`[`Location`]`>)`
    ///   Optional, may be called multiple times.
    ///   Adds one item at the end of [`Error::locations`].
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///   Sets [`Error::path`].
    ///
    /// * `.classification(impl Into<`[`ErrorClassification`]`>)`
    ///   Optional.
    ///   Sets the `classification` extension. Ignored if the extension map
    ///   already has one.
    ///
    /// * `.extension(impl Into<`[`ByteString`]`>, impl Into<`[`Value`]`>)`
    ///   Optional, may be called multiple times.
    ///   Adds one item to the [`Error::extensions`] map.
    ///
    /// * `.build()`
    ///   Finishes the builder and returns a GraphQL [`Error`].
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        classification: Option<ErrorClassification>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        mut extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        if let Some(classification) = classification {
            extensions
                .entry(CLASSIFICATION_KEY)
                .or_insert(Value::String(ByteString::from(classification.to_string())));
        }
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }

    /// The classification attached to this error, [`ErrorClassification::Unknown`] if none.
    pub fn classification(&self) -> ErrorClassification {
        match self.extensions.get(CLASSIFICATION_KEY) {
            Some(Value::String(tag)) => ErrorClassification::from(tag.as_str()),
            _ => ErrorClassification::Unknown,
        }
    }

    /// The error path rendered as a JSON path, e.g. `$.project`.
    ///
    /// Errors without a path render as an empty string.
    pub fn json_path(&self) -> String {
        self.path
            .as_ref()
            .map(|path| path.json_path())
            .unwrap_or_default()
    }

    /// Converts into the engine's error representation.
    pub(crate) fn to_server_error(&self) -> async_graphql::ServerError {
        let mut server_error = async_graphql::ServerError::new(self.message.clone(), None);
        server_error.locations = self
            .locations
            .iter()
            .map(|location| (*location).into())
            .collect();
        if let Some(path) = &self.path {
            server_error.path = path.iter().map(Into::into).collect();
        }
        if !self.extensions.is_empty() {
            let mut extensions = async_graphql::ErrorExtensionValues::default();
            for (key, value) in self.extensions.iter() {
                extensions.set(key.as_str(), value.to_engine_value());
            }
            server_error.extensions = Some(extensions);
        }
        server_error
    }
}

impl From<&async_graphql::ServerError> for Error {
    fn from(error: &async_graphql::ServerError) -> Self {
        let extensions = error
            .extensions
            .as_ref()
            .and_then(|extensions| serde_json_bytes::to_value(extensions).ok())
            .and_then(|value| match value {
                Value::Object(object) => Some(object),
                _ => None,
            })
            .unwrap_or_default();
        Error {
            message: error.message.clone(),
            locations: error.locations.iter().copied().map(Into::into).collect(),
            path: (!error.path.is_empty())
                .then(|| error.path.iter().map(PathElement::from).collect()),
            extensions,
        }
    }
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// Trait used to convert expected errors into a list of GraphQL errors
pub(crate) trait IntoGraphQLErrors
where
    Self: Sized,
{
    fn into_graphql_errors(self) -> Vec<Error>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn builder_sets_classification_extension() {
        let error = Error::builder()
            .message("project not found")
            .path(Path::from("project"))
            .location(Location { line: 1, column: 3 })
            .classification(ErrorClassification::NotFound)
            .build();

        assert_eq!(error.classification(), ErrorClassification::NotFound);
        assert_eq!(error.json_path(), "$.project");
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "project not found",
                "locations": [{ "line": 1, "column": 3 }],
                "path": ["project"],
                "extensions": { "classification": "NOT_FOUND" }
            })
        );
    }

    #[test]
    fn explicit_extension_wins_over_classification() {
        let error = Error::builder()
            .message("nope")
            .extension("classification", "CUSTOM_TAG")
            .classification(ErrorClassification::Forbidden)
            .build();
        assert_eq!(
            error.classification(),
            ErrorClassification::Custom("CUSTOM_TAG".to_string())
        );
    }

    #[test]
    fn missing_classification_is_unknown() {
        let error: Error =
            serde_json_bytes::from_value(json!({ "message": "boom", "path": ["a", 1] })).unwrap();
        assert_eq!(error.classification(), ErrorClassification::Unknown);
        assert_eq!(error.json_path(), "$.a[1]");
    }

    #[test]
    fn converts_to_and_from_server_error() {
        let error = Error::builder()
            .message("denied")
            .path(Path::from("project/releases/0"))
            .location(Location { line: 2, column: 5 })
            .classification(ErrorClassification::Forbidden)
            .build();

        let server_error = error.to_server_error();
        assert_eq!(server_error.message, "denied");
        assert_eq!(server_error.path.len(), 3);
        assert_eq!(server_error.locations[0].line, 2);

        let back = Error::from(&server_error);
        assert_eq!(back, error);
    }
}
