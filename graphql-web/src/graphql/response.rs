use bytes::Bytes;
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use thiserror::Error;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL response: the data and the errors of one execution, or of one
/// subscription event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

/// A response body that is not a GraphQL response.
#[derive(Error, Display, Debug)]
pub(crate) enum MalformedResponseError {
    /// response was malformed: {0}
    Json(#[from] serde_json::Error),
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// A response carrying only errors.
    pub fn from_errors(errors: Vec<Error>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// append_errors adds errors to the end of the error list.
    pub fn append_errors(&mut self, errors: &mut Vec<Error>) {
        self.errors.append(errors)
    }

    /// Create a [`Response`] from the supplied [`Bytes`].
    pub(crate) fn from_bytes(b: Bytes) -> Result<Response, MalformedResponseError> {
        Ok(serde_json::from_slice(&b)?)
    }

    /// Converts the engine's response into a [`Response`].
    pub(crate) fn from_engine(response: async_graphql::Response) -> Response {
        let errors = response.errors.iter().map(Error::from).collect();
        let data = match response.data {
            async_graphql::Value::Null => None,
            data => data.into_json().ok().and_then(|json| {
                serde_json_bytes::to_value(json).ok()
            }),
        };
        let extensions = response
            .extensions
            .into_iter()
            .filter_map(|(key, value)| {
                let value = serde_json_bytes::to_value(value.into_json().ok()?).ok()?;
                Some((ByteString::from(key), value))
            })
            .collect();
        Response {
            data,
            errors,
            extensions,
        }
    }
}
