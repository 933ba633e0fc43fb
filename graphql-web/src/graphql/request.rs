use std::fmt;
use std::sync::Arc;

use derivative::Derivative;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::error::RequestError;
use crate::json_ext::Object;
use crate::json_ext::ValueExt;

/// Transforms the engine request right before execution.
///
/// Configurers registered on a [`Request`] are applied in registration order,
/// each one receiving the result of the previous one.
pub type ExecutionInputConfigurer =
    Arc<dyn Fn(async_graphql::Request) -> async_graphql::Request + Send + Sync>;

/// A GraphQL `Request`: the query text, the optional operation name and variables.
///
/// The query is required: building a request without one fails with
/// [`RequestError::MissingQuery`].
#[derive(Clone, Derivative, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRequest")]
#[derivative(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL operation (e.g., query, mutation, subscription) string.
    query: String,

    /// The (optional) GraphQL operation name.
    ///
    /// When specified, this name must match the name of an operation in the
    /// GraphQL document.
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    #[serde(skip_serializing_if = "Object::is_empty")]
    variables: Object,

    #[serde(skip)]
    #[derivative(Debug = "ignore", PartialEq = "ignore")]
    configurers: Vec<ExecutionInputConfigurer>,
}

/// The wire shape of a request, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    variables: Object,
}

// NOTE: this deserialize helper is used to transform `null` to Default::default()
fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}

impl TryFrom<RawRequest> for Request {
    type Error = RequestError;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        Request::new(
            raw.query.unwrap_or_default(),
            raw.operation_name,
            raw.variables,
        )
    }
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a GraphQL
    /// `Request`.
    ///
    /// Fails with [`RequestError::MissingQuery`] when the query is empty or blank.
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
    ) -> Result<Self, RequestError> {
        if query.trim().is_empty() {
            return Err(RequestError::MissingQuery);
        }
        Ok(Self {
            query,
            operation_name,
            variables,
            configurers: Vec::new(),
        })
    }

    /// Builds a request from the map form of a request body, with the keys
    /// `query`, `operationName` and `variables`.
    pub fn from_map(mut body: Object) -> Result<Self, RequestError> {
        let query = match body.remove("query") {
            Some(Value::String(query)) => query.as_str().to_string(),
            None | Some(Value::Null) => return Err(RequestError::MissingQuery),
            Some(_) => {
                return Err(RequestError::InvalidField {
                    field: "query",
                    expected: "a string",
                });
            }
        };
        let operation_name = match body.remove("operationName") {
            Some(Value::String(name)) => Some(name.as_str().to_string()),
            None | Some(Value::Null) => None,
            Some(_) => {
                return Err(RequestError::InvalidField {
                    field: "operationName",
                    expected: "a string",
                });
            }
        };
        let variables = match body.remove("variables") {
            Some(Value::Object(variables)) => variables,
            None | Some(Value::Null) => Object::new(),
            Some(_) => {
                return Err(RequestError::InvalidField {
                    field: "variables",
                    expected: "an object",
                });
            }
        };
        Request::new(query, operation_name, variables)
    }

    /// Builds a request from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        match value {
            Value::Object(body) => Request::from_map(body),
            _ => Err(RequestError::NotAnObject),
        }
    }

    /// The map form of this request. `operationName` is left out when absent,
    /// `variables` when empty.
    pub fn to_map(&self) -> Object {
        let mut map = Object::new();
        map.insert("query", Value::String(self.query.as_str().into()));
        if let Some(operation_name) = &self.operation_name {
            map.insert(
                "operationName",
                Value::String(operation_name.as_str().into()),
            );
        }
        if !self.variables.is_empty() {
            map.insert("variables", Value::Object(self.variables.clone()));
        }
        map
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn variables(&self) -> &Object {
        &self.variables
    }

    /// Registers a function that transforms the engine request before it is executed.
    pub fn configure_execution_input<F>(&mut self, configurer: F)
    where
        F: Fn(async_graphql::Request) -> async_graphql::Request + Send + Sync + 'static,
    {
        self.configurers.push(Arc::new(configurer));
    }

    /// Builds the engine request: query, operation name and variables first,
    /// then every configurer in registration order.
    pub fn to_execution_input(&self) -> async_graphql::Request {
        let mut input = async_graphql::Request::new(self.query.as_str());
        if let Some(operation_name) = &self.operation_name {
            input = input.operation_name(operation_name.as_str());
        }
        if !self.variables.is_empty() {
            let variables = Value::Object(self.variables.clone()).to_engine_value();
            input = input.variables(async_graphql::Variables::from_value(variables));
        }
        self.configurers
            .iter()
            .fold(input, |input, configurer| configurer(input))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query='{}'", self.query)?;
        if let Some(operation_name) = &self.operation_name {
            write!(f, ", Operation='{operation_name}'")?;
        }
        if !self.variables.is_empty() {
            let variables = serde_json::to_string(&self.variables).map_err(|_| fmt::Error)?;
            write!(f, ", Variables={variables}")?;
        }
        Ok(())
    }
}
