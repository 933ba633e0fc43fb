//! The input and output of the web interception chain, shared by the HTTP and
//! WebSocket transports.

use http::HeaderMap;
use http::Uri;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;
use static_assertions::assert_impl_all;
use tower::BoxError;

use super::ResponseBody;
use super::execution;
use crate::Context;
use crate::error::RequestError;
use crate::graphql;
use crate::json_ext::Object;

pub type ServiceResult = Result<Response, BoxError>;

assert_impl_all!(Request: Send, Sync);
/// What a transport hands to the interception chain: the request line and
/// headers, and the GraphQL request taken from the body or message payload.
#[derive(Debug)]
#[non_exhaustive]
pub struct Request {
    pub uri: Uri,

    pub headers: HeaderMap,

    /// Identifies the request: the WebSocket message id, or a generated id for HTTP.
    pub id: String,

    pub graphql_request: graphql::Request,

    pub context: Context,
}

impl Request {
    /// Builds the input from the map form of a request body, with the keys
    /// `query`, `operationName` and `variables`.
    pub fn new(uri: Uri, headers: HeaderMap, body: Object) -> Result<Request, RequestError> {
        Ok(Self::from_graphql_request(
            uri,
            headers,
            graphql::Request::from_map(body)?,
        ))
    }

    pub fn from_graphql_request(
        uri: Uri,
        headers: HeaderMap,
        graphql_request: graphql::Request,
    ) -> Request {
        Request {
            uri,
            headers,
            id: uuid::Uuid::new_v4().to_string(),
            graphql_request,
            context: Context::new(),
        }
    }

    /// Registers a function that transforms the engine request before execution.
    pub fn configure_execution_input<F>(&mut self, configurer: F)
    where
        F: Fn(async_graphql::Request) -> async_graphql::Request + Send + Sync + 'static,
    {
        self.graphql_request.configure_execution_input(configurer)
    }
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a "fake" web Request.
    ///
    /// Only the query is required, everything else has defaults.
    #[builder(visibility = "pub")]
    fn fake_new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
        id: Option<String>,
        context: Option<Context>,
    ) -> Result<Request, RequestError> {
        let graphql_request = graphql::Request::builder()
            .query(query)
            .and_operation_name(operation_name)
            .variables(variables)
            .build()?;
        Ok(Request {
            uri: Uri::from_static("http://localhost/graphql"),
            headers: HeaderMap::new(),
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            graphql_request,
            context: context.unwrap_or_default(),
        })
    }
}

impl From<Request> for execution::Request {
    fn from(request: Request) -> Self {
        execution::Request::builder()
            .graphql_request(request.graphql_request)
            .context(request.context)
            .build()
    }
}

assert_impl_all!(Response: Send);
/// What the interception chain hands back to the transport.
#[derive(Debug)]
#[non_exhaustive]
pub struct Response {
    /// Headers contributed by interceptors, copied onto the HTTP response.
    pub headers: HeaderMap,

    pub body: ResponseBody,

    pub context: Context,
}

impl Response {
    pub fn new(body: ResponseBody, context: Context) -> Response {
        Self {
            headers: HeaderMap::new(),
            body,
            context,
        }
    }

    /// Applies `f` to the response, or to every response of a subscription.
    pub fn map_response<F>(self, f: F) -> Self
    where
        F: Fn(graphql::Response) -> graphql::Response + Send + 'static,
    {
        Response {
            headers: self.headers,
            body: self.body.map_response(f),
            context: self.context,
        }
    }
}

impl From<execution::Response> for Response {
    fn from(response: execution::Response) -> Self {
        Response::new(response.body, response.context)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn new_reads_the_body_map() {
        let body = json!({
            "query": "query p($slug: ID!) { project(slug: $slug) { name } }",
            "operationName": "p",
            "variables": { "slug": "spring-framework" }
        });
        let request = Request::new(
            Uri::from_static("http://example.com/graphql"),
            HeaderMap::new(),
            body.as_object().unwrap().clone(),
        )
        .unwrap();
        assert_eq!(request.graphql_request.operation_name(), Some("p"));
        assert_eq!(
            request.graphql_request.variables().get("slug"),
            Some(&json!("spring-framework"))
        );
        assert!(!request.id.is_empty());
    }

    #[test]
    fn missing_query_fails_before_execution() {
        let error = Request::new(
            Uri::from_static("http://example.com/graphql"),
            HeaderMap::new(),
            json!({ "variables": {} }).as_object().unwrap().clone(),
        )
        .unwrap_err();
        assert_eq!(error, RequestError::MissingQuery);
    }

    #[test]
    fn fake_builder_defaults() {
        let request = Request::fake_builder()
            .query("{ hello }")
            .id("7")
            .build()
            .unwrap();
        assert_eq!(request.id, "7");
        assert_eq!(request.uri.path(), "/graphql");
        assert_eq!(request.graphql_request.query(), "{ hello }");
    }
}
