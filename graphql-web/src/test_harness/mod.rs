//! Verification harness for GraphQL requests.
//!
//! A [`GraphQlTester`] sends a query through a [`WebGraphQlHandler`], directly
//! or over the HTTP transport, and returns specs to assert on the response.
//! Assertion failures panic, with the request appended to the message.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use serde::Serialize;

mod path;
mod response;
mod strategy;
mod subscription;

pub use self::path::EntityListSpec;
pub use self::path::EntitySpec;
pub use self::path::PathSpec;
pub use self::response::ErrorSpec;
pub use self::response::ResponseSpec;
pub use self::subscription::SubscriptionSpec;
use self::strategy::DirectStrategy;
use self::strategy::HttpStrategy;
use self::strategy::RequestStrategy;
use crate::graphql;
use crate::json_ext::Object;
use crate::web::WebGraphQlHandler;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HTTP_PATH: &str = "/graphql";

/// Sends GraphQL requests and verifies their responses.
///
/// Example verifying a query through the handler:
///
/// ```
/// use graphql_web::GraphQlTester;
///
/// # async fn example(handler: graphql_web::WebGraphQlHandler) {
/// let tester = GraphQlTester::builder(handler).build();
/// tester
///     .query("{ project(slug: \"spring-framework\") { releases { version } } }")
///     .execute()
///     .await
///     .path("project.releases[*].version")
///     .entity_list::<String>()
///     .has_size_greater_than(1);
/// # }
/// ```
#[derive(Clone)]
pub struct GraphQlTester {
    strategy: Arc<dyn RequestStrategy>,
    response_timeout: Duration,
}

impl GraphQlTester {
    /// Tests against `handler`, without a transport.
    pub fn builder(handler: WebGraphQlHandler) -> GraphQlTesterBuilder {
        GraphQlTesterBuilder {
            target: Target::Direct(handler),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Tests against an HTTP router, such as the one made by
    /// [`make_axum_router`](crate::make_axum_router). Requests are driven
    /// in-process, no socket is opened.
    pub fn http_builder(router: Router) -> GraphQlTesterBuilder {
        GraphQlTesterBuilder {
            target: Target::Http {
                router,
                path: DEFAULT_HTTP_PATH.to_string(),
            },
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Starts a request for `query`.
    pub fn query(&self, query: impl Into<String>) -> RequestSpec {
        RequestSpec {
            strategy: self.strategy.clone(),
            response_timeout: self.response_timeout,
            query: query.into(),
            operation_name: None,
            variables: Object::new(),
        }
    }
}

impl fmt::Debug for GraphQlTester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlTester")
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

enum Target {
    Direct(WebGraphQlHandler),
    Http { router: Router, path: String },
}

/// Builder for a [`GraphQlTester`].
pub struct GraphQlTesterBuilder {
    target: Target,
    response_timeout: Duration,
}

// Not using buildstructor because the strategy is chosen by the entry point
impl GraphQlTesterBuilder {
    /// How long to wait for a response. Defaults to 5 seconds.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// The path requests are posted to. Defaults to `/graphql`.
    ///
    /// Panics when testing without a transport.
    pub fn url_path(mut self, url_path: impl Into<String>) -> Self {
        match &mut self.target {
            Target::Http { path, .. } => *path = url_path.into(),
            Target::Direct(_) => panic!("url_path only applies to the HTTP tester"),
        }
        self
    }

    pub fn build(self) -> GraphQlTester {
        let strategy: Arc<dyn RequestStrategy> = match self.target {
            Target::Direct(handler) => Arc::new(DirectStrategy::new(handler)),
            Target::Http { router, path } => Arc::new(HttpStrategy::new(router, path)),
        };
        GraphQlTester {
            strategy,
            response_timeout: self.response_timeout,
        }
    }
}

/// A request to send, see [`GraphQlTester::query`].
#[must_use = "a request does nothing until executed"]
pub struct RequestSpec {
    strategy: Arc<dyn RequestStrategy>,
    response_timeout: Duration,
    query: String,
    operation_name: Option<String>,
    variables: Object,
}

impl RequestSpec {
    pub fn operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    /// Adds a variable. Panics if `value` does not serialize to JSON.
    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let name = name.into();
        match serde_json_bytes::to_value(value) {
            Ok(value) => {
                self.variables.insert(name, value);
            }
            Err(error) => panic!("variable '{name}' cannot be serialized: {error}"),
        }
        self
    }

    /// Sends the request and returns its response for verification.
    ///
    /// Panics on timeout, on a transport failure, or if the operation is a
    /// subscription.
    pub async fn execute(self) -> ResponseSpec {
        let request = self.graphql_request();
        let described = request.to_string();
        match self
            .strategy
            .execute(request, self.response_timeout)
            .await
        {
            Ok(response) => ResponseSpec::new(described, response),
            Err(error) => panic!("{error}\nRequest: {described}"),
        }
    }

    /// Sends the request and verifies the response has no errors.
    pub async fn execute_and_verify(self) {
        self.execute().await.errors().verify();
    }

    /// Sends a subscription request and returns its events for verification.
    pub async fn execute_subscription(self) -> SubscriptionSpec {
        let request = self.graphql_request();
        let described = request.to_string();
        match self
            .strategy
            .execute_subscription(request, self.response_timeout)
            .await
        {
            Ok(responses) => SubscriptionSpec::new(described, responses),
            Err(error) => panic!("{error}\nRequest: {described}"),
        }
    }

    fn graphql_request(&self) -> graphql::Request {
        let request = graphql::Request::builder()
            .query(self.query.clone())
            .and_operation_name(self.operation_name.clone())
            .variables(self.variables.clone())
            .build();
        match request {
            Ok(request) => request,
            Err(error) => panic!("invalid request: {error}"),
        }
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish()
    }
}
