//! The transport-agnostic execution service: runs a GraphQL request against
//! the engine and produces a single response or a stream of responses.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;

use async_graphql::ObjectType;
use async_graphql::SubscriptionType;
use async_graphql::parser::types::DocumentOperations;
use async_graphql::parser::types::OperationType;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tower::BoxError;
use tower::Service;

mod exception;
mod extension;

pub use self::exception::DataFetcherError;
pub use self::exception::DataFetcherExceptionResolver;
pub use self::exception::ExceptionResolverAdapter;
pub use self::exception::ExceptionResolvers;
pub use self::exception::FieldEnvironment;
pub use self::extension::DataFetcherExtension;
pub use self::extension::SchemaBuilderExt;
pub(crate) use self::extension::FieldErrorCollector;
use crate::context::ContextSnapshot;
use crate::graphql;
use crate::metrics;
use crate::services::ResponseBody;
use crate::services::execution;

/// A GraphQL engine able to run single-result operations and subscriptions.
#[async_trait::async_trait]
pub trait GraphQlEngine: Send + Sync + 'static {
    async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response;

    fn execute_stream(
        &self,
        request: async_graphql::Request,
    ) -> BoxStream<'static, async_graphql::Response>;
}

#[async_trait::async_trait]
impl<Query, Mutation, Subscription> GraphQlEngine
    for async_graphql::Schema<Query, Mutation, Subscription>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response {
        async_graphql::Schema::execute(self, request).await
    }

    fn execute_stream(
        &self,
        request: async_graphql::Request,
    ) -> BoxStream<'static, async_graphql::Response> {
        Box::pin(async_graphql::Schema::execute_stream(self, request))
    }
}

/// Holds the engine requests are executed against.
#[derive(Clone)]
pub struct GraphQlSource {
    engine: Arc<dyn GraphQlEngine>,
}

impl GraphQlSource {
    pub fn new(engine: impl GraphQlEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &dyn GraphQlEngine {
        self.engine.as_ref()
    }
}

impl std::fmt::Debug for GraphQlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlSource").finish_non_exhaustive()
    }
}

/// Executes [`execution::Request`]s against a [`GraphQlSource`].
///
/// Field failures never fail the service: they end up as errors in the
/// response. The service itself only fails when the engine panics.
#[derive(Clone, Debug)]
pub struct ExecutionGraphQlService {
    source: GraphQlSource,
}

impl ExecutionGraphQlService {
    pub fn new(source: GraphQlSource) -> Self {
        Self { source }
    }

    pub async fn execute(
        &self,
        request: execution::Request,
    ) -> Result<execution::Response, BoxError> {
        let execution::Request {
            graphql_request,
            context,
        } = request;

        let collector = FieldErrorCollector::default();
        let mut input = graphql_request
            .to_execution_input()
            .data(collector.clone());
        if let Some(snapshot) = context.get::<ContextSnapshot>() {
            input = input.data(snapshot);
        }

        let operation = operation_type(graphql_request.query(), graphql_request.operation_name());
        tracing::debug!(request = %graphql_request, ?operation, "executing graphql request");

        if operation == Some(OperationType::Subscription) {
            let mut last_event = Instant::now();
            let stream = self
                .source
                .engine()
                .execute_stream(input)
                .map(move |response| {
                    let response = complete_response(response, &collector);
                    metrics::record_request(last_event.elapsed(), &response);
                    last_event = Instant::now();
                    response
                })
                .boxed();
            return Ok(execution::Response::new(ResponseBody::Stream(stream), context));
        }

        let started = Instant::now();
        let response = AssertUnwindSafe(self.source.engine().execute(input))
            .catch_unwind()
            .await
            .map_err(|_| BoxError::from("the GraphQL engine panicked"))?;
        let response = complete_response(response, &collector);
        metrics::record_request(started.elapsed(), &response);
        Ok(execution::Response::new(
            ResponseBody::Single(response),
            context,
        ))
    }
}

impl Service<execution::Request> for ExecutionGraphQlService {
    type Response = execution::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, execution::ServiceResult>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: execution::Request) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.execute(request).await })
    }
}

fn complete_response(
    response: async_graphql::Response,
    collector: &FieldErrorCollector,
) -> graphql::Response {
    let mut response = graphql::Response::from_engine(response);
    if collector.take_root_null() {
        response.data = None;
    }
    response.append_errors(&mut collector.drain());
    response
}

/// The type of the operation the request selects, if the document parses and
/// the selection is unambiguous. The engine reports the other cases.
fn operation_type(query: &str, operation_name: Option<&str>) -> Option<OperationType> {
    let document = async_graphql::parser::parse_query(query).ok()?;
    match &document.operations {
        DocumentOperations::Single(operation) => Some(operation.node.ty),
        DocumentOperations::Multiple(operations) => match operation_name {
            Some(name) => operations
                .iter()
                .find(|(candidate, _)| candidate.as_str() == name)
                .map(|(_, operation)| operation.node.ty),
            None if operations.len() == 1 => {
                operations.values().next().map(|operation| operation.node.ty)
            }
            None => None,
        },
    }
}
