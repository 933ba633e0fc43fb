//! The entry point shared by the transports: an interception chain in front
//! of the [`ExecutionGraphQlService`].

use std::sync::Arc;
use std::task::Poll;

use futures::future::BoxFuture;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

mod interceptor;

pub use self::interceptor::AndThen;
pub use self::interceptor::InterceptorFn;
pub use self::interceptor::Next;
pub use self::interceptor::WebInterceptor;
pub use self::interceptor::interceptor_fn;
use self::interceptor::InterceptorHandler;
use self::interceptor::WebHandler;
use crate::context::CompositeAccessor;
use crate::context::ContextSnapshot;
use crate::context::ThreadLocalAccessor;
use crate::execution::ExecutionGraphQlService;
use crate::services::execution;
use crate::services::web;

/// Runs web requests through the interceptors, in registration order, then
/// through the execution service.
#[derive(Clone)]
pub struct WebGraphQlHandler {
    chain: Arc<dyn WebHandler>,
    accessor: Option<Arc<dyn ThreadLocalAccessor>>,
}

impl WebGraphQlHandler {
    pub fn builder(service: ExecutionGraphQlService) -> WebGraphQlHandlerBuilder {
        WebGraphQlHandlerBuilder {
            service,
            interceptors: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// Handles one request.
    ///
    /// Thread-bound state is captured before this returns, on the calling
    /// thread, so transports call it from the thread that received the request.
    pub fn handle(&self, request: web::Request) -> BoxFuture<'static, web::ServiceResult> {
        if let Some(accessor) = &self.accessor {
            if let Some(snapshot) = ContextSnapshot::extract(accessor.clone()) {
                request.context.insert(snapshot);
            }
        }
        tracing::debug!(id = %request.id, request = %request.graphql_request, "handling graphql request");
        self.chain.handle(request)
    }
}

impl std::fmt::Debug for WebGraphQlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebGraphQlHandler")
            .field("propagates_context", &self.accessor.is_some())
            .finish_non_exhaustive()
    }
}

impl Service<web::Request> for WebGraphQlHandler {
    type Response = web::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, web::ServiceResult>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: web::Request) -> Self::Future {
        self.handle(request)
    }
}

/// Builds a [`WebGraphQlHandler`].
pub struct WebGraphQlHandlerBuilder {
    service: ExecutionGraphQlService,
    interceptors: Vec<Arc<dyn WebInterceptor>>,
    accessors: Vec<Arc<dyn ThreadLocalAccessor>>,
}

impl WebGraphQlHandlerBuilder {
    /// Appends an interceptor; earlier interceptors see the request first.
    pub fn interceptor(mut self, interceptor: impl WebInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn WebInterceptor>>,
    ) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    /// Registers an accessor for thread-bound state to propagate to resolvers.
    pub fn thread_local_accessor(mut self, accessor: impl ThreadLocalAccessor) -> Self {
        self.accessors.push(Arc::new(accessor));
        self
    }

    pub fn thread_local_accessors(
        mut self,
        accessors: impl IntoIterator<Item = Arc<dyn ThreadLocalAccessor>>,
    ) -> Self {
        self.accessors.extend(accessors);
        self
    }

    pub fn build(self) -> WebGraphQlHandler {
        let mut chain: Arc<dyn WebHandler> = Arc::new(ExecutionHandler {
            service: self.service,
        });
        for interceptor in self.interceptors.into_iter().rev() {
            chain = Arc::new(InterceptorHandler {
                interceptor,
                next: chain,
            });
        }

        let mut accessors = self.accessors;
        let accessor = match accessors.len() {
            0 => None,
            1 => accessors.pop(),
            _ => Some(Arc::new(CompositeAccessor::new(accessors)) as Arc<dyn ThreadLocalAccessor>),
        };
        WebGraphQlHandler { chain, accessor }
    }
}

/// The end of the chain.
struct ExecutionHandler {
    service: ExecutionGraphQlService,
}

impl WebHandler for ExecutionHandler {
    fn handle(&self, request: web::Request) -> BoxFuture<'static, web::ServiceResult> {
        let service = self.service.clone();
        Box::pin(async move {
            let response = service
                .oneshot(execution::Request::from(request))
                .await?;
            Ok(web::Response::from(response))
        })
    }
}
