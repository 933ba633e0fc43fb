use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::services::web;

/// A step of the interception chain, as seen by the step before it.
pub(crate) trait WebHandler: Send + Sync + 'static {
    fn handle(&self, request: web::Request) -> BoxFuture<'static, web::ServiceResult>;
}

/// The rest of the chain, handed to an interceptor.
///
/// Consumed by [`Next::handle`], so an interceptor delegates at most once.
pub struct Next {
    handler: Arc<dyn WebHandler>,
}

impl Next {
    pub(crate) fn new(handler: Arc<dyn WebHandler>) -> Self {
        Self { handler }
    }

    /// Passes the request down the chain and waits for the response.
    pub async fn handle(self, request: web::Request) -> web::ServiceResult {
        self.handler.handle(request).await
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// Intercepts GraphQL requests coming from the HTTP and WebSocket transports.
///
/// An interceptor may inspect or rewrite the request, then either call
/// [`Next::handle`] and inspect or rewrite the response, or answer without
/// calling it.
#[async_trait::async_trait]
pub trait WebInterceptor: Send + Sync + 'static {
    async fn intercept(&self, request: web::Request, next: Next) -> web::ServiceResult;

    /// Chains `next` after this interceptor.
    fn and_then<I>(self, next: I) -> AndThen<Self, I>
    where
        Self: Sized,
        I: WebInterceptor,
    {
        AndThen {
            first: self,
            second: Arc::new(next),
        }
    }
}

/// Two interceptors run in sequence, see [`WebInterceptor::and_then`].
pub struct AndThen<A, B> {
    first: A,
    second: Arc<B>,
}

#[async_trait::async_trait]
impl<A, B> WebInterceptor for AndThen<A, B>
where
    A: WebInterceptor,
    B: WebInterceptor,
{
    async fn intercept(&self, request: web::Request, next: Next) -> web::ServiceResult {
        let second = InterceptorHandler {
            interceptor: self.second.clone(),
            next: next.handler,
        };
        self.first
            .intercept(request, Next::new(Arc::new(second)))
            .await
    }
}

/// An interceptor, followed by the rest of the chain.
pub(crate) struct InterceptorHandler {
    pub(crate) interceptor: Arc<dyn WebInterceptor>,
    pub(crate) next: Arc<dyn WebHandler>,
}

impl WebHandler for InterceptorHandler {
    fn handle(&self, request: web::Request) -> BoxFuture<'static, web::ServiceResult> {
        let interceptor = self.interceptor.clone();
        let next = Next::new(self.next.clone());
        Box::pin(async move { interceptor.intercept(request, next).await })
    }
}

/// An interceptor from an async function.
pub fn interceptor_fn<F, Fut>(intercept: F) -> InterceptorFn<F>
where
    F: Fn(web::Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = web::ServiceResult> + Send + 'static,
{
    InterceptorFn { intercept }
}

/// See [`interceptor_fn`].
pub struct InterceptorFn<F> {
    intercept: F,
}

#[async_trait::async_trait]
impl<F, Fut> WebInterceptor for InterceptorFn<F>
where
    F: Fn(web::Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = web::ServiceResult> + Send + 'static,
{
    async fn intercept(&self, request: web::Request, next: Next) -> web::ServiceResult {
        (self.intercept)(request, next).await
    }
}
