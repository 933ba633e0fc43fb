use std::time::Duration;

use async_sse::Event;
use axum::Router;
use axum::body::Body;
use futures::StreamExt;
use futures::TryStreamExt;
use futures::future;
use http::HeaderMap;
use http::HeaderValue;
use http::StatusCode;
use http::Uri;
use http::header::ACCEPT;
use http::header::CONTENT_TYPE;
use tower::BoxError;
use tower::ServiceExt;

use crate::graphql;
use crate::services::ResponseBody;
use crate::services::web;
use crate::web::WebGraphQlHandler;

/// How the tester gets a response for a request.
#[async_trait::async_trait]
pub(super) trait RequestStrategy: Send + Sync + 'static {
    async fn execute(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::Response, BoxError>;

    async fn execute_subscription(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::ResponseStream, BoxError>;
}

/// Calls the handler, as a transport would.
pub(super) struct DirectStrategy {
    handler: WebGraphQlHandler,
}

impl DirectStrategy {
    pub(super) fn new(handler: WebGraphQlHandler) -> Self {
        Self { handler }
    }

    async fn handle(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<ResponseBody, BoxError> {
        let input = web::Request::from_graphql_request(
            Uri::from_static("http://localhost/graphql"),
            HeaderMap::new(),
            request,
        );
        let output = tokio::time::timeout(timeout, self.handler.handle(input))
            .await
            .map_err(|_| format!("Timeout {timeout:?} waiting for a response"))??;
        Ok(output.body)
    }
}

#[async_trait::async_trait]
impl RequestStrategy for DirectStrategy {
    async fn execute(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::Response, BoxError> {
        match self.handle(request, timeout).await? {
            ResponseBody::Single(response) => Ok(response),
            ResponseBody::Stream(_) => {
                Err("expected a single response but got a stream, use execute_subscription".into())
            }
        }
    }

    async fn execute_subscription(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::ResponseStream, BoxError> {
        Ok(self.handle(request, timeout).await?.into_stream())
    }
}

/// Posts the request to a router.
pub(super) struct HttpStrategy {
    router: Router,
    path: String,
}

impl HttpStrategy {
    pub(super) fn new(router: Router, path: String) -> Self {
        Self { router, path }
    }

    async fn post(
        &self,
        request: &graphql::Request,
        accept: &'static str,
    ) -> Result<http::Response<Body>, BoxError> {
        let body = serde_json::to_vec(request)?;
        let request = http::Request::post(self.path.as_str())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static(accept))
            .body(Body::from(body))?;
        let response = self.router.clone().oneshot(request).await?;
        if response.status() != StatusCode::OK {
            return Err(format!(
                "Status expected:<200 OK> but was:<{}>",
                response.status()
            )
            .into());
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl RequestStrategy for HttpStrategy {
    async fn execute(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::Response, BoxError> {
        let exchange = async {
            let response = self.post(&request, "application/json").await?;
            expect_content_type(response.headers(), &mime::APPLICATION_JSON)?;
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
            Ok::<_, BoxError>(graphql::Response::from_bytes(body)?)
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| format!("Timeout {timeout:?} waiting for a response"))?
    }

    async fn execute_subscription(
        &self,
        request: graphql::Request,
        timeout: Duration,
    ) -> Result<graphql::ResponseStream, BoxError> {
        let response = tokio::time::timeout(timeout, self.post(&request, "text/event-stream"))
            .await
            .map_err(|_| format!("Timeout {timeout:?} waiting for a response"))??;
        expect_content_type(response.headers(), &mime::TEXT_EVENT_STREAM)?;
        Ok(sse_responses(response.into_body()))
    }
}

fn expect_content_type(headers: &HeaderMap, expected: &mime::Mime) -> Result<(), BoxError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with(expected.essence_str()) {
        Ok(())
    } else {
        Err(format!("Content type expected:<{expected}> but was:<{content_type}>").into())
    }
}

/// Reads `next` events until `complete` or the end of the body.
fn sse_responses(body: Body) -> graphql::ResponseStream {
    let reader = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .into_async_read();
    async_sse::decode(reader)
        .take_while(|event| {
            let more = match event {
                Ok(Event::Message(message)) => message.name() != "complete",
                Ok(Event::Retry(_)) => true,
                Err(error) => {
                    tracing::warn!(%error, "event stream failed");
                    false
                }
            };
            future::ready(more)
        })
        .filter_map(|event| {
            let response = match event {
                Ok(Event::Message(message)) if message.name() == "next" => {
                    match serde_json::from_slice::<graphql::Response>(message.data()) {
                        Ok(response) => Some(response),
                        Err(error) => {
                            tracing::warn!(%error, "ignoring an event that is not a GraphQL response");
                            None
                        }
                    }
                }
                _ => None,
            };
            future::ready(response)
        })
        .boxed()
}
