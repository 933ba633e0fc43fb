//! Implementation of the various steps in the request pipeline.

use std::fmt;

use futures::StreamExt;
use futures::future;
use futures::stream;

use crate::graphql;

pub mod execution;
pub mod web;

/// The payload of an execution: one response, or a stream of responses for
/// subscriptions.
pub enum ResponseBody {
    Single(graphql::Response),
    Stream(graphql::ResponseStream),
}

impl ResponseBody {
    pub fn is_stream(&self) -> bool {
        matches!(self, ResponseBody::Stream(_))
    }

    /// Applies `f` to the response, or to every response of the stream.
    pub fn map_response<F>(self, f: F) -> Self
    where
        F: Fn(graphql::Response) -> graphql::Response + Send + 'static,
    {
        match self {
            ResponseBody::Single(response) => ResponseBody::Single(f(response)),
            ResponseBody::Stream(responses) => ResponseBody::Stream(responses.map(f).boxed()),
        }
    }

    /// The single response, or the first response of the stream.
    pub async fn first_response(self) -> Option<graphql::Response> {
        match self {
            ResponseBody::Single(response) => Some(response),
            ResponseBody::Stream(mut responses) => responses.next().await,
        }
    }

    /// A stream of responses, with exactly one item for a single response.
    pub fn into_stream(self) -> graphql::ResponseStream {
        match self {
            ResponseBody::Single(response) => stream::once(future::ready(response)).boxed(),
            ResponseBody::Stream(responses) => responses,
        }
    }
}

impl From<graphql::Response> for ResponseBody {
    fn from(response: graphql::Response) -> Self {
        ResponseBody::Single(response)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Single(response) => f.debug_tuple("Single").field(response).finish(),
            ResponseBody::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn response(greeting: &str) -> graphql::Response {
        graphql::Response::builder()
            .data(json!({ "greetings": greeting }))
            .build()
    }

    #[tokio::test]
    async fn map_response_applies_to_every_event() {
        let body = ResponseBody::Stream(stream::iter(vec![response("Hi"), response("Hola")]).boxed());
        let mapped = body.map_response(|mut response| {
            response.extensions.insert("seen", true.into());
            response
        });
        assert!(mapped.is_stream());

        let responses: Vec<_> = mapped.into_stream().collect().await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.extensions.get("seen") == Some(&true.into())));
    }

    #[tokio::test]
    async fn single_body_as_stream() {
        let body = ResponseBody::from(response("Hi"));
        assert!(!body.is_stream());
        let responses: Vec<_> = body.into_stream().collect().await;
        assert_eq!(responses, vec![response("Hi")]);
    }
}
