use std::fmt;

use futures::StreamExt;
use futures::stream::BoxStream;

use super::response::ResponseSpec;
use crate::graphql;

/// The events of a subscription, see
/// [`RequestSpec::execute_subscription`](super::RequestSpec::execute_subscription).
pub struct SubscriptionSpec {
    request: String,
    responses: graphql::ResponseStream,
}

impl SubscriptionSpec {
    pub(super) fn new(request: String, responses: graphql::ResponseStream) -> Self {
        Self { request, responses }
    }

    /// One [`ResponseSpec`] per event.
    pub fn into_stream(self) -> BoxStream<'static, ResponseSpec> {
        let request = self.request;
        self.responses
            .map(move |response| ResponseSpec::new(request.clone(), response))
            .boxed()
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
