//! Metric events.
//!
//! Metrics are emitted as `tracing` events whose field names carry the
//! instrument kind (`monotonic_counter.*`, `histogram.*`); a subscriber layer
//! turns them into instruments of whatever metrics backend is in use.

use std::time::Duration;

use async_graphql::QueryPathNode;

use crate::graphql;
use crate::json_ext::Path;

pub(crate) const OUTCOME_SUCCESS: &str = "SUCCESS";
pub(crate) const OUTCOME_ERROR: &str = "ERROR";

fn outcome(success: bool) -> &'static str {
    if success {
        OUTCOME_SUCCESS
    } else {
        OUTCOME_ERROR
    }
}

/// One GraphQL request (or one subscription event) went through the engine.
pub(crate) fn record_request(duration: Duration, response: &graphql::Response) {
    tracing::info!(
        histogram.graphql.request.duration = duration.as_secs_f64(),
        outcome = outcome(response.errors.is_empty()),
        "graphql request completed"
    );
    for error in &response.errors {
        record_error(error);
    }
}

/// One field was resolved. Every field is reported, at trace level, so the
/// path is only built when that level is enabled.
pub(crate) fn record_data_fetcher(duration: Duration, path: &QueryPathNode<'_>, success: bool) {
    tracing::trace!(
        histogram.graphql.datafetcher.duration = duration.as_secs_f64(),
        path = %Path::from_query_path(path),
        outcome = outcome(success),
    );
}

fn record_error(error: &graphql::Error) {
    tracing::info!(
        monotonic_counter.graphql.errors = 1u64,
        classification = %error.classification(),
        path = %error.json_path(),
    );
}
