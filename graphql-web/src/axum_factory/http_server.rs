use axum::Extension;
use axum::Json;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use http::HeaderMap;
use http::StatusCode;
use http::Uri;
use http::header::ACCEPT;

use crate::graphql;
use crate::graphql::ErrorClassification;
use crate::graphql::IntoGraphQLErrors;
use crate::json_ext::Object;
use crate::services::ResponseBody;
use crate::services::web;
use crate::web::WebGraphQlHandler;

pub(super) async fn handle_post(
    Extension(handler): Extension<WebGraphQlHandler>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match serde_json::from_slice::<Object>(&body) {
        Ok(body) => body,
        Err(error) => {
            tracing::debug!(%error, "invalid request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid GraphQL request: {error}"),
                ErrorClassification::BadRequest,
            );
        }
    };
    let accepts_event_stream = accepts_event_stream(&headers);

    let request = match web::Request::new(uri, headers, body) {
        Ok(request) => request,
        Err(error) => {
            return (
                StatusCode::OK,
                Json(graphql::Response::from_errors(error.into_graphql_errors())),
            )
                .into_response();
        }
    };

    let response = match handler.handle(request).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(%error, "failed to execute graphql request");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                ErrorClassification::InternalError,
            );
        }
    };

    match response.body {
        ResponseBody::Single(body) => (StatusCode::OK, response.headers, Json(body)).into_response(),
        ResponseBody::Stream(responses) if accepts_event_stream => {
            let events = responses
                .map(|response| Event::default().event("next").json_data(response))
                .chain(stream::once(async {
                    Ok(Event::default().event("complete").data(""))
                }));
            (response.headers, Sse::new(events).keep_alive(KeepAlive::default())).into_response()
        }
        ResponseBody::Stream(_) => (
            StatusCode::OK,
            response.headers,
            Json(graphql::Response::from_errors(vec![
                graphql::Error::builder()
                    .message("Subscriptions over HTTP require 'Accept: text/event-stream'")
                    .classification(ErrorClassification::BadRequest)
                    .build(),
            ])),
        )
            .into_response(),
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media_type| {
            media_type
                .trim()
                .starts_with(mime::TEXT_EVENT_STREAM.essence_str())
        })
}

fn error_response(
    status: StatusCode,
    message: String,
    classification: ErrorClassification,
) -> Response {
    let error = graphql::Error::builder()
        .message(message)
        .classification(classification)
        .build();
    (status, Json(graphql::Response::from_errors(vec![error]))).into_response()
}
