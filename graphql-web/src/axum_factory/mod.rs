//! axum factory is useful to create an [`axum::Router`] serving a [`WebGraphQlHandler`]
//! over HTTP and, when configured, over WebSocket.
use axum::Extension;
use axum::Router;
use axum::extract::WebSocketUpgrade;
use axum::routing::get;
use axum::routing::post;
use http::HeaderMap;
use http::Uri;

mod http_server;
mod websocket_server;

use crate::configuration::Configuration;
use crate::web::WebGraphQlHandler;

/// Routes GraphQL requests to `handler`.
///
/// HTTP `POST` is served on `http.path`. The `graphql-transport-ws` protocol is
/// served on `websocket.path` when the `websocket` section is present; the two
/// may share a path.
pub fn make_axum_router(handler: WebGraphQlHandler, configuration: &Configuration) -> Router {
    let http_path = configuration.http.path.as_str();
    let mut graphql_route = post(http_server::handle_post);

    let mut router = Router::new();
    if let Some(websocket) = &configuration.websocket {
        let connection_init_timeout = websocket.connection_init_timeout;
        let websocket_route = get(
            move |upgrade: WebSocketUpgrade,
                  Extension(handler): Extension<WebGraphQlHandler>,
                  uri: Uri,
                  headers: HeaderMap| {
                websocket_server::handle_upgrade(
                    upgrade,
                    handler,
                    uri,
                    headers,
                    connection_init_timeout,
                )
            },
        );
        if websocket.path == http_path {
            graphql_route = graphql_route.merge(websocket_route);
        } else {
            router = router.route(&websocket.path, websocket_route);
        }
    }

    router
        .route(http_path, graphql_route)
        .layer(Extension(handler))
}
