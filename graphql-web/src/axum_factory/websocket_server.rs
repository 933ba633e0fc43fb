//! Server side of the `graphql-transport-ws` protocol.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::WebSocketUpgrade;
use axum::extract::ws::CloseFrame;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::response::Response;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitStream;
use http::HeaderMap;
use http::Uri;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::graphql;
use crate::graphql::ErrorClassification;
use crate::graphql::IntoGraphQLErrors;
use crate::json_ext::Object;
use crate::protocols::websocket::ClientMessage;
use crate::protocols::websocket::GRAPHQL_TRANSPORT_WS_PROTOCOL;
use crate::protocols::websocket::ServerMessage;
use crate::protocols::websocket::WebSocketError;
use crate::services::ResponseBody;
use crate::services::web;
use crate::web::WebGraphQlHandler;

pub(super) async fn handle_upgrade(
    upgrade: WebSocketUpgrade,
    handler: WebGraphQlHandler,
    uri: Uri,
    headers: HeaderMap,
    connection_init_timeout: Duration,
) -> Response {
    upgrade
        .protocols([GRAPHQL_TRANSPORT_WS_PROTOCOL])
        .on_upgrade(move |socket| {
            Connection {
                handler,
                uri,
                headers,
            }
            .serve(socket, connection_init_timeout)
        })
}

enum Outgoing {
    Message(ServerMessage),
    Close(WebSocketError),
}

/// Sent by an operation task when it is done, before its final message.
struct Finished {
    id: String,
    generation: u64,
}

/// The operations running on one connection, by id.
///
/// An id can be reused once its operation is done, so each start gets a new
/// generation and a late [`Finished`] of an earlier one is ignored.
#[derive(Default)]
struct Operations {
    running: HashMap<String, Operation>,
    generations: u64,
}

struct Operation {
    generation: u64,
    task: JoinHandle<()>,
}

impl Operations {
    fn is_running(&self, id: &str) -> bool {
        self.running
            .get(id)
            .is_some_and(|operation| !operation.task.is_finished())
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    fn insert(&mut self, id: String, generation: u64, task: JoinHandle<()>) {
        self.running.insert(id, Operation { generation, task });
    }

    fn finished(&mut self, finished: &Finished) {
        if self
            .running
            .get(&finished.id)
            .is_some_and(|operation| operation.generation == finished.generation)
        {
            self.running.remove(&finished.id);
        }
    }

    /// Aborts the operation, returning whether it was running.
    fn cancel(&mut self, id: &str) -> bool {
        match self.running.remove(id) {
            Some(operation) => {
                operation.task.abort();
                true
            }
            None => false,
        }
    }

    fn abort_all(&mut self) {
        for (_, operation) in self.running.drain() {
            operation.task.abort();
        }
    }

    fn len(&self) -> usize {
        self.running.len()
    }
}

struct Connection {
    handler: WebGraphQlHandler,
    uri: Uri,
    headers: HeaderMap,
}

impl Connection {
    async fn serve(self, socket: WebSocket, connection_init_timeout: Duration) {
        let (mut sink, mut stream) = socket.split();
        let (sender, receiver) = mpsc::unbounded_channel::<Outgoing>();

        let writer = tokio::spawn(async move {
            let mut outgoing_messages = UnboundedReceiverStream::new(receiver);
            while let Some(outgoing) = outgoing_messages.next().await {
                let message = match outgoing {
                    Outgoing::Message(message) => match serde_json::to_string(&message) {
                        Ok(text) => Message::Text(text.into()),
                        Err(error) => {
                            tracing::error!(%error, "cannot serialize websocket message");
                            continue;
                        }
                    },
                    Outgoing::Close(error) => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: error.close_code(),
                                reason: error.to_string().into(),
                            })))
                            .await;
                        break;
                    }
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let mut operations = Operations::default();
        let outcome = self
            .run(&mut stream, &sender, &mut operations, connection_init_timeout)
            .await;
        operations.abort_all();
        if let Err(error) = outcome {
            tracing::debug!(code = error.close_code(), %error, "closing websocket connection");
            let _ = sender.send(Outgoing::Close(error));
        }
        drop(sender);
        let _ = writer.await;
    }

    async fn run(
        &self,
        stream: &mut SplitStream<WebSocket>,
        sender: &mpsc::UnboundedSender<Outgoing>,
        operations: &mut Operations,
        connection_init_timeout: Duration,
    ) -> Result<(), WebSocketError> {
        let deadline = tokio::time::Instant::now() + connection_init_timeout;
        loop {
            match tokio::time::timeout_at(deadline, next_message(stream)).await {
                Err(_) => return Err(WebSocketError::ConnectionInitTimeout),
                Ok(None) => return Ok(()),
                Ok(Some(Err(_))) => return Err(WebSocketError::InvalidMessage),
                Ok(Some(Ok(ClientMessage::ConnectionInit { .. }))) => {
                    let _ = sender.send(Outgoing::Message(ServerMessage::ConnectionAck {
                        payload: None,
                    }));
                    break;
                }
                Ok(Some(Ok(ClientMessage::Subscribe { .. }))) => {
                    return Err(WebSocketError::Unauthorized);
                }
                Ok(Some(Ok(ClientMessage::Ping { payload }))) => {
                    let _ = sender.send(Outgoing::Message(ServerMessage::Pong { payload }));
                }
                Ok(Some(Ok(ClientMessage::Pong { .. } | ClientMessage::Complete { .. }))) => {}
            }
        }

        let (finished_sender, mut finished_receiver) = mpsc::unbounded_channel::<Finished>();
        loop {
            let message = tokio::select! {
                biased;
                Some(finished) = finished_receiver.recv() => {
                    operations.finished(&finished);
                    continue;
                }
                message = next_message(stream) => message,
            };
            let Some(message) = message else {
                return Ok(());
            };
            let Ok(message) = message else {
                return Err(WebSocketError::InvalidMessage);
            };
            match message {
                ClientMessage::ConnectionInit { .. } => {
                    return Err(WebSocketError::TooManyInitialisationRequests);
                }
                ClientMessage::Subscribe { id, payload } => {
                    if operations.is_running(&id) {
                        return Err(WebSocketError::SubscriberAlreadyExists(id));
                    }
                    let generation = operations.next_generation();
                    let finished = Finished {
                        id: id.clone(),
                        generation,
                    };
                    let task = self.subscribe(
                        payload,
                        sender.clone(),
                        finished,
                        finished_sender.clone(),
                    );
                    operations.insert(id, generation, task);
                    tracing::trace!(running = operations.len(), "started operation");
                }
                ClientMessage::Complete { id } => {
                    if operations.cancel(&id) {
                        tracing::debug!(%id, "client completed the operation");
                    }
                }
                ClientMessage::Ping { payload } => {
                    let _ = sender.send(Outgoing::Message(ServerMessage::Pong { payload }));
                }
                ClientMessage::Pong { .. } => {}
            }
        }
    }

    /// Starts an operation. The request goes through the handler right away,
    /// on the thread that read the message.
    fn subscribe(
        &self,
        payload: Object,
        sender: mpsc::UnboundedSender<Outgoing>,
        finished: Finished,
        finished_sender: mpsc::UnboundedSender<Finished>,
    ) -> JoinHandle<()> {
        let id = finished.id.clone();
        let request = web::Request::new(self.uri.clone(), self.headers.clone(), payload).map(
            |mut request| {
                request.id = id.clone();
                request
            },
        );
        let execution = request.map(|request| self.handler.handle(request));

        tokio::spawn(async move {
            let last = match execution {
                Ok(execution) => operation(&id, execution.await, &sender).await,
                Err(error) => Some(ServerMessage::Error {
                    id: id.clone(),
                    payload: error.into_graphql_errors(),
                }),
            };
            // the id is free again once the client sees the last message
            let _ = finished_sender.send(finished);
            if let Some(last) = last {
                let _ = sender.send(Outgoing::Message(last));
            }
        })
    }
}

/// Sends the results of an operation, returning the message that ends it.
///
/// `None` when the connection went away.
async fn operation(
    id: &str,
    response: web::ServiceResult,
    sender: &mpsc::UnboundedSender<Outgoing>,
) -> Option<ServerMessage> {
    let body = match response {
        Ok(response) => response.body,
        Err(error) => {
            tracing::error!(%id, %error, "failed to execute graphql operation");
            let error = graphql::Error::builder()
                .message("Internal server error")
                .classification(ErrorClassification::InternalError)
                .build();
            return Some(ServerMessage::Error {
                id: id.to_string(),
                payload: vec![error],
            });
        }
    };

    if let ResponseBody::Single(response) = &body {
        if response.data.is_none() && !response.errors.is_empty() {
            return Some(ServerMessage::Error {
                id: id.to_string(),
                payload: response.errors.clone(),
            });
        }
    }
    let mut responses = body.into_stream();
    while let Some(response) = responses.next().await {
        let next = ServerMessage::Next {
            id: id.to_string(),
            payload: response,
        };
        sender.send(Outgoing::Message(next)).ok()?;
    }
    Some(ServerMessage::Complete { id: id.to_string() })
}

/// The next protocol message, `None` once the client is gone.
async fn next_message(
    stream: &mut SplitStream<WebSocket>,
) -> Option<Result<ClientMessage, serde_json::Error>> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str())),
            Ok(Message::Binary(bytes)) => return Some(serde_json::from_slice(&bytes)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) | Err(_) => return None,
        }
    }
    None
}
