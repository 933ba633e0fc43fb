//! Serves a GraphQL engine over HTTP and WebSocket, with request interception,
//! context propagation into field resolvers and exception resolution.

#![warn(unreachable_pub)]

pub mod json_ext;

mod axum_factory;
pub mod configuration;
pub mod context;
pub mod error;
pub mod execution;
pub mod graphql;
mod metrics;
pub mod protocols;
pub mod services;
pub mod test_harness;
pub mod web;

pub use axum_factory::make_axum_router;
pub use configuration::Configuration;
pub use context::Context;
pub use context::ContextSnapshot;
pub use context::ThreadLocalAccessor;
pub use execution::DataFetcherError;
pub use execution::DataFetcherExceptionResolver;
pub use execution::ExceptionResolverAdapter;
pub use execution::ExceptionResolvers;
pub use execution::ExecutionGraphQlService;
pub use execution::FieldEnvironment;
pub use execution::GraphQlEngine;
pub use execution::GraphQlSource;
pub use execution::SchemaBuilderExt;
pub use test_harness::GraphQlTester;
pub use web::Next;
pub use web::WebGraphQlHandler;
pub use web::WebInterceptor;
pub use web::interceptor_fn;

/// The input of the interception chain.
pub type WebInput = services::web::Request;
/// The output of the interception chain.
pub type WebOutput = services::web::Response;
