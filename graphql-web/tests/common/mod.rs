//! A small project catalog served through the GraphQL web stack.
#![allow(dead_code)]

use std::cell::RefCell;
use std::time::Duration;

use async_graphql::EmptyMutation;
use async_graphql::Object;
use async_graphql::Schema;
use async_graphql::SimpleObject;
use async_graphql::Subscription;
use displaydoc::Display;
use futures::Stream;
use graphql_web::ContextSnapshot;
use graphql_web::DataFetcherError;
use graphql_web::ExceptionResolverAdapter;
use graphql_web::ExceptionResolvers;
use graphql_web::ExecutionGraphQlService;
use graphql_web::FieldEnvironment;
use graphql_web::GraphQlSource;
use graphql_web::SchemaBuilderExt;
use graphql_web::ThreadLocalAccessor;
use graphql_web::WebGraphQlHandler;
use graphql_web::context::ContextValues;
use graphql_web::graphql::ErrorClassification;
use graphql_web::web::WebGraphQlHandlerBuilder;
use thiserror::Error;

thread_local! {
    pub static PRINCIPAL: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub fn set_principal(principal: Option<&str>) {
    PRINCIPAL.with(|current| *current.borrow_mut() = principal.map(str::to_string));
}

pub fn principal() -> Option<String> {
    PRINCIPAL.with(|current| current.borrow().clone())
}

/// Propagates [`PRINCIPAL`].
pub struct PrincipalAccessor;

impl ThreadLocalAccessor for PrincipalAccessor {
    fn extract_values(&self, container: &mut ContextValues) {
        if let Some(principal) = principal() {
            container.insert("principal", principal);
        }
    }

    fn restore_values(&self, values: &ContextValues) {
        set_principal(values.get::<String>("principal").map(String::as_str));
    }

    fn reset_values(&self, _values: &ContextValues) {
        set_principal(None);
    }
}

#[derive(Debug, Error, Display)]
pub enum ProjectError {
    /// No project named {0}
    NotFound(String),
    /// Access to {0} is restricted
    Restricted(String),
}

#[derive(SimpleObject, Clone)]
pub struct Project {
    pub slug: String,
    pub name: String,
    pub releases: Vec<Release>,
}

#[derive(SimpleObject, Clone)]
pub struct Release {
    pub version: String,
}

pub struct Query;

#[Object]
impl Query {
    async fn project(&self, slug: String) -> async_graphql::Result<Option<Project>> {
        match slug.as_str() {
            "spring-framework" => Ok(Some(Project {
                slug,
                name: "Spring Framework".to_string(),
                releases: vec![
                    Release {
                        version: "6.1.0".to_string(),
                    },
                    Release {
                        version: "6.0.9".to_string(),
                    },
                ],
            })),
            "spring-internal" => Err(async_graphql::Error::new_with_source(
                ProjectError::Restricted(slug),
            )),
            _ => Err(async_graphql::Error::new_with_source(
                ProjectError::NotFound(slug),
            )),
        }
    }

    async fn whoami(&self) -> Option<String> {
        principal()
    }

    async fn crash(&self) -> async_graphql::Result<Option<String>> {
        Err("Unexpected failure".into())
    }
}

pub struct Greetings;

#[Subscription]
impl Greetings {
    async fn greetings(&self) -> impl Stream<Item = String> {
        futures::stream::iter(["Hi", "Bonjour", "Hola"].map(String::from))
    }

    /// Counts up every 20ms, forever.
    async fn ticks(&self) -> impl Stream<Item = u32> {
        futures::stream::unfold(0, |tick| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some((tick, tick + 1))
        })
    }
}

pub type CatalogSchema = Schema<Query, EmptyMutation, Greetings>;

pub fn schema(resolvers: ExceptionResolvers) -> CatalogSchema {
    Schema::build(Query, EmptyMutation, Greetings)
        .exception_resolvers(resolvers)
        .finish()
}

/// Reports [`ProjectError`]s with their own classification.
pub fn project_error_resolver() -> ExceptionResolverAdapter {
    ExceptionResolverAdapter::single_error(|error: &DataFetcherError, env: &FieldEnvironment| {
        let cause = error.cause::<ProjectError>()?;
        let classification = match cause {
            ProjectError::NotFound(_) => ErrorClassification::NotFound,
            ProjectError::Restricted(_) => ErrorClassification::Forbidden,
        };
        Some(env.error(cause.to_string(), classification))
    })
}

pub fn handler_builder(resolvers: ExceptionResolvers) -> WebGraphQlHandlerBuilder {
    WebGraphQlHandler::builder(ExecutionGraphQlService::new(GraphQlSource::new(schema(
        resolvers,
    ))))
}

/// A handler resolving [`ProjectError`]s and propagating [`PRINCIPAL`].
pub fn handler() -> WebGraphQlHandler {
    handler_builder(ExceptionResolvers::new().resolver(project_error_resolver()))
        .thread_local_accessor(PrincipalAccessor)
        .build()
}

/// The principal seen by exception resolvers, if any.
pub fn principal_of(env: &FieldEnvironment) -> Option<String> {
    env.snapshot()
        .and_then(|snapshot: &ContextSnapshot| snapshot.get::<String>("principal"))
        .cloned()
}
