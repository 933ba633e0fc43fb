//! Turns failures raised while resolving a field into GraphQL errors.
//!
//! Resolvers are tried in registration order; the first one that produces a
//! list of errors (possibly empty) wins. When none does, or when the chain
//! itself fails, the field gets a single `INTERNAL_ERROR` carrying the
//! original message.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tower::BoxError;

use crate::configuration::Configuration;
use crate::context::ContextScoped;
use crate::context::ContextSnapshot;
use crate::error::ResolutionError;
use crate::graphql;
use crate::graphql::ErrorClassification;
use crate::graphql::Location;
use crate::json_ext::Path;

/// A failure raised by a field resolver.
#[derive(Clone)]
pub struct DataFetcherError {
    message: String,
    locations: Vec<Location>,
    source: Option<Arc<dyn Any + Send + Sync>>,
}

impl DataFetcherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            source: None,
        }
    }

    /// Attaches the typed value the failure was raised with.
    pub fn with_source<T: Any + Send + Sync>(mut self, source: T) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// The value the failure was raised with, if it is a `T`.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.source.as_deref()?.downcast_ref::<T>()
    }

    /// Finds the underlying error of type `T`.
    ///
    /// Looks at the value the failure was raised with, then, when that value
    /// is a [`BoxError`], through the boxed error and its chain of sources.
    pub fn cause<T: std::error::Error + Send + Sync + 'static>(&self) -> Option<&T> {
        if let Some(cause) = self.downcast_ref::<T>() {
            return Some(cause);
        }
        let boxed = self.downcast_ref::<BoxError>()?;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(boxed.as_ref());
        while let Some(error) = current {
            if let Some(cause) = error.downcast_ref::<T>() {
                return Some(cause);
            }
            current = error.source();
        }
        None
    }
}

impl From<&async_graphql::ServerError> for DataFetcherError {
    fn from(error: &async_graphql::ServerError) -> Self {
        Self {
            message: error.message.clone(),
            locations: error.locations.iter().copied().map(Into::into).collect(),
            source: error.source.clone(),
        }
    }
}

impl fmt::Debug for DataFetcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFetcherError")
            .field("message", &self.message)
            .field("locations", &self.locations)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DataFetcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// The field whose resolution failed.
#[derive(Clone, Debug)]
pub struct FieldEnvironment {
    path: Path,
    locations: Vec<Location>,
    parent_type: String,
    field_name: String,
    return_type: String,
    snapshot: Option<ContextSnapshot>,
}

#[buildstructor::buildstructor]
impl FieldEnvironment {
    #[builder(visibility = "pub")]
    fn new(
        path: Path,
        locations: Vec<Location>,
        parent_type: String,
        field_name: String,
        return_type: Option<String>,
        snapshot: Option<ContextSnapshot>,
    ) -> Self {
        Self {
            path,
            locations,
            parent_type,
            field_name,
            return_type: return_type.unwrap_or_default(),
            snapshot,
        }
    }

    /// Path of the field in the response.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// The ambient context captured for the request, if any.
    pub fn snapshot(&self) -> Option<&ContextSnapshot> {
        self.snapshot.as_ref()
    }

    /// An error for this field, with its path and locations filled in.
    pub fn error(
        &self,
        message: impl Into<String>,
        classification: ErrorClassification,
    ) -> graphql::Error {
        graphql::Error::builder()
            .message(message)
            .locations(self.locations.clone())
            .path(self.path.clone())
            .classification(classification)
            .build()
    }
}

/// Resolves a field failure to GraphQL errors.
///
/// `Ok(None)` defers to the next resolver. `Ok(Some(vec![]))` resolves the
/// failure without reporting any error.
#[async_trait::async_trait]
pub trait DataFetcherExceptionResolver: Send + Sync + 'static {
    async fn resolve_exception(
        &self,
        error: &DataFetcherError,
        env: &FieldEnvironment,
    ) -> Result<Option<Vec<graphql::Error>>, BoxError>;
}

type ResolveFn =
    dyn Fn(&DataFetcherError, &FieldEnvironment) -> Option<Vec<graphql::Error>> + Send + Sync;

/// Adapts a synchronous function into a [`DataFetcherExceptionResolver`].
///
/// The ambient context of the request is established while the function runs.
pub struct ExceptionResolverAdapter {
    resolve: Box<ResolveFn>,
}

impl ExceptionResolverAdapter {
    /// A resolver producing any number of errors.
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&DataFetcherError, &FieldEnvironment) -> Option<Vec<graphql::Error>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            resolve: Box::new(resolve),
        }
    }

    /// A resolver producing at most one error.
    pub fn single_error<F>(resolve: F) -> Self
    where
        F: Fn(&DataFetcherError, &FieldEnvironment) -> Option<graphql::Error>
            + Send
            + Sync
            + 'static,
    {
        Self::new(move |error: &DataFetcherError, env: &FieldEnvironment| {
            resolve(error, env).map(|error| vec![error])
        })
    }
}

#[async_trait::async_trait]
impl DataFetcherExceptionResolver for ExceptionResolverAdapter {
    async fn resolve_exception(
        &self,
        error: &DataFetcherError,
        env: &FieldEnvironment,
    ) -> Result<Option<Vec<graphql::Error>>, BoxError> {
        let _guard = env.snapshot().map(ContextSnapshot::enter);
        Ok((self.resolve)(error, env))
    }
}

/// The ordered chain of [`DataFetcherExceptionResolver`]s.
#[derive(Clone, Default)]
pub struct ExceptionResolvers {
    resolvers: Vec<Arc<dyn DataFetcherExceptionResolver>>,
    timeout: Option<Duration>,
}

impl ExceptionResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty chain with the `execution` options of `configuration` applied.
    pub fn configured(configuration: &Configuration) -> Self {
        Self::new().timeout(configuration.execution.exception_resolution_timeout)
    }

    /// Appends a resolver to the chain.
    pub fn resolver(mut self, resolver: impl DataFetcherExceptionResolver) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Bounds the time spent resolving one failure. Unbounded by default.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolves `error` to the field's final errors.
    ///
    /// Never fails: resolver failures, panics and timeouts fall back to a
    /// single `INTERNAL_ERROR` after a warning.
    pub async fn resolve(
        &self,
        error: &DataFetcherError,
        env: &FieldEnvironment,
    ) -> Vec<graphql::Error> {
        let resolved = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.try_resolvers(error, env))
                .await
                .unwrap_or_else(|_| Err(ResolutionError::Timeout(timeout))),
            None => self.try_resolvers(error, env).await,
        };
        match resolved {
            Ok(Some(errors)) => errors,
            Ok(None) => vec![default_error(error, env)],
            Err(resolution_error) => {
                tracing::warn!(
                    path = %env.path(),
                    error = %resolution_error,
                    "failed to resolve exception, falling back to the default error"
                );
                vec![default_error(error, env)]
            }
        }
    }

    async fn try_resolvers(
        &self,
        error: &DataFetcherError,
        env: &FieldEnvironment,
    ) -> Result<Option<Vec<graphql::Error>>, ResolutionError> {
        for resolver in &self.resolvers {
            let resolving = ContextScoped::new(
                env.snapshot().cloned(),
                resolver.resolve_exception(error, env),
            );
            match AssertUnwindSafe(resolving).catch_unwind().await {
                Ok(Ok(Some(errors))) => return Ok(Some(errors)),
                Ok(Ok(None)) => continue,
                Ok(Err(error)) => return Err(ResolutionError::Resolver(error)),
                Err(panic) => return Err(ResolutionError::Panicked(panic_message(&*panic))),
            }
        }
        Ok(None)
    }
}

/// A chain is itself a resolver: it defers when none of its resolvers produced errors.
#[async_trait::async_trait]
impl DataFetcherExceptionResolver for ExceptionResolvers {
    async fn resolve_exception(
        &self,
        error: &DataFetcherError,
        env: &FieldEnvironment,
    ) -> Result<Option<Vec<graphql::Error>>, BoxError> {
        Ok(self.try_resolvers(error, env).await?)
    }
}

fn default_error(error: &DataFetcherError, env: &FieldEnvironment) -> graphql::Error {
    env.error(error.message(), ErrorClassification::InternalError)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use displaydoc::Display;
    use pretty_assertions::assert_eq;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Display, Error)]
    /// project {0} not found
    struct ProjectNotFound(String);

    #[derive(Debug, Display, Error)]
    /// repository unavailable
    struct RepositoryUnavailable {
        #[source]
        source: ProjectNotFound,
    }

    fn env() -> FieldEnvironment {
        FieldEnvironment::builder()
            .path(Path::from("project"))
            .location(Location { line: 1, column: 3 })
            .parent_type("Query")
            .field_name("project")
            .return_type("Project")
            .build()
    }

    struct Deferring(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl DataFetcherExceptionResolver for Deferring {
        async fn resolve_exception(
            &self,
            _error: &DataFetcherError,
            _env: &FieldEnvironment,
        ) -> Result<Option<Vec<graphql::Error>>, BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl DataFetcherExceptionResolver for Failing {
        async fn resolve_exception(
            &self,
            _error: &DataFetcherError,
            _env: &FieldEnvironment,
        ) -> Result<Option<Vec<graphql::Error>>, BoxError> {
            Err("resolver bug".into())
        }
    }

    #[test]
    fn configured_from_the_execution_options() {
        assert_eq!(ExceptionResolvers::configured(&Configuration::default()).timeout, None);
        let configuration =
            Configuration::from_yaml("execution:\n  exception_resolution_timeout: 2s\n").unwrap();
        assert_eq!(
            ExceptionResolvers::configured(&configuration).timeout,
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn first_non_empty_result_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));
        let resolvers = ExceptionResolvers::new()
            .resolver(Deferring(first.clone()))
            .resolver(ExceptionResolverAdapter::single_error(|error, env| {
                error
                    .downcast_ref::<ProjectNotFound>()
                    .map(|not_found| env.error(not_found.to_string(), ErrorClassification::NotFound))
            }))
            .resolver(Deferring(third.clone()));

        let error =
            DataFetcherError::new("project x not found").with_source(ProjectNotFound("x".into()));
        let errors = resolvers.resolve(&error, &env()).await;

        assert_eq!(
            errors,
            vec![graphql::Error::builder()
                .message("project x not found")
                .path(Path::from("project"))
                .location(Location { line: 1, column: 3 })
                .classification(ErrorClassification::NotFound)
                .build()]
        );
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_list_resolves_without_errors() {
        let third = Arc::new(AtomicUsize::new(0));
        let resolvers = ExceptionResolvers::new()
            .resolver(ExceptionResolverAdapter::new(|_, _| Some(Vec::new())))
            .resolver(Deferring(third.clone()));

        let errors = resolvers
            .resolve(&DataFetcherError::new("ignored"), &env())
            .await;
        assert!(errors.is_empty());
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_deferring_falls_back_to_internal_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolvers = ExceptionResolvers::new()
            .resolver(Deferring(calls.clone()))
            .resolver(Deferring(calls.clone()));

        let errors = resolvers
            .resolve(&DataFetcherError::new("connection reset"), &env())
            .await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "connection reset");
        assert_eq!(errors[0].classification(), ErrorClassification::InternalError);
        assert_eq!(errors[0].path, Some(Path::from("project")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test)]
    async fn failing_resolver_falls_back_to_internal_error() {
        let resolvers = ExceptionResolvers::new()
            .resolver(Failing)
            .resolver(ExceptionResolverAdapter::new(|_, env| {
                Some(vec![env.error("unreachable", ErrorClassification::BadRequest)])
            }));

        let errors = resolvers.resolve(&DataFetcherError::new("boom"), &env()).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert_eq!(errors[0].classification(), ErrorClassification::InternalError);
    }

    #[test_log::test(tokio::test)]
    async fn panicking_resolver_falls_back_to_internal_error() {
        let resolvers = ExceptionResolvers::new().resolver(ExceptionResolverAdapter::new(|_, _| {
            panic!("resolver panicked");
        }));

        let errors = resolvers.resolve(&DataFetcherError::new("boom"), &env()).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].classification(), ErrorClassification::InternalError);
    }

    #[tokio::test]
    async fn slow_resolver_times_out() {
        struct Slow;

        #[async_trait::async_trait]
        impl DataFetcherExceptionResolver for Slow {
            async fn resolve_exception(
                &self,
                _error: &DataFetcherError,
                env: &FieldEnvironment,
            ) -> Result<Option<Vec<graphql::Error>>, BoxError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Some(vec![env.error("too late", ErrorClassification::NotFound)]))
            }
        }

        let resolvers = ExceptionResolvers::new()
            .resolver(Slow)
            .timeout(Some(Duration::from_millis(50)));
        let errors = resolvers.resolve(&DataFetcherError::new("slow"), &env()).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "slow");
        assert_eq!(errors[0].classification(), ErrorClassification::InternalError);
    }

    #[tokio::test]
    async fn chain_as_resolver_defers() {
        let nested = ExceptionResolvers::new().resolver(Deferring(Arc::new(AtomicUsize::new(0))));
        let result = nested
            .resolve_exception(&DataFetcherError::new("x"), &env())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cause_unwraps_boxed_errors_and_sources() {
        let direct = DataFetcherError::new("x").with_source(ProjectNotFound("x".into()));
        assert_eq!(direct.cause::<ProjectNotFound>().unwrap().0, "x");

        let boxed: BoxError = Box::new(RepositoryUnavailable {
            source: ProjectNotFound("y".into()),
        });
        let wrapped = DataFetcherError::new("repository unavailable").with_source(boxed);
        assert!(wrapped.cause::<RepositoryUnavailable>().is_some());
        assert_eq!(wrapped.cause::<ProjectNotFound>().unwrap().0, "y");
        assert!(wrapped.downcast_ref::<ProjectNotFound>().is_none());
    }
}
