//! Hooks the exception resolution chain and the context bridge into field
//! resolution, as an engine extension.
//!
//! Failed fields are never handed back to the engine as errors while a
//! [`FieldErrorCollector`] is installed: the engine leaves a failed field out
//! of its parent object, whatever its nullability. Instead a failed field
//! resolves to `null`, its errors go to the collector, and a non-null field
//! leaves a pending null that its ancestors settle on the way out.

use std::sync::Arc;
use std::time::Instant;

use async_graphql::ServerError;
use async_graphql::ServerResult;
use async_graphql::extensions::Extension;
use async_graphql::extensions::ExtensionContext;
use async_graphql::extensions::ExtensionFactory;
use async_graphql::extensions::NextResolve;
use async_graphql::extensions::ResolveInfo;
use parking_lot::Mutex;

use super::exception::DataFetcherError;
use super::exception::ExceptionResolvers;
use super::exception::FieldEnvironment;
use crate::context::ContextScoped;
use crate::context::ContextSnapshot;
use crate::graphql;
use crate::graphql::ErrorClassification;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::metrics;

/// Marks an engine error that already went through the resolution chain, so
/// that enclosing fields do not resolve it again.
struct ResolvedFieldError;

#[derive(Default)]
struct Collected {
    errors: Vec<graphql::Error>,
    /// Non-null fields that resolved to `null`, not yet absorbed by a
    /// nullable ancestor.
    pending_nulls: Vec<Path>,
}

/// Field errors and pending non-null violations of one execution.
#[derive(Clone, Default)]
pub(crate) struct FieldErrorCollector(Arc<Mutex<Collected>>);

impl FieldErrorCollector {
    fn extend(&self, errors: impl IntoIterator<Item = graphql::Error>) {
        self.0.lock().errors.extend(errors);
    }

    fn push_null(&self, path: Path) {
        self.0.lock().pending_nulls.push(path);
    }

    fn has_pending_nulls(&self) -> bool {
        !self.0.lock().pending_nulls.is_empty()
    }

    /// Removes and returns the pending nulls strictly below `path`.
    fn take_nulls_below(&self, path: &Path) -> Vec<Path> {
        let mut collected = self.0.lock();
        let (below, others): (Vec<Path>, Vec<Path>) = std::mem::take(&mut collected.pending_nulls)
            .into_iter()
            .partition(|pending| pending.len() > path.len() && pending.starts_with(path));
        collected.pending_nulls = others;
        below
    }

    pub(crate) fn drain(&self) -> Vec<graphql::Error> {
        std::mem::take(&mut self.0.lock().errors)
    }

    /// Whether a pending null reached the root, which nulls the whole data
    /// section. Clears the pending nulls.
    pub(crate) fn take_root_null(&self) -> bool {
        !std::mem::take(&mut self.0.lock().pending_nulls).is_empty()
    }
}

/// Engine extension resolving field failures through [`ExceptionResolvers`].
///
/// Install it with [`SchemaBuilderExt::exception_resolvers`].
pub struct DataFetcherExtension {
    resolvers: Arc<ExceptionResolvers>,
}

impl DataFetcherExtension {
    pub fn new(resolvers: ExceptionResolvers) -> Self {
        Self {
            resolvers: Arc::new(resolvers),
        }
    }
}

impl ExtensionFactory for DataFetcherExtension {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(DataFetcherExtensionImpl {
            resolvers: self.resolvers.clone(),
        })
    }
}

struct DataFetcherExtensionImpl {
    resolvers: Arc<ExceptionResolvers>,
}

#[async_trait::async_trait]
impl Extension for DataFetcherExtensionImpl {
    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<async_graphql::Value>> {
        let snapshot = ctx.data_opt::<ContextSnapshot>();
        let collector = ctx.data_opt::<FieldErrorCollector>();
        let path_node = info.path_node;
        let parent_type = info.parent_type.to_string();
        let field_name = info.name.to_string();
        let return_type = info.return_type.to_string();
        let nullable = !return_type.ends_with('!');

        let started = Instant::now();
        let result = ContextScoped::new(snapshot.cloned(), next.run(ctx, info)).await;
        metrics::record_data_fetcher(started.elapsed(), path_node, result.is_ok());

        let error = match result {
            Ok(value) => {
                let Some(collector) = collector.filter(|collector| collector.has_pending_nulls())
                else {
                    return Ok(value);
                };
                let path = Path::from_query_path(path_node);
                return Ok(settle_nulls(collector, path, &return_type, value));
            }
            Err(error) if error.source::<ResolvedFieldError>().is_some() => return Err(error),
            Err(error) => error,
        };

        let env = FieldEnvironment::builder()
            .path(Path::from_query_path(path_node))
            .locations(
                error
                    .locations
                    .iter()
                    .copied()
                    .map(graphql::Location::from)
                    .collect::<Vec<_>>(),
            )
            .parent_type(parent_type)
            .field_name(field_name)
            .return_type(return_type)
            .and_snapshot(snapshot.cloned())
            .build();
        let exception = DataFetcherError::from(&error);
        tracing::debug!(path = %env.path(), error = %exception, "resolving field exception");

        let mut errors = self.resolvers.resolve(&exception, &env).await;
        // A silenced failure still leaves a null behind, which a non-null
        // field cannot hold.
        if errors.is_empty() && !nullable {
            errors.push(non_null_violation(&env));
        }

        let Some(collector) = collector else {
            return match errors.into_iter().next() {
                Some(first) => Err(mark_resolved(first.to_server_error())),
                None => Ok(None),
            };
        };
        collector.extend(errors);
        if !nullable {
            collector.push_null(env.path().clone());
        }
        Ok(None)
    }
}

/// Absorbs the pending nulls below `path` into the field's value.
///
/// A nullable list item is nulled in place. Otherwise the whole field
/// becomes `null`, and a non-null field passes the null on to its parent.
fn settle_nulls(
    collector: &FieldErrorCollector,
    path: Path,
    return_type: &str,
    mut value: Option<async_graphql::Value>,
) -> Option<async_graphql::Value> {
    let below = collector.take_nulls_below(&path);
    let absorbed = below.iter().all(|pending| {
        value
            .as_mut()
            .is_some_and(|value| null_list_item(value, return_type, &pending.0[path.len()..]))
    });
    if absorbed {
        return value;
    }
    if return_type.ends_with('!') {
        collector.push_null(path);
    }
    None
}

/// Nulls the nearest nullable list item on the way to `rest`, if any.
fn null_list_item(value: &mut async_graphql::Value, ty: &str, rest: &[PathElement]) -> bool {
    let ty = ty.strip_suffix('!').unwrap_or(ty);
    let Some(item_ty) = ty.strip_prefix('[').and_then(|ty| ty.strip_suffix(']')) else {
        return false;
    };
    let (Some(PathElement::Index(index)), async_graphql::Value::List(items)) =
        (rest.first(), value)
    else {
        return false;
    };
    let Some(item) = items.get_mut(*index) else {
        return false;
    };
    if null_list_item(item, item_ty, &rest[1..]) {
        return true;
    }
    if item_ty.ends_with('!') {
        return false;
    }
    *item = async_graphql::Value::Null;
    true
}

fn non_null_violation(env: &FieldEnvironment) -> graphql::Error {
    env.error(
        format!(
            "The field at path '{}' was declared as a non null type, but the code involved in retrieving data has wrongly returned a null value",
            env.path()
        ),
        ErrorClassification::InternalError,
    )
}

fn mark_resolved(mut error: ServerError) -> ServerError {
    error.source = Some(Arc::new(ResolvedFieldError));
    error
}

/// Installs the exception resolution chain on a schema under construction.
pub trait SchemaBuilderExt: Sized {
    fn exception_resolvers(self, resolvers: ExceptionResolvers) -> Self;
}

impl<Query, Mutation, Subscription> SchemaBuilderExt
    for async_graphql::SchemaBuilder<Query, Mutation, Subscription>
where
    Query: async_graphql::ObjectType + 'static,
    Mutation: async_graphql::ObjectType + 'static,
    Subscription: async_graphql::SubscriptionType + 'static,
{
    fn exception_resolvers(self, resolvers: ExceptionResolvers) -> Self {
        self.extension(DataFetcherExtension::new(resolvers))
    }
}
