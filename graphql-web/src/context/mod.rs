//! Provide a [`Context`] for the request lifecycle, and the bridge that carries
//! ambient, thread-bound state into field resolution.

use std::sync::Arc;

use parking_lot::Mutex;

mod propagation;

pub use self::propagation::CompositeAccessor;
pub use self::propagation::ContextGuard;
pub use self::propagation::ContextScoped;
pub use self::propagation::ContextSnapshot;
pub use self::propagation::ContextValues;
pub use self::propagation::ThreadLocalAccessor;

/// Context for a [`crate::services::web::Request`]
///
/// Holds typed values, at most one per type, shared by interceptors, the
/// execution service and the transports for the lifetime of one request.
/// Values need not be serializable.
///
/// Clones share the same underlying storage.
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: Arc<Mutex<http::Extensions>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.values.lock().insert(value)
    }

    /// Gets a clone of the value of type `T`, if present.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values.lock().get::<T>().cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.lock().get::<T>().is_some()
    }

    /// Removes the value of type `T`, returning it.
    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.values.lock().remove::<T>()
    }
}
