//! Carries thread-bound, request-scoped state (a security principal, a locale…)
//! from the transport thread to wherever field resolvers and exception
//! resolvers end up running.
//!
//! A [`ThreadLocalAccessor`] knows how to read that state into a
//! [`ContextSnapshot`], and how to re-establish and later clear it. Entering a
//! snapshot saves whatever the thread held before and puts it back on exit, so
//! the thread that took the snapshot is handled like any other: by the time a
//! resolver runs there, it may be serving another request.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context as TaskContext;
use std::task::Poll;

use pin_project_lite::pin_project;

/// Reads thread-bound state into [`ContextValues`], and re-establishes or
/// clears it on the current thread.
///
/// `restore_values` and `reset_values` always come in pairs on the same thread.
/// `restore_values` is also handed the values [`extract_values`](Self::extract_values)
/// found on a thread just before a snapshot was entered there, to put them back.
pub trait ThreadLocalAccessor: Send + Sync + 'static {
    /// Captures the current thread's values into `container`.
    fn extract_values(&self, container: &mut ContextValues);

    /// Re-establishes the captured values on the current thread.
    fn restore_values(&self, values: &ContextValues);

    /// Clears what [`restore_values`](Self::restore_values) established.
    fn reset_values(&self, values: &ContextValues);
}

/// Delegates to several accessors, in registration order.
#[derive(Clone, Default)]
pub struct CompositeAccessor {
    accessors: Vec<Arc<dyn ThreadLocalAccessor>>,
}

impl CompositeAccessor {
    pub fn new(accessors: Vec<Arc<dyn ThreadLocalAccessor>>) -> Self {
        Self { accessors }
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl ThreadLocalAccessor for CompositeAccessor {
    fn extract_values(&self, container: &mut ContextValues) {
        for accessor in &self.accessors {
            accessor.extract_values(container);
        }
    }

    fn restore_values(&self, values: &ContextValues) {
        for accessor in &self.accessors {
            accessor.restore_values(values);
        }
    }

    fn reset_values(&self, values: &ContextValues) {
        for accessor in &self.accessors {
            accessor.reset_values(values);
        }
    }
}

/// String-keyed values captured by a [`ThreadLocalAccessor`].
#[derive(Clone, Default)]
pub struct ContextValues {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ContextValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for ContextValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Values captured on the transport thread, with the accessor that
/// re-establishes them.
///
/// Snapshots are immutable and cheap to clone.
#[derive(Clone)]
pub struct ContextSnapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    values: ContextValues,
    accessor: Arc<dyn ThreadLocalAccessor>,
}

thread_local! {
    // The snapshot whose values are currently established on this thread.
    static ACTIVE: RefCell<Option<ContextSnapshot>> = const { RefCell::new(None) };
}

impl ContextSnapshot {
    /// Captures the current thread's values.
    ///
    /// Returns `None` when the accessor found nothing, in which case there is
    /// nothing to propagate.
    pub fn extract(accessor: Arc<dyn ThreadLocalAccessor>) -> Option<Self> {
        let mut values = ContextValues::new();
        accessor.extract_values(&mut values);
        if values.is_empty() {
            return None;
        }
        tracing::trace!(keys = ?values, "extracted context snapshot");
        Some(ContextSnapshot {
            inner: Arc::new(SnapshotInner { values, accessor }),
        })
    }

    pub fn values(&self) -> &ContextValues {
        &self.inner.values
    }

    /// The captured value under `key`, without restoring anything.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.inner.values.get(key)
    }

    /// Re-establishes the values on the current thread. Must be paired with
    /// [`reset`](Self::reset).
    pub fn restore(&self) {
        self.inner.accessor.restore_values(&self.inner.values);
    }

    /// Clears the values [`restore`](Self::restore) established.
    pub fn reset(&self) {
        self.inner.accessor.reset_values(&self.inner.values);
    }

    /// Restores the values for as long as the returned guard lives.
    ///
    /// When the guard drops, including while unwinding, the values are reset
    /// and whatever the thread held before is put back. Entering a snapshot
    /// that is already established on this thread is a no-op.
    pub fn enter(&self) -> ContextGuard {
        if self.is_active() {
            return ContextGuard::noop();
        }
        let mut saved = ContextValues::new();
        self.inner.accessor.extract_values(&mut saved);
        let previous = ACTIVE.with(|active| active.replace(Some(self.clone())));
        self.restore();
        ContextGuard {
            entered: Some(self.clone()),
            saved,
            previous,
            _not_send: PhantomData,
        }
    }

    /// Wraps `future` so the values are established around each of its polls.
    pub fn scope<F: Future>(&self, future: F) -> ContextScoped<F> {
        ContextScoped::new(Some(self.clone()), future)
    }

    fn is_active(&self) -> bool {
        ACTIVE.with(|active| {
            active
                .borrow()
                .as_ref()
                .is_some_and(|active| Arc::ptr_eq(&active.inner, &self.inner))
        })
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("values", &self.inner.values)
            .finish()
    }
}

/// Resets a restored [`ContextSnapshot`] when dropped.
///
/// Bound to the thread it was created on.
#[must_use = "the snapshot is reset as soon as the guard is dropped"]
pub struct ContextGuard {
    entered: Option<ContextSnapshot>,
    // What the thread held when the snapshot was entered.
    saved: ContextValues,
    previous: Option<ContextSnapshot>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    fn noop() -> Self {
        ContextGuard {
            entered: None,
            saved: ContextValues::new(),
            previous: None,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(entered) = self.entered.take() {
            entered.reset();
            if !self.saved.is_empty() {
                entered.inner.accessor.restore_values(&self.saved);
            }
            ACTIVE.with(|active| *active.borrow_mut() = self.previous.take());
        }
    }
}

pin_project! {
    /// A future that establishes a [`ContextSnapshot`] around each poll of
    /// the future it wraps.
    pub struct ContextScoped<F> {
        snapshot: Option<ContextSnapshot>,
        #[pin]
        inner: F,
    }
}

impl<F> ContextScoped<F> {
    /// Without a snapshot, the future is polled as is.
    pub fn new(snapshot: Option<ContextSnapshot>, inner: F) -> Self {
        Self { snapshot, inner }
    }
}

impl<F: Future> Future for ContextScoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.snapshot.as_ref().map(ContextSnapshot::enter);
        this.inner.poll(cx)
    }
}
