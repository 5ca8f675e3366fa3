//! Execution context: metadata binding, cancellation and deadlines.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Metadata, RpcError};

/// Immutable execution context threaded through every call.
///
/// A context carries the metadata bound to the current call, an optional
/// deadline, and a cancellation token. Deriving a context (`with_*`) never
/// mutates the parent; clones share the same state.
///
/// Metadata binding is layered: `ctx.with_metadata(m).metadata()` yields
/// exactly `m`, and the innermost bind wins across nested derivations.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    metadata: Metadata,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Context {
    /// The root context: no metadata, no deadline, never cancelled on its
    /// own.
    pub fn background() -> Self {
        Self::default()
    }

    /// Bind `metadata` to this context.
    ///
    /// The derived context yields exactly `metadata`, not a merge with
    /// outer layers.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                metadata,
                deadline: self.inner.deadline,
                cancel: self.inner.cancel.clone(),
            }),
        }
    }

    /// Metadata bound to this context; the empty mapping if none was bound.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Derive a context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline`.
    ///
    /// An earlier deadline inherited from the parent is kept; deadlines only
    /// ever tighten.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.inner.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            inner: Arc::new(ContextInner {
                metadata: self.inner.metadata.clone(),
                deadline: Some(deadline),
                cancel: self.inner.cancel.clone(),
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Derive a cancellable context and the handle that cancels it.
    ///
    /// Cancelling the handle cancels the derived context and everything
    /// derived from it; the parent is unaffected. Cancellation of the parent
    /// still propagates down.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.inner.cancel.child_token();
        let ctx = Self {
            inner: Arc::new(ContextInner {
                metadata: self.inner.metadata.clone(),
                deadline: self.inner.deadline,
                cancel: token.clone(),
            }),
        };
        (ctx, CancelHandle { token })
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Resolves when the context ends, with the error saying why:
    /// [`RpcError::Cancelled`] or [`RpcError::DeadlineExceeded`].
    ///
    /// Pends forever on a context with neither a cancellable ancestor nor a
    /// deadline; callers race it against the work they are bounding.
    pub async fn done(&self) -> RpcError {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.cancel.cancelled() => RpcError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => RpcError::DeadlineExceeded,
                }
            }
            None => {
                self.inner.cancel.cancelled().await;
                RpcError::Cancelled
            }
        }
    }
}

/// Cancels the context subtree it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the associated context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_extract_is_lossless() {
        let ctx = Context::background();
        assert!(ctx.metadata().is_empty());

        let md = Metadata::new().with("trace-id", "abc123");
        let bound = ctx.with_metadata(md.clone());
        assert_eq!(*bound.metadata(), md);

        // Empty mapping round-trips too.
        let rebound = bound.with_metadata(Metadata::new());
        assert!(rebound.metadata().is_empty());
    }

    #[test]
    fn innermost_bind_wins() {
        let outer = Metadata::new().with("k", "outer");
        let inner = Metadata::new().with("k", "inner");
        let ctx = Context::background()
            .with_metadata(outer)
            .with_metadata(inner.clone());
        assert_eq!(*ctx.metadata(), inner);
    }

    #[test]
    fn deadlines_only_tighten() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let early = ctx.deadline().unwrap();
        let widened = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(widened.deadline(), Some(early));
    }

    #[tokio::test]
    async fn cancel_propagates_to_derived_contexts() {
        let (ctx, handle) = Context::background().with_cancel();
        let derived = ctx.with_metadata(Metadata::new().with("k", "v"));
        assert!(!derived.is_cancelled());
        handle.cancel();
        assert!(derived.is_cancelled());
        derived.cancelled().await;
    }

    #[tokio::test]
    async fn cancelling_a_child_leaves_the_parent_alone() {
        let (parent, _parent_handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn done_reports_cancellation() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        assert!(matches!(ctx.done().await, RpcError::Cancelled));
    }

    #[tokio::test]
    async fn done_reports_deadline_expiry() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        assert!(matches!(ctx.done().await, RpcError::DeadlineExceeded));
    }
}
