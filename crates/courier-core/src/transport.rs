//! Transport capabilities: the seams to the broker integration layer.
//!
//! The core never talks to a broker. It consumes two abstract capabilities:
//! a [`ServerTransport`] that delivers inbound envelopes to a handler, and a
//! [`ClientTransport`] that sends a request envelope and resolves with the
//! correlated response. Delivery, acknowledgment and redelivery policy live
//! entirely behind these traits.

use std::future::Future;

use crate::{Context, Envelope, RpcError, TransportError};

/// Server-side request handler capability.
///
/// The transport calls it once per inbound request envelope and sends back
/// exactly the envelope it returns. [`Dispatcher`](crate::Dispatcher) is the
/// implementor that matters in practice.
pub trait EnvelopeHandler: Send + Sync + 'static {
    fn handle(&self, ctx: Context, request: Envelope) -> impl Future<Output = Envelope> + Send;
}

/// Delivers inbound envelopes to a handler until the context ends.
pub trait ServerTransport: Send + Sync + 'static {
    /// Serve `handler` until `ctx` is cancelled or its deadline passes, then
    /// return.
    ///
    /// Each delivered envelope is handled independently and concurrently;
    /// handling one envelope must not block delivery of the next. The
    /// transport adds no deduplication; a handler runs as many times as the
    /// transport delivers its envelope.
    fn serve<H>(
        &self,
        ctx: Context,
        handler: H,
    ) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        H: EnvelopeHandler;
}

/// Sends a request envelope and resolves with the correlated response.
pub trait ClientTransport: Send + Sync + 'static {
    /// Send `envelope` and await the response that carries the same call id.
    ///
    /// The transport assigns the correlation id and owns the pending-call
    /// bookkeeping. The wait is bounded by `ctx`: cancellation or deadline
    /// expiry resolves the call with [`RpcError::Cancelled`] or
    /// [`RpcError::DeadlineExceeded`] promptly, and the pending registration
    /// is removed so nothing leaks. Whether the server still completes a
    /// cancelled call is unspecified.
    fn request(
        &self,
        ctx: &Context,
        envelope: Envelope,
    ) -> impl Future<Output = Result<Envelope, RpcError>> + Send;
}
