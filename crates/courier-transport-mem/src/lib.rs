//! courier-transport-mem: In-process transport for courier.
//!
//! This is the **semantic reference** implementation of the two transport
//! capabilities. Broker-backed transports must behave identically to this
//! one where the core is concerned; if behavior differs, the other transport
//! has a bug.
//!
//! # Characteristics
//!
//! - Envelopes are passed through async channels (no serialization)
//! - Full call semantics: correlation, cancellation, deadlines
//! - The client half owns the pending-call table and an explicit demux loop
//!
//! # Usage
//!
//! ```ignore
//! let (client, server) = MemTransport::pair();
//! tokio::spawn(client.clone().run());
//! tokio::spawn(async move { server.serve(serve_ctx, dispatcher).await });
//! ```

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use courier_core::{
    CallId, ClientTransport, Context, Envelope, EnvelopeHandler, ErrorCode, RemoteError, RpcError,
    ServerTransport, TransportError,
};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Channel capacity for the in-proc transport.
const CHANNEL_CAPACITY: usize = 64;

const DEFAULT_MAX_PENDING: usize = 8192;

fn max_pending() -> usize {
    std::env::var("COURIER_MAX_PENDING")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_PENDING)
}

/// Entry point for the in-process transport.
pub struct MemTransport;

impl MemTransport {
    /// Create a connected client/server pair.
    ///
    /// Requests sent by the client half are delivered to the server half;
    /// response envelopes flow back and are routed to the caller waiting on
    /// the matching call id. The client's demux loop
    /// ([`MemClientTransport::run`]) must be running for responses to be
    /// delivered.
    pub fn pair() -> (MemClientTransport, MemServerTransport) {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let client = MemClientTransport {
            inner: Arc::new(ClientInner {
                requests: request_tx,
                responses: tokio::sync::Mutex::new(response_rx),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        };
        let server = MemServerTransport {
            inner: Arc::new(ServerInner {
                requests: tokio::sync::Mutex::new(request_rx),
                responses: response_tx,
                closed: AtomicBool::new(false),
            }),
        };
        (client, server)
    }
}

/// Client half: assigns call ids, keeps the pending-call table and routes
/// responses back to waiting callers.
#[derive(Clone)]
pub struct MemClientTransport {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Channel carrying request envelopes to the server half.
    requests: mpsc::Sender<Envelope>,
    /// Channel carrying response envelopes back; drained only by `run`.
    responses: tokio::sync::Mutex<mpsc::Receiver<Envelope>>,
    /// Pending response waiters: call id -> oneshot sender.
    /// Inserted on send, removed on receive, removed on cancel.
    pending: Mutex<HashMap<CallId, oneshot::Sender<Envelope>>>,
    /// Next correlation id for outgoing requests.
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemClientTransport {
    fn next_id(&self) -> CallId {
        CallId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Refuse further calls. In-flight calls resolve normally.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Call ids of in-flight calls, sorted (diagnostics).
    pub fn pending_call_ids(&self) -> Vec<CallId> {
        let pending = self.inner.pending.lock();
        let mut ids: Vec<CallId> = pending.keys().copied().collect();
        ids.sort_unstable_by_key(|id| id.raw());
        ids
    }

    /// Register a waiter for the response on `id`.
    fn register_pending(&self, id: CallId) -> Result<oneshot::Receiver<Envelope>, RpcError> {
        let mut pending = self.inner.pending.lock();
        let pending_len = pending.len();
        let max = max_pending();
        if pending_len >= max {
            tracing::warn!(
                pending_len,
                max_pending = max,
                "too many pending calls; refusing new call"
            );
            return Err(RpcError::Transport(TransportError::ResourceExhausted {
                pending: pending_len,
                max,
            }));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        tracing::debug!(
            id = %id,
            pending_len = pending_len + 1,
            "registered pending waiter"
        );
        Ok(rx)
    }

    fn remove_pending(&self, id: CallId) -> bool {
        self.inner.pending.lock().remove(&id).is_some()
    }

    /// Run the response demux loop.
    ///
    /// Receives response envelopes and delivers each to the caller waiting
    /// on its call id. A response with no waiter (the call was cancelled or
    /// timed out) is dropped with a warning. Returns when the server half
    /// goes away.
    pub async fn run(self) -> Result<(), TransportError> {
        tracing::debug!("mem client: starting demux loop");
        loop {
            let response = {
                let mut rx = self.inner.responses.lock().await;
                rx.recv().await
            };
            let Some(response) = response else {
                tracing::debug!("mem client: transport closed");
                return Ok(());
            };

            let waiter = self.inner.pending.lock().remove(&response.id);
            match waiter {
                Some(tx) => {
                    tracing::debug!(
                        id = %response.id,
                        method = %response.method,
                        is_error = response.is_error(),
                        "demux: delivered response to waiter"
                    );
                    let _ = tx.send(response);
                }
                None => {
                    tracing::warn!(
                        id = %response.id,
                        method = %response.method,
                        "demux: no waiter for response"
                    );
                }
            }
        }
    }
}

impl ClientTransport for MemClientTransport {
    fn request(
        &self,
        ctx: &Context,
        envelope: Envelope,
    ) -> impl Future<Output = Result<Envelope, RpcError>> + Send {
        async move {
            if self.is_closed() {
                return Err(RpcError::Transport(TransportError::Closed));
            }

            let mut envelope = envelope;
            let id = self.next_id();
            envelope.id = id;
            let method = envelope.method.clone();

            struct PendingGuard<'a> {
                transport: &'a MemClientTransport,
                id: CallId,
                active: bool,
            }

            impl PendingGuard<'_> {
                fn disarm(&mut self) {
                    self.active = false;
                }
            }

            impl Drop for PendingGuard<'_> {
                fn drop(&mut self) {
                    if !self.active {
                        return;
                    }
                    if self.transport.remove_pending(self.id) {
                        tracing::debug!(
                            id = %self.id,
                            "call cancelled/dropped: removed pending waiter"
                        );
                    }
                }
            }

            // Register the waiter before sending so a fast response cannot
            // race the registration.
            let rx = self.register_pending(id)?;
            let mut guard = PendingGuard {
                transport: self,
                id,
                active: true,
            };

            if self.inner.requests.send(envelope).await.is_err() {
                return Err(RpcError::Transport(TransportError::Closed));
            }
            tracing::debug!(id = %id, method = %method, "request sent");

            let received = tokio::select! {
                received = rx => match received {
                    Ok(envelope) => envelope,
                    Err(_) => {
                        tracing::warn!(id = %id, method = %method, "response channel closed");
                        return Err(RpcError::Transport(TransportError::Closed));
                    }
                },
                reason = ctx.done() => return Err(reason),
            };

            guard.disarm();
            Ok(received)
        }
    }
}

/// Server half: delivers request envelopes to the handler until the context
/// ends.
#[derive(Clone)]
pub struct MemServerTransport {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    /// Channel carrying inbound request envelopes; drained only by `serve`.
    requests: tokio::sync::Mutex<mpsc::Receiver<Envelope>>,
    /// Channel carrying response envelopes back to the client half.
    responses: mpsc::Sender<Envelope>,
    closed: AtomicBool,
}

impl MemServerTransport {
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl ServerTransport for MemServerTransport {
    fn serve<H>(
        &self,
        ctx: Context,
        handler: H,
    ) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        H: EnvelopeHandler,
    {
        async move {
            let handler = Arc::new(handler);
            tracing::debug!("mem server: starting serve loop");
            loop {
                if self.is_closed() {
                    tracing::debug!("mem server: closed");
                    return Ok(());
                }

                let request = {
                    let mut rx = self.inner.requests.lock().await;
                    tokio::select! {
                        request = rx.recv() => request,
                        reason = ctx.done() => {
                            tracing::debug!(%reason, "mem server: context ended");
                            return Ok(());
                        }
                    }
                };
                let Some(request) = request else {
                    tracing::debug!("mem server: transport closed");
                    return Ok(());
                };

                tracing::debug!(
                    id = %request.id,
                    method = %request.method,
                    body_len = request.body.len(),
                    "mem server: received request"
                );

                // Handle each envelope on its own task so one slow handler
                // never blocks delivery of the next.
                let handler = handler.clone();
                let responses = self.inner.responses.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let id = request.id;
                    let method = request.method.clone();
                    let reply_seed = request.clone();

                    // A panicking handler must still produce a response, or
                    // the caller hangs until its deadline.
                    let result =
                        AssertUnwindSafe(handler.handle(ctx, request)).catch_unwind().await;
                    let response = match result {
                        Ok(response) => response,
                        Err(panic) => {
                            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                                format!("panic in handler: {s}")
                            } else if let Some(s) = panic.downcast_ref::<String>() {
                                format!("panic in handler: {s}")
                            } else {
                                "panic in handler".to_string()
                            };
                            tracing::error!(id = %id, method = %method, message = %message, "handler panicked");
                            reply_seed.reply_error(RemoteError::new(ErrorCode::Internal, message))
                        }
                    };

                    if responses.send(response).await.is_err() {
                        tracing::warn!(
                            id = %id,
                            method = %method,
                            "failed to send response: transport closed"
                        );
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::Metadata;

    use super::*;

    fn empty_request(method: &str) -> Envelope {
        Envelope::request(method, bytes::Bytes::new(), Metadata::new())
    }

    #[tokio::test]
    async fn closed_transport_refuses_requests() {
        let (client, _server) = MemTransport::pair();
        client.close();
        let err = client
            .request(&Context::background(), empty_request("Echo"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Transport(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn cancellation_removes_the_pending_waiter() {
        let (client, _server) = MemTransport::pair();
        tokio::spawn(client.clone().run());

        let (ctx, handle) = Context::background().with_cancel();
        let caller = {
            let client = client.clone();
            tokio::spawn(async move { client.request(&ctx, empty_request("Sleep")).await })
        };

        // Give the request time to register, then cancel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.pending_call_ids().len(), 1);
        handle.cancel();

        let result = caller.await.unwrap();
        assert!(matches!(result, Err(RpcError::Cancelled)));
        assert!(client.pending_call_ids().is_empty());
    }

    #[tokio::test]
    async fn deadline_expiry_is_its_own_error() {
        let (client, _server) = MemTransport::pair();
        tokio::spawn(client.clone().run());

        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = client
            .request(&ctx, empty_request("Sleep"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::DeadlineExceeded));
        assert!(client.pending_call_ids().is_empty());
    }
}
