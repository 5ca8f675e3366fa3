//! Server-side dispatch: method name to registered handler.
//!
//! The dispatcher turns one inbound request envelope into exactly one
//! response envelope. Routing, request decode, handler and response encode
//! failures all become error responses; nothing a single envelope does can
//! take the serve loop down.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::{codec, Context, Envelope, EnvelopeHandler, ErrorCode, RemoteError};

/// Type alias for a boxed async handler over raw body bytes.
type BoxedHandler = Box<
    dyn Fn(Context, Bytes) -> Pin<Box<dyn Future<Output = Result<Bytes, RemoteError>> + Send>>
        + Send
        + Sync,
>;

/// Builder for a [`Dispatcher`]'s method table.
///
/// Handlers are registered once at startup; [`build`](Self::build) freezes
/// the table. There is no way to mutate a built dispatcher, which is what
/// makes unsynchronized concurrent dispatch safe.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the typed handler for `method`.
    ///
    /// The registered wrapper decodes the request body, invokes `handler`
    /// with a context exposing the caller's metadata, and encodes the typed
    /// response. A body that fails to decode never reaches the handler; an
    /// error the handler returns is forwarded verbatim, never wrapped.
    ///
    /// # Panics
    ///
    /// Panics if `method` is already registered.
    pub fn register<Req, Resp, F, Fut>(mut self, method: &'static str, handler: F) -> Self
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Resp: serde::Serialize + Send + 'static,
        F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RemoteError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Box::new(move |ctx, body| {
            let handler = handler.clone();
            Box::pin(async move {
                let request: Req = match codec::from_bytes(&body) {
                    Ok(request) => request,
                    Err(e) => {
                        return Err(RemoteError::new(ErrorCode::InvalidArgument, e.to_string()))
                    }
                };
                let response = handler(ctx, request).await?;
                match codec::to_bytes(&response) {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => Err(RemoteError::new(ErrorCode::Internal, e.to_string())),
                }
            })
        });
        let prev = self.handlers.insert(method, boxed);
        assert!(prev.is_none(), "handler already registered for {method}");
        self
    }

    /// Freeze the method table.
    pub fn build(self) -> Dispatcher {
        tracing::debug!(methods = self.handlers.len(), "dispatcher built");
        Dispatcher {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// Routes request envelopes to registered handlers.
///
/// Method lookup is an exact, case-sensitive match against the frozen table.
/// The dispatcher holds no mutable state; clones share the table.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HashMap<&'static str, BoxedHandler>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Registered method names, sorted (diagnostics).
    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Turn one request envelope into its response envelope.
    ///
    /// The handler observes the request's metadata through its context; the
    /// response carries the request's id, method and metadata back
    /// unchanged.
    pub async fn handle(&self, ctx: &Context, request: Envelope) -> Envelope {
        let Some(handler) = self.handlers.get(request.method.as_str()) else {
            tracing::debug!(
                id = %request.id,
                method = %request.method,
                "no handler for method"
            );
            return request.reply_error(RemoteError::unsupported_method());
        };

        tracing::debug!(
            id = %request.id,
            method = %request.method,
            body_len = request.body.len(),
            "dispatching request"
        );

        let derived = ctx.with_metadata(request.metadata.clone());
        match handler(derived, request.body.clone()).await {
            Ok(body) => request.reply(body),
            Err(error) => {
                tracing::debug!(
                    id = %request.id,
                    method = %request.method,
                    %error,
                    "handler returned error"
                );
                request.reply_error(error)
            }
        }
    }
}

impl EnvelopeHandler for Dispatcher {
    fn handle(&self, ctx: Context, request: Envelope) -> impl Future<Output = Envelope> + Send {
        async move { Dispatcher::handle(self, &ctx, request).await }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{CallId, Metadata};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    fn echo_request(body: Bytes) -> Envelope {
        let mut envelope = Envelope::request(
            "Echo",
            body,
            Metadata::new().with("trace-id", "t-1"),
        );
        envelope.id = CallId::new(7);
        envelope
    }

    fn echo_dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .register("Echo", |_ctx: Context, req: Echo| async move { Ok(req) })
            .build()
    }

    #[tokio::test]
    async fn success_response_round_trips() {
        let dispatcher = echo_dispatcher();
        let request = echo_request(
            codec::to_bytes(&Echo {
                text: "hi".into(),
            })
            .unwrap(),
        );

        let response = dispatcher.handle(&Context::background(), request).await;
        assert_eq!(response.id, CallId::new(7));
        assert_eq!(response.method, "Echo");
        assert_eq!(response.metadata.get("trace-id"), Some("t-1"));
        assert!(response.error.is_none());
        let echoed: Echo = codec::from_bytes(&response.body).unwrap();
        assert_eq!(echoed.text, "hi");
    }

    #[tokio::test]
    async fn unknown_method_never_invokes_a_handler() {
        static INVOKED: AtomicBool = AtomicBool::new(false);
        let dispatcher = Dispatcher::builder()
            .register("Echo", |_ctx: Context, req: Echo| async move {
                INVOKED.store(true, Ordering::SeqCst);
                Ok(req)
            })
            .build();

        let mut request = Envelope::request("Missing", Bytes::new(), Metadata::new());
        request.id = CallId::new(3);
        let response = dispatcher.handle(&Context::background(), request).await;

        let error = response.error.expect("routing failure must set the error");
        assert_eq!(error.code, ErrorCode::Unimplemented);
        assert_eq!(error.message, "unsupported method");
        assert_eq!(response.id, CallId::new(3));
        assert!(response.body.is_empty());
        assert!(!INVOKED.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let dispatcher = echo_dispatcher();
        let request = Envelope::request("echo", Bytes::new(), Metadata::new());
        let response = dispatcher.handle(&Context::background(), request).await;
        assert_eq!(response.error.unwrap().code, ErrorCode::Unimplemented);
    }

    #[tokio::test]
    async fn undecodable_body_skips_the_handler() {
        static INVOKED: AtomicBool = AtomicBool::new(false);
        let dispatcher = Dispatcher::builder()
            .register("Echo", |_ctx: Context, req: Echo| async move {
                INVOKED.store(true, Ordering::SeqCst);
                Ok(req)
            })
            .build();

        let request = echo_request(Bytes::from_static(&[0xFF]));
        let response = dispatcher.handle(&Context::background(), request).await;

        let error = response.error.expect("decode failure must set the error");
        assert_eq!(error.code, ErrorCode::InvalidArgument);
        assert!(response.body.is_empty());
        assert!(!INVOKED.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_error_is_forwarded_verbatim() {
        let dispatcher = Dispatcher::builder()
            .register("Echo", |_ctx: Context, _req: Echo| async move {
                Err::<Echo, _>(RemoteError::new(
                    ErrorCode::FailedPrecondition,
                    "not ready",
                ))
            })
            .build();

        let request = echo_request(
            codec::to_bytes(&Echo {
                text: "hi".into(),
            })
            .unwrap(),
        );
        let response = dispatcher.handle(&Context::background(), request).await;

        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::FailedPrecondition);
        assert_eq!(error.message, "not ready");
    }

    #[tokio::test]
    async fn handler_sees_caller_metadata_through_its_context() {
        let dispatcher = Dispatcher::builder()
            .register("Echo", |ctx: Context, _req: Echo| async move {
                let trace = ctx.metadata().get("trace-id").unwrap_or("").to_string();
                Ok(Echo { text: trace })
            })
            .build();

        let request = echo_request(
            codec::to_bytes(&Echo {
                text: String::new(),
            })
            .unwrap(),
        );
        let response = dispatcher.handle(&Context::background(), request).await;
        let echoed: Echo = codec::from_bytes(&response.body).unwrap();
        assert_eq!(echoed.text, "t-1");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let _ = Dispatcher::builder()
            .register("Echo", |_ctx: Context, req: Echo| async move { Ok(req) })
            .register("Echo", |_ctx: Context, req: Echo| async move { Ok(req) });
    }
}
