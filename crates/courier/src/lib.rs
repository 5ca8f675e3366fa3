//! courier: request/response RPC over asynchronous message transports.
//!
//! A message broker only moves opaque bytes between queues; courier layers
//! call/return semantics on top. A caller invokes a named, strongly-typed
//! remote method and gets a typed result or error back; courier supplies the
//! glue: envelope construction, method dispatch, response correlation,
//! metadata propagation and error passthrough.
//!
//! # Quick start
//!
//! Register typed handlers and build the server-side dispatcher:
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! let dispatcher = Dispatcher::builder()
//!     .register("Echo", |_ctx: Context, req: EchoRequest| async move {
//!         Ok(EchoResponse { text: req.text })
//!     })
//!     .build();
//!
//! // Serve over any ServerTransport until the context ends.
//! let (serve_ctx, stop) = Context::background().with_cancel();
//! tokio::spawn(async move { server.serve(serve_ctx, dispatcher).await });
//! ```
//!
//! Make typed calls through a [`Client`] over any [`ClientTransport`]:
//!
//! ```ignore
//! let client = Client::new(transport);
//! let ctx = Context::background()
//!     .with_metadata(Metadata::new().with("trace-id", "abc123"))
//!     .with_timeout(Duration::from_secs(5));
//! let reply: EchoResponse = client.call(&ctx, "Echo", &EchoRequest { text: "hi".into() }).await?;
//! ```
//!
//! # Errors
//!
//! Callers can always tell the failure classes apart:
//!
//! ```ignore
//! match client.call::<_, EchoResponse>(&ctx, "Echo", &req).await {
//!     Ok(reply) => println!("{}", reply.text),
//!     Err(RpcError::Remote(e)) => eprintln!("remote side failed: {e}"),
//!     Err(RpcError::Transport(e)) => eprintln!("delivery failed, outcome unknown: {e}"),
//!     Err(e) => eprintln!("call ended early: {e}"),
//! }
//! ```
//!
//! # Transports
//!
//! Broker integrations implement [`ServerTransport`] and [`ClientTransport`];
//! `courier-transport-mem` ships the in-process reference pair used by tests
//! and demos.

#![forbid(unsafe_code)]

mod client;

pub use client::Client;

// Re-export core types
pub use courier_core::{
    codec, CallId, CancelHandle, ClientTransport, Context, Dispatcher, DispatcherBuilder,
    Envelope, EnvelopeHandler, ErrorCode, Metadata, RemoteError, RpcError, ServerTransport,
    TransportError,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Client, ClientTransport, Context, Dispatcher, ErrorCode, Metadata, RemoteError, RpcError,
        ServerTransport,
    };
}
