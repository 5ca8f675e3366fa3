//! The Echo service, in the exact shape generated service code takes.
//!
//! An IDL compiler would emit this file from a service description; the
//! runtime behavior it leans on is what courier itself provides. It lives in
//! the testkit so tests and demos exercise the same surface application code
//! would.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use courier::{Client, ClientTransport, Context, Dispatcher, RemoteError, RpcError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub text: String,
}

/// Server-side trait for the Echo service.
pub trait EchoService: Send + Sync + 'static {
    /// Echo returns the same message it receives.
    fn echo(
        &self,
        ctx: &Context,
        request: EchoRequest,
    ) -> impl Future<Output = Result<EchoResponse, RemoteError>> + Send;
}

/// Build the dispatcher a generated server registers: one handler per
/// method, with typed decode/encode handled by the runtime.
pub fn echo_dispatcher<S: EchoService>(service: S) -> Dispatcher {
    let service = Arc::new(service);
    Dispatcher::builder()
        .register("Echo", move |ctx: Context, request: EchoRequest| {
            let service = service.clone();
            async move { service.echo(&ctx, request).await }
        })
        .build()
}

/// Client stub for the Echo service.
pub struct EchoClient<T> {
    client: Client<T>,
}

impl<T: ClientTransport> EchoClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            client: Client::new(transport),
        }
    }

    /// Echo returns the same message it receives.
    pub async fn echo(
        &self,
        ctx: &Context,
        request: EchoRequest,
    ) -> Result<EchoResponse, RpcError> {
        self.client.call(ctx, "Echo", &request).await
    }
}

/// Reference implementation: returns its input unchanged.
pub struct EchoImpl;

impl EchoService for EchoImpl {
    async fn echo(
        &self,
        _ctx: &Context,
        request: EchoRequest,
    ) -> Result<EchoResponse, RemoteError> {
        Ok(EchoResponse { text: request.text })
    }
}
