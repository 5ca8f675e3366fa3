//! Typed client over a [`ClientTransport`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use courier_core::{codec, ClientTransport, Context, Envelope, RpcError};

/// The invoker: presents typed calls over an untyped envelope transport.
///
/// Generated service clients wrap this. Each call is exactly one
/// request/response round trip; there are no internal retries. Retry and
/// backoff policy, if any, belongs to the caller.
#[derive(Clone)]
pub struct Client<T> {
    transport: T,
}

impl<T: ClientTransport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Invoke `method` with `request` and decode the typed response.
    ///
    /// Metadata currently bound to `ctx` travels in the request envelope, so
    /// anything an upstream layer bound (tracing ids, auth) flows through
    /// without appearing in the call signature. An encode failure returns
    /// before anything is sent.
    ///
    /// A response whose error slot is set becomes [`RpcError::Remote`] and
    /// its body is discarded; transport failures, cancellation and deadline
    /// expiry pass through from the transport unchanged.
    pub async fn call<Req, Resp>(
        &self,
        ctx: &Context,
        method: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = codec::to_bytes(request)?;
        let envelope = Envelope::request(method, body, ctx.metadata().clone());

        tracing::debug!(method, body_len = envelope.body.len(), "call: sending request");
        let response = self.transport.request(ctx, envelope).await?;

        if let Some(error) = response.error {
            tracing::debug!(method, id = %response.id, %error, "call: remote error");
            return Err(RpcError::Remote(error));
        }

        codec::from_bytes(&response.body)
    }
}
