//! courier-testkit: Conformance test suite for courier transports.
//!
//! Provides the [`TransportFactory`] trait and shared scenarios every
//! transport pairing must pass, plus the generated-style [`echo`] service
//! the scenarios are written against.
//!
//! # Usage
//!
//! Each transport crate implements `TransportFactory` and runs the shared
//! scenarios:
//!
//! ```ignore
//! use courier_testkit::{TransportFactory, TestError};
//!
//! struct MyFactory;
//!
//! impl TransportFactory for MyFactory {
//!     type Client = MyClientTransport;
//!     type Server = MyServerTransport;
//!
//!     fn connect_pair() -> impl Future<Output = Result<(Self::Client, Self::Server), TestError>> + Send {
//!         async { /* create a live, connected pair */ }
//!     }
//! }
//!
//! #[tokio::test]
//! async fn my_transport_echo_happy_path() {
//!     courier_testkit::run_echo_happy_path::<MyFactory>().await;
//! }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;

use courier::{
    CancelHandle, Client, ClientTransport, Context, Dispatcher, Envelope, ErrorCode, Metadata,
    RemoteError, RpcError, ServerTransport, TransportError,
};

pub mod echo;
pub use echo::{echo_dispatcher, EchoClient, EchoImpl, EchoRequest, EchoResponse, EchoService};

/// Error type for test scenarios.
#[derive(Debug)]
pub enum TestError {
    /// Transport creation or wiring failed.
    Setup(String),
    /// RPC call failed.
    Rpc(RpcError),
    /// Assertion failed.
    Assertion(String),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Setup(msg) => write!(f, "setup error: {msg}"),
            TestError::Rpc(e) => write!(f, "RPC error: {e}"),
            TestError::Assertion(msg) => write!(f, "assertion failed: {msg}"),
        }
    }
}

impl std::error::Error for TestError {}

impl From<RpcError> for TestError {
    fn from(e: RpcError) -> Self {
        TestError::Rpc(e)
    }
}

/// Factory trait for creating connected transport pairs for testing.
///
/// `connect_pair` must return a *live* pairing: any pump or demux tasks the
/// transports need (e.g. the mem client's `run` loop) are already spawned.
pub trait TransportFactory: Send + Sync + 'static {
    type Client: ClientTransport + Clone;
    type Server: ServerTransport;

    /// Create a connected (client, server) pair.
    fn connect_pair()
        -> impl Future<Output = Result<(Self::Client, Self::Server), TestError>> + Send;
}

/// A running server plus the client transport talking to it.
struct Harness<F: TransportFactory> {
    client: F::Client,
    stop: CancelHandle,
    server_task: tokio::task::JoinHandle<Result<(), TransportError>>,
}

async fn start<F: TransportFactory>(dispatcher: Dispatcher) -> Result<Harness<F>, TestError> {
    let (client, server) = F::connect_pair().await?;
    let (serve_ctx, stop) = Context::background().with_cancel();
    let server_task = tokio::spawn(async move { server.serve(serve_ctx, dispatcher).await });
    Ok(Harness {
        client,
        stop,
        server_task,
    })
}

impl<F: TransportFactory> Harness<F> {
    async fn shutdown(self) -> Result<(), TestError> {
        self.stop.cancel();
        match self.server_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TestError::Setup(format!("server error: {e}"))),
            Err(e) => Err(TestError::Setup(format!("server task panicked: {e}"))),
        }
    }
}

// ============================================================================
// Helper services used by the scenarios
// ============================================================================

/// Sleeps far longer than any scenario is willing to wait.
fn sleepy_dispatcher() -> Dispatcher {
    Dispatcher::builder()
        .register("Sleep", |_ctx: Context, _req: ()| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .build()
}

fn boom() -> Result<EchoResponse, RemoteError> {
    panic!("boom in handler")
}

// ============================================================================
// Test scenarios
// ============================================================================

/// The Echo round trip: the response is the request, byte for byte.
pub async fn run_echo_happy_path<F: TransportFactory>() {
    if let Err(e) = run_echo_happy_path_inner::<F>().await {
        panic!("run_echo_happy_path failed: {e}");
    }
}

async fn run_echo_happy_path_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(echo_dispatcher(EchoImpl)).await?;

    let client = EchoClient::new(harness.client.clone());
    let response = client
        .echo(
            &Context::background(),
            EchoRequest { text: "hi".into() },
        )
        .await?;
    if response.text != "hi" {
        return Err(TestError::Assertion(format!(
            "expected echo of \"hi\", got {:?}",
            response.text
        )));
    }

    harness.shutdown().await
}

/// A method nobody registered fails with "unsupported method" and nothing
/// else.
pub async fn run_unsupported_method<F: TransportFactory>() {
    if let Err(e) = run_unsupported_method_inner::<F>().await {
        panic!("run_unsupported_method failed: {e}");
    }
}

async fn run_unsupported_method_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(echo_dispatcher(EchoImpl)).await?;

    let client = Client::new(harness.client.clone());
    let result: Result<EchoResponse, _> = client
        .call(
            &Context::background(),
            "Missing",
            &EchoRequest { text: "hi".into() },
        )
        .await;

    match result {
        Err(RpcError::Remote(e)) => {
            if e.code != ErrorCode::Unimplemented || e.message != "unsupported method" {
                return Err(TestError::Assertion(format!(
                    "expected unimplemented/unsupported method, got {e}"
                )));
            }
        }
        Ok(_) => return Err(TestError::Assertion("expected error, got success".into())),
        Err(e) => {
            return Err(TestError::Assertion(format!(
                "expected remote error, got {e:?}"
            )))
        }
    }

    harness.shutdown().await
}

/// A malformed body for a known method surfaces as a decode error on the
/// caller, never as a zero-value success, and the server keeps serving.
pub async fn run_malformed_body<F: TransportFactory>() {
    if let Err(e) = run_malformed_body_inner::<F>().await {
        panic!("run_malformed_body failed: {e}");
    }
}

async fn run_malformed_body_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(echo_dispatcher(EchoImpl)).await?;
    let ctx = Context::background();

    // 0xFF opens a varint that never terminates; no EchoRequest decodes from it.
    let request = Envelope::request("Echo", Bytes::from_static(&[0xFF]), Metadata::new());
    let response = harness.client.request(&ctx, request).await?;
    match &response.error {
        Some(e) if e.code == ErrorCode::InvalidArgument => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected invalid-argument response error, got {other:?}"
            )))
        }
    }
    if !response.body.is_empty() {
        return Err(TestError::Assertion(
            "error response must not carry a body".into(),
        ));
    }

    // The failure was scoped to that one envelope.
    let client = EchoClient::new(harness.client.clone());
    let echoed = client
        .echo(&ctx, EchoRequest { text: "still up".into() })
        .await?;
    if echoed.text != "still up" {
        return Err(TestError::Assertion("echo after decode failure broke".into()));
    }

    harness.shutdown().await
}

/// An error returned by a handler reaches the caller code-and-message
/// identical.
pub async fn run_handler_error_passthrough<F: TransportFactory>() {
    if let Err(e) = run_handler_error_passthrough_inner::<F>().await {
        panic!("run_handler_error_passthrough failed: {e}");
    }
}

async fn run_handler_error_passthrough_inner<F: TransportFactory>() -> Result<(), TestError> {
    let dispatcher = Dispatcher::builder()
        .register("Fail", |_ctx: Context, _req: EchoRequest| async move {
            Err::<EchoResponse, _>(RemoteError::new(
                ErrorCode::FailedPrecondition,
                "flux capacitor offline",
            ))
        })
        .build();
    let harness = start::<F>(dispatcher).await?;

    let client = Client::new(harness.client.clone());
    let result: Result<EchoResponse, _> = client
        .call(
            &Context::background(),
            "Fail",
            &EchoRequest { text: "hi".into() },
        )
        .await;

    match result {
        Err(RpcError::Remote(e)) => {
            if e.code != ErrorCode::FailedPrecondition || e.message != "flux capacitor offline" {
                return Err(TestError::Assertion(format!(
                    "handler error was altered in flight: {e}"
                )));
            }
        }
        other => {
            return Err(TestError::Assertion(format!(
                "expected remote error, got {other:?}"
            )))
        }
    }

    harness.shutdown().await
}

/// Metadata bound to the caller's context is visible to the handler through
/// its own context, order and duplicates included.
pub async fn run_metadata_passthrough<F: TransportFactory>() {
    if let Err(e) = run_metadata_passthrough_inner::<F>().await {
        panic!("run_metadata_passthrough failed: {e}");
    }
}

async fn run_metadata_passthrough_inner<F: TransportFactory>() -> Result<(), TestError> {
    let dispatcher = Dispatcher::builder()
        .register("Whoami", |ctx: Context, _req: ()| async move {
            let caller = ctx.metadata().get("caller").unwrap_or("unknown").to_string();
            let tags: Vec<String> = ctx
                .metadata()
                .get_all("tag")
                .map(str::to_string)
                .collect();
            Ok(EchoResponse {
                text: format!("{caller}:{}", tags.join(",")),
            })
        })
        .build();
    let harness = start::<F>(dispatcher).await?;

    let metadata = Metadata::new()
        .with("caller", "testkit")
        .with("tag", "a")
        .with("tag", "b");
    let ctx = Context::background().with_metadata(metadata);

    let client = Client::new(harness.client.clone());
    let response: EchoResponse = client.call(&ctx, "Whoami", &()).await?;
    if response.text != "testkit:a,b" {
        return Err(TestError::Assertion(format!(
            "metadata did not pass through verbatim: {:?}",
            response.text
        )));
    }

    harness.shutdown().await
}

/// Concurrent calls on one client never cross-deliver responses.
pub async fn run_concurrent_calls<F: TransportFactory>() {
    if let Err(e) = run_concurrent_calls_inner::<F>().await {
        panic!("run_concurrent_calls failed: {e}");
    }
}

async fn run_concurrent_calls_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(echo_dispatcher(EchoImpl)).await?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = EchoClient::new(harness.client.clone());
        tasks.push(tokio::spawn(async move {
            let text = format!("msg-{i}");
            let response = client
                .echo(&Context::background(), EchoRequest { text: text.clone() })
                .await?;
            if response.text != text {
                return Err(TestError::Assertion(format!(
                    "response for {text:?} was {:?}",
                    response.text
                )));
            }
            Ok::<_, TestError>(())
        }));
    }
    for task in tasks {
        task.await
            .map_err(|e| TestError::Setup(format!("caller task panicked: {e}")))??;
    }

    harness.shutdown().await
}

/// Cancelling the caller's context ends the call promptly with `Cancelled`,
/// whatever the server is still doing.
pub async fn run_cancellation<F: TransportFactory>() {
    if let Err(e) = run_cancellation_inner::<F>().await {
        panic!("run_cancellation failed: {e}");
    }
}

async fn run_cancellation_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(sleepy_dispatcher()).await?;

    let (ctx, handle) = Context::background().with_cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let client = Client::new(harness.client.clone());
    let started = Instant::now();
    let result: Result<(), _> = client.call(&ctx, "Sleep", &()).await;
    let elapsed = started.elapsed();

    if !matches!(result, Err(RpcError::Cancelled)) {
        return Err(TestError::Assertion(format!(
            "expected cancellation, got {result:?}"
        )));
    }
    if elapsed > Duration::from_secs(5) {
        return Err(TestError::Assertion(format!(
            "cancellation took {elapsed:?}; not prompt"
        )));
    }

    harness.shutdown().await
}

/// A context deadline bounds the call and reports as its own error kind.
pub async fn run_deadline<F: TransportFactory>() {
    if let Err(e) = run_deadline_inner::<F>().await {
        panic!("run_deadline failed: {e}");
    }
}

async fn run_deadline_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(sleepy_dispatcher()).await?;

    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let client = Client::new(harness.client.clone());
    let result: Result<(), _> = client.call(&ctx, "Sleep", &()).await;

    if !matches!(result, Err(RpcError::DeadlineExceeded)) {
        return Err(TestError::Assertion(format!(
            "expected deadline expiry, got {result:?}"
        )));
    }

    harness.shutdown().await
}

/// `serve` returns once its context is cancelled.
pub async fn run_serve_stops_on_context_cancel<F: TransportFactory>() {
    if let Err(e) = run_serve_stops_on_context_cancel_inner::<F>().await {
        panic!("run_serve_stops_on_context_cancel failed: {e}");
    }
}

async fn run_serve_stops_on_context_cancel_inner<F: TransportFactory>() -> Result<(), TestError> {
    let harness = start::<F>(echo_dispatcher(EchoImpl)).await?;
    // shutdown() cancels the serve context and joins the serve loop; a hung
    // loop shows up as this test hanging.
    harness.shutdown().await
}

/// A panicking handler becomes an internal error response; the server keeps
/// serving afterwards.
pub async fn run_handler_panic_recovery<F: TransportFactory>() {
    if let Err(e) = run_handler_panic_recovery_inner::<F>().await {
        panic!("run_handler_panic_recovery failed: {e}");
    }
}

async fn run_handler_panic_recovery_inner<F: TransportFactory>() -> Result<(), TestError> {
    let service = std::sync::Arc::new(EchoImpl);
    let dispatcher = Dispatcher::builder()
        .register("Boom", |_ctx: Context, _req: EchoRequest| async move { boom() })
        .register("Echo", move |ctx: Context, req: EchoRequest| {
            let service = service.clone();
            async move { service.echo(&ctx, req).await }
        })
        .build();
    let harness = start::<F>(dispatcher).await?;
    let ctx = Context::background();

    let client = Client::new(harness.client.clone());
    let result: Result<EchoResponse, _> = client
        .call(&ctx, "Boom", &EchoRequest { text: "hi".into() })
        .await;
    match result {
        Err(RpcError::Remote(e)) if e.code == ErrorCode::Internal => {
            if !e.message.contains("panic") {
                return Err(TestError::Assertion(format!(
                    "expected a panic message, got {:?}",
                    e.message
                )));
            }
        }
        other => {
            return Err(TestError::Assertion(format!(
                "expected internal error, got {other:?}"
            )))
        }
    }

    let echo_client = EchoClient::new(harness.client.clone());
    let echoed = echo_client
        .echo(&ctx, EchoRequest { text: "survived".into() })
        .await?;
    if echoed.text != "survived" {
        return Err(TestError::Assertion("echo after panic broke".into()));
    }

    harness.shutdown().await
}
