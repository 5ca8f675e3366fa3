//! Runs the shared courier-testkit scenarios against the in-process pair.

use std::future::Future;

use courier_testkit::{TestError, TransportFactory};
use courier_transport_mem::{MemClientTransport, MemServerTransport, MemTransport};

struct MemFactory;

impl TransportFactory for MemFactory {
    type Client = MemClientTransport;
    type Server = MemServerTransport;

    fn connect_pair()
        -> impl Future<Output = Result<(Self::Client, Self::Server), TestError>> + Send {
        async {
            let (client, server) = MemTransport::pair();
            tokio::spawn(client.clone().run());
            Ok((client, server))
        }
    }
}

#[tokio::test]
async fn mem_echo_happy_path() {
    courier_testkit::run_echo_happy_path::<MemFactory>().await;
}

#[tokio::test]
async fn mem_unsupported_method() {
    courier_testkit::run_unsupported_method::<MemFactory>().await;
}

#[tokio::test]
async fn mem_malformed_body() {
    courier_testkit::run_malformed_body::<MemFactory>().await;
}

#[tokio::test]
async fn mem_handler_error_passthrough() {
    courier_testkit::run_handler_error_passthrough::<MemFactory>().await;
}

#[tokio::test]
async fn mem_metadata_passthrough() {
    courier_testkit::run_metadata_passthrough::<MemFactory>().await;
}

#[tokio::test]
async fn mem_concurrent_calls() {
    courier_testkit::run_concurrent_calls::<MemFactory>().await;
}

#[tokio::test]
async fn mem_cancellation() {
    courier_testkit::run_cancellation::<MemFactory>().await;
}

#[tokio::test]
async fn mem_deadline() {
    courier_testkit::run_deadline::<MemFactory>().await;
}

#[tokio::test]
async fn mem_serve_stops_on_context_cancel() {
    courier_testkit::run_serve_stops_on_context_cancel::<MemFactory>().await;
}

#[tokio::test]
async fn mem_handler_panic_recovery() {
    courier_testkit::run_handler_panic_recovery::<MemFactory>().await;
}
