//! End-to-end echo demo over the in-process transport.
//!
//! This wires up everything a broker-backed deployment would, minus the
//! broker: a dispatcher with typed handlers, a serve loop, and a typed
//! client making calls with metadata, an application error, and a deadline.
//!
//! Run with: `cargo run -p echo-demo` (set `RUST_LOG=debug` for the wire
//! chatter).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier::prelude::*;
use courier_transport_mem::MemTransport;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GreetRequest {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GreetResponse {
    greeting: String,
}

fn greeter_dispatcher() -> Dispatcher {
    Dispatcher::builder()
        .register("Greet", |ctx: Context, req: GreetRequest| async move {
            if req.name.is_empty() {
                return Err(RemoteError::new(
                    ErrorCode::InvalidArgument,
                    "name must not be empty",
                ));
            }
            let via = ctx.metadata().get("via").unwrap_or("nowhere");
            Ok(GreetResponse {
                greeting: format!("hello {}, via {}", req.name, via),
            })
        })
        .register("Slow", |_ctx: Context, _req: ()| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (client_transport, server_transport) = MemTransport::pair();

    // The client's demux loop routes responses back to waiting callers.
    tokio::spawn(client_transport.clone().run());

    // Serve until we cancel the context.
    let (serve_ctx, stop) = Context::background().with_cancel();
    let dispatcher = greeter_dispatcher();
    let server_task = tokio::spawn(async move {
        server_transport.serve(serve_ctx, dispatcher).await
    });

    let client = Client::new(client_transport.clone());

    // A typed call, with metadata flowing out of band.
    let ctx = Context::background()
        .with_metadata(Metadata::new().with("via", "mem-pair"));
    let reply: GreetResponse = client
        .call(&ctx, "Greet", &GreetRequest { name: "world".into() })
        .await?;
    println!("Greet -> {}", reply.greeting);

    // An application error comes back verbatim.
    let result: Result<GreetResponse, _> = client
        .call(&ctx, "Greet", &GreetRequest { name: String::new() })
        .await;
    match result {
        Err(RpcError::Remote(e)) => println!("Greet(\"\") -> remote error: {e}"),
        other => println!("Greet(\"\") -> unexpected: {other:?}"),
    }

    // A method the server never heard of.
    let result: Result<GreetResponse, _> = client
        .call(&ctx, "Shout", &GreetRequest { name: "world".into() })
        .await;
    match result {
        Err(RpcError::Remote(e)) => println!("Shout -> remote error: {e}"),
        other => println!("Shout -> unexpected: {other:?}"),
    }

    // A deadline bounds a slow call.
    let bounded = ctx.with_timeout(Duration::from_millis(200));
    let result: Result<(), _> = client.call(&bounded, "Slow", &()).await;
    match result {
        Err(RpcError::DeadlineExceeded) => println!("Slow -> deadline exceeded, as intended"),
        other => println!("Slow -> unexpected: {other:?}"),
    }

    // Graceful shutdown.
    stop.cancel();
    server_task.await??;

    Ok(())
}
