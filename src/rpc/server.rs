//! JSON-RPC server over line-delimited streams.
//!
//! Implements the JSON-RPC 2.0 protocol for daemon communication. Each
//! request runs on its own task, so a long generation never holds up
//! `status` or `ping`. Responses go through a single writer task and may
//! arrive out of request order; clients match them by id.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinSet};

use crate::config::DaemonConfig;
use crate::coordinator::GenerationCoordinator;

use super::methods::handle_request;
use super::types::{
    JsonRpcError, JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse, RequestId,
    JSONRPC_VERSION,
};

/// State shared across all request handlers.
#[derive(Debug)]
pub struct ServerState {
    /// Coordinator in front of the generation backend.
    pub coordinator: Arc<GenerationCoordinator>,
    /// Daemon configuration.
    pub config: DaemonConfig,
    /// Flag to signal server shutdown.
    shutdown: AtomicBool,
}

impl ServerState {
    /// Creates new server state.
    pub fn new(coordinator: Arc<GenerationCoordinator>, config: DaemonConfig) -> Self {
        Self {
            coordinator,
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals the server to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Returns true if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Runs the JSON-RPC server on stdin and stdout.
pub async fn run_server(state: Arc<ServerState>) -> io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(state, stdin, tokio::io::stdout()).await?;
    Ok(())
}

/// Serves requests read from `reader` until end of input or `shutdown`.
///
/// At end of input, requests still in flight are answered before this
/// returns. After `shutdown` they are aborted. Returns the writer once
/// every response has been written.
pub async fn serve<R, W>(state: Arc<ServerState>, reader: R, writer: W) -> io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses, outbox) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(outbox, writer));
    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();

    tracing::info!("JSON-RPC server started, waiting for requests");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
                continue;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Error reading requests");
                break;
            }
        };

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(response) => {
                send(&responses, response);
                continue;
            }
        };

        if request.method == "shutdown" {
            let result = handle_request(&request.method, request.params, &state).await;
            send(&responses, response_line(request.id, result));
            break;
        }

        let state = Arc::clone(&state);
        let responses = responses.clone();
        in_flight.spawn(async move {
            let result = handle_request(&request.method, request.params, &state).await;
            send(&responses, response_line(request.id, result));
        });
    }

    if state.is_shutdown() {
        tracing::info!(pending = in_flight.len(), "Server shutdown requested");
        in_flight.abort_all();
    }
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }

    drop(responses);
    let writer = writer_task.await.map_err(io::Error::other)??;
    tracing::info!("JSON-RPC server stopped");
    Ok(writer)
}

/// Parses one request line, or produces the error response for it.
fn parse_request(line: &str) -> Result<JsonRpcRequest, String> {
    let request: JsonRpcRequest = serde_json::from_str(line).map_err(|e| {
        error_line(
            None,
            JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
        )
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(error_line(
            Some(request.id),
            JsonRpcError::invalid_request("Invalid JSON-RPC version (expected 2.0)"),
        ));
    }

    Ok(request)
}

fn response_line(
    id: RequestId,
    result: Result<serde_json::Value, JsonRpcError>,
) -> String {
    match result {
        Ok(value) => serde_json::to_string(&JsonRpcResponse::new(id, value)).unwrap_or_default(),
        Err(error) => error_line(Some(id), error),
    }
}

fn error_line(id: Option<RequestId>, error: JsonRpcError) -> String {
    serde_json::to_string(&JsonRpcErrorResponse::new(id, error)).unwrap_or_default()
}

fn send(responses: &UnboundedSender<String>, line: String) {
    if responses.send(line).is_err() {
        tracing::warn!("Response writer is gone, dropping response");
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Request handler panicked");
        }
    }
}

async fn write_responses<W>(mut outbox: UnboundedReceiver<String>, mut writer: W) -> io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(writer)
}
