//! JSON-RPC module for daemon communication.
//!
//! Provides the JSON-RPC 2.0 server implementation for:
//! - `generate`: Produce one recording from a style description
//! - `status`: Queue depth and backend state
//! - `ping`: Health check
//! - `shutdown`: Stop serving and abort pending requests

pub mod methods;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use server::{run_server, serve, ServerState};
pub use types::{
    GenerateParams, GenerateResult, JsonRpcError, JsonRpcErrorResponse, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};
