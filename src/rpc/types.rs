//! JSON-RPC types for the daemon protocol.

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, ErrorCode};
use crate::prompt::validate_description;
use crate::types::{Artifact, ArtifactFormat};

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Integer(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// A JSON-RPC request wrapper.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub id: RequestId,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A JSON-RPC response wrapper.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse<T: Serialize> {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub result: T,
}

impl<T: Serialize> JsonRpcResponse<T> {
    pub fn new(id: RequestId, result: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// A JSON-RPC error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonRpcErrorData>,
}

/// Extended error data for application-specific errors.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorData {
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub recovery_hint: &'static str,
}

impl JsonRpcError {
    /// Creates a parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an invalid request error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a method not found error (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Creates an invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    /// Creates an internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }
}

/// Application error code for a daemon error code.
pub fn rpc_code(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::SetupFailed => -32001,
        ErrorCode::InvalidConfig => -32002,
        ErrorCode::BackendFailed => -32003,
        ErrorCode::Busy => -32004,
        ErrorCode::InvalidPrompt => -32005,
        ErrorCode::GenerationTimeout => -32006,
        ErrorCode::ArtifactTooLarge => -32007,
        ErrorCode::ConversionFailed => -32008,
    }
}

impl From<&DaemonError> for JsonRpcError {
    fn from(err: &DaemonError) -> Self {
        Self {
            code: rpc_code(err.code),
            message: err.code.description().to_string(),
            data: Some(JsonRpcErrorData {
                error_code: err.code.as_str().to_string(),
                details: Some(err.message.clone()),
                recovery_hint: err.code.recovery_hint(),
            }),
        }
    }
}

impl From<DaemonError> for JsonRpcError {
    fn from(err: DaemonError) -> Self {
        Self::from(&err)
    }
}

// ============================================================================
// generate
// ============================================================================

/// Parameters for a generate request.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    /// Style description blended into the prompt context. May be empty.
    #[serde(default)]
    pub description: String,
}

impl GenerateParams {
    /// Validates the request parameters.
    pub fn validate(&self) -> Result<(), JsonRpcError> {
        validate_description(&self.description).map_err(JsonRpcError::from)
    }
}

/// Response for a generate request.
#[derive(Debug, Serialize)]
pub struct GenerateResult {
    /// Job identifier, as logged by the daemon.
    pub job_id: String,

    /// Absolute path of the delivered file. The caller owns it.
    pub path: String,

    pub format: ArtifactFormat,

    pub size_bytes: u64,

    /// Audio duration, when known.
    pub duration_sec: Option<f32>,

    /// Audio sample rate in Hz, when known.
    pub sample_rate: Option<u32>,

    /// Prompt handed to the backend.
    pub prompt: String,

    /// Wall-clock time from admission to delivery.
    pub generation_time_sec: f32,
}

impl GenerateResult {
    pub fn new(
        job_id: String,
        artifact: &Artifact,
        prompt: String,
        generation_time_sec: f32,
    ) -> Self {
        Self {
            job_id,
            path: artifact.path.to_string_lossy().to_string(),
            format: artifact.format,
            size_bytes: artifact.size_bytes,
            duration_sec: artifact.duration_sec,
            sample_rate: artifact.sample_rate,
            prompt,
            generation_time_sec,
        }
    }
}
