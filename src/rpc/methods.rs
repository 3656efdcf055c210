//! JSON-RPC method handlers.

use std::time::Instant;

use crate::audio::finalize_artifact;
use crate::prompt::build_prompt;
use crate::types::GenerationJob;

use super::server::ServerState;
use super::types::{GenerateParams, GenerateResult, JsonRpcError};

/// Handles a JSON-RPC method call.
pub async fn handle_request(
    method: &str,
    params: serde_json::Value,
    state: &ServerState,
) -> Result<serde_json::Value, JsonRpcError> {
    match method {
        "generate" => handle_generate(params, state).await,
        "status" => handle_status(state),
        "ping" => handle_ping(),
        "shutdown" => handle_shutdown(state),
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

/// Handles the ping method for health checks.
fn handle_ping() -> Result<serde_json::Value, JsonRpcError> {
    Ok(serde_json::json!({ "status": "ok" }))
}

/// Handles the shutdown method.
fn handle_shutdown(state: &ServerState) -> Result<serde_json::Value, JsonRpcError> {
    state.shutdown();
    Ok(serde_json::json!({ "status": "shutting_down" }))
}

fn handle_status(state: &ServerState) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(state.coordinator.status())
        .map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Handles the generate method.
///
/// Waits for the whole job: admission, generation, then conversion and the
/// size check. The response names a file the caller now owns.
async fn handle_generate(
    params: serde_json::Value,
    state: &ServerState,
) -> Result<serde_json::Value, JsonRpcError> {
    // Omitted params mean an empty description.
    let params = if params.is_null() {
        serde_json::json!({})
    } else {
        params
    };
    let params: GenerateParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))?;
    params.validate()?;

    let prompt = build_prompt(&params.description, &state.config.prompt_context);
    let mut job = GenerationJob::new(prompt.clone());
    let start_time = Instant::now();

    let artifact = state.coordinator.run_job(&mut job).await?;
    let artifact = finalize_artifact(artifact, &state.config.output).await?;

    let result = GenerateResult::new(
        job.job_id,
        &artifact,
        prompt,
        start_time.elapsed().as_secs_f32(),
    );
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
