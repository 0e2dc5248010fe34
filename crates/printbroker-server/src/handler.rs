// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-connection request pipeline: read one framed message, authenticate,
// rate-limit, validate, dispatch to the matching handler, write one framed
// response. One connection carries exactly one request/response exchange,
// matching the original broker's request lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use printbroker_core::{
    AppConfig, Margins, Orientation, PageSize, PrintBrokerError, PrintJob, Quality,
};
use printbroker_protocol::{
    codec::{read_frame, write_frame},
    message::{error_response, success_response, Message},
};
use printbroker_queue::PriorityQueue;
use printbroker_security::auth::AuthManager;
use printbroker_security::rate_limiter::RateLimiter;
use printbroker_security::validation;
use printbroker_store::JobStore;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Shared state handed to every connection task.
pub struct AppState {
    pub store: Arc<JobStore>,
    pub queue: Arc<PriorityQueue>,
    pub auth: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<AppConfig>,
}

/// The wire shape of a `print_job` message's `data` payload, grounded on
/// the original's `PrintJob`/`PrintParameters`/`PrintJobMetadata` shapes.
/// `client_id` is accepted on the wire but must match the authenticated
/// principal; `metadata.priority` is optional, defaulting to 5, mirroring
/// a field the original reads off `metadata` despite its own schema never
/// declaring it.
#[derive(Debug, Deserialize)]
struct PrintJobRequest {
    client_id: String,
    #[serde(default)]
    user: Option<String>,
    file_format: String,
    file_content: String,
    #[serde(default)]
    parameters: PrintParametersRequest,
    #[serde(default)]
    metadata: PrintJobMetadataRequest,
}

#[derive(Debug, Deserialize)]
struct PrintParametersRequest {
    #[serde(default = "default_page_size")]
    page_size: String,
    #[serde(default = "default_orientation")]
    orientation: String,
    #[serde(default)]
    margins: Option<MarginsRequest>,
    #[serde(default = "default_copies")]
    copies: i64,
    #[serde(default)]
    color: bool,
    #[serde(default)]
    duplex: bool,
    #[serde(default = "default_quality")]
    quality: String,
}

impl Default for PrintParametersRequest {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            orientation: default_orientation(),
            margins: None,
            copies: default_copies(),
            color: false,
            duplex: false,
            quality: default_quality(),
        }
    }
}

fn default_page_size() -> String {
    "A4".to_string()
}
fn default_orientation() -> String {
    "portrait".to_string()
}
fn default_copies() -> i64 {
    1
}
fn default_quality() -> String {
    "normal".to_string()
}

#[derive(Debug, Deserialize)]
struct MarginsRequest {
    top: f64,
    bottom: f64,
    left: f64,
    right: f64,
}

#[derive(Debug, Deserialize, Default)]
struct PrintJobMetadataRequest {
    #[serde(default)]
    document_name: Option<String>,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    priority: Option<i64>,
}

/// Reads exactly one frame (bounded by `read_deadline_secs`), dispatches
/// it, and writes exactly one response frame. Any failure past the read
/// itself is turned into an `error_response` rather than dropping the
/// connection, so the client always gets a parseable reply.
#[instrument(skip(stream, state), fields(peer = peer_ip))]
pub async fn handle_connection<S>(mut stream: S, state: &Arc<AppState>, peer_ip: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = std::time::Duration::from_secs(state.config.server.read_deadline_secs);
    let max_bytes = state.config.server.max_message_bytes;

    let message = match timeout(deadline, read_frame(&mut stream, max_bytes)).await {
        Ok(Ok(message)) => message,
        Ok(Err(err)) => {
            warn!(peer = peer_ip, error = %err, "failed to read request frame");
            return;
        }
        Err(_) => {
            warn!(peer = peer_ip, "timed out waiting for request frame");
            return;
        }
    };

    let response = dispatch(&message, state, peer_ip).await;
    if let Err(err) = write_frame(&mut stream, &response).await {
        warn!(peer = peer_ip, error = %err, "failed to write response frame");
    }
}

/// Runs the auth → rate-limit → route pipeline for one already-decoded
/// message, always returning a response (never propagating an error to
/// the caller) so every request gets exactly one reply frame.
async fn dispatch(message: &Message, state: &Arc<AppState>, peer_ip: &str) -> Message {
    match dispatch_inner(message, state, peer_ip).await {
        Ok(response) => response,
        Err(err) => {
            info!(error = %err, code = err.code().as_str(), "request failed");
            error_response(err.code().client_message(), err.code().as_str())
        }
    }
}

async fn dispatch_inner(
    message: &Message,
    state: &Arc<AppState>,
    peer_ip: &str,
) -> Result<Message, PrintBrokerError> {
    let token = message.bearer_token().ok_or(PrintBrokerError::MissingToken)?;
    let claims = state.auth.validate(token)?;

    state.rate_limiter.check(&claims.client_id, 1)?;

    match message.message_type.as_str() {
        "print_job" => handle_print_job(message, state, &claims.client_id, peer_ip).await,
        "ping" => Ok(handle_ping(&claims.client_id, &claims.username)),
        "status" => handle_status(state).await,
        other => Err(PrintBrokerError::UnsupportedMessageType(other.to_string())),
    }
}

fn handle_ping(client_id: &str, username: &str) -> Message {
    let mut data = serde_json::Map::new();
    data.insert("status".into(), serde_json::Value::String("success".into()));
    data.insert(
        "server_time".into(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
    data.insert("client_id".into(), serde_json::Value::String(client_id.to_string()));
    data.insert("username".into(), serde_json::Value::String(username.to_string()));
    data.insert("message".into(), serde_json::Value::String("pong".into()));
    Message::new("response", serde_json::Value::Object(data))
}

async fn handle_status(state: &Arc<AppState>) -> Result<Message, PrintBrokerError> {
    let summary = state.store.summary()?;
    let queue_size = state.queue.size();

    let mut data = serde_json::Map::new();
    data.insert("status".into(), serde_json::Value::String("success".into()));
    data.insert(
        "total_jobs".into(),
        serde_json::Value::Number(summary.total_jobs.into()),
    );
    data.insert(
        "pending_jobs".into(),
        serde_json::Value::Number(summary.pending_jobs.into()),
    );
    data.insert(
        "printing_jobs".into(),
        serde_json::Value::Number(summary.printing_jobs.into()),
    );
    data.insert(
        "completed_jobs".into(),
        serde_json::Value::Number(summary.completed_jobs.into()),
    );
    data.insert(
        "failed_jobs".into(),
        serde_json::Value::Number(summary.failed_jobs.into()),
    );
    data.insert(
        "queue_size".into(),
        serde_json::Value::Number((queue_size as u64).into()),
    );
    data.insert(
        "total_clients".into(),
        serde_json::Value::Number(summary.total_clients.into()),
    );
    Ok(Message::new("response", serde_json::Value::Object(data)))
}

#[instrument(skip(message, state), fields(client_id = authenticated_client_id))]
async fn handle_print_job(
    message: &Message,
    state: &Arc<AppState>,
    authenticated_client_id: &str,
    peer_ip: &str,
) -> Result<Message, PrintBrokerError> {
    let request: PrintJobRequest = serde_json::from_value(message.data.clone())?;

    validation::validate_client_id(&request.client_id)?;
    if request.client_id != authenticated_client_id {
        return Err(PrintBrokerError::Validation {
            field: "client_id".into(),
            reason: "does not match authenticated principal".into(),
        });
    }

    let user_name = request.user.unwrap_or_else(|| authenticated_client_id.to_string());
    validation::validate_username(&user_name)?;

    let ext = request.file_format.trim_start_matches('.').to_ascii_lowercase();
    validation::validate_file_extension(&ext)?;

    let file_bytes = BASE64
        .decode(request.file_content.as_bytes())
        .map_err(|e| PrintBrokerError::Validation {
            field: "file_content".into(),
            reason: format!("invalid base64: {e}"),
        })?;
    validation::validate_file_size(
        file_bytes.len() as u64,
        state.config.security.max_file_size_bytes(),
    )?;

    let raw_document_name = request
        .metadata
        .document_name
        .clone()
        .unwrap_or_else(|| format!("document.{ext}"));
    let document_name = validation::sanitize_document_name(&raw_document_name)?;

    let page_size = PageSize::parse(&request.parameters.page_size).ok_or_else(|| {
        PrintBrokerError::Validation {
            field: "page_size".into(),
            reason: "unknown page size".into(),
        }
    })?;
    let orientation = Orientation::parse(&request.parameters.orientation).ok_or_else(|| {
        PrintBrokerError::Validation {
            field: "orientation".into(),
            reason: "unknown orientation".into(),
        }
    })?;
    let quality = Quality::parse(&request.parameters.quality).ok_or_else(|| {
        PrintBrokerError::Validation {
            field: "quality".into(),
            reason: "unknown quality".into(),
        }
    })?;
    let copies = validation::validate_copies(request.parameters.copies)?;
    let margins = request
        .parameters
        .margins
        .map(|m| Margins {
            top: m.top,
            bottom: m.bottom,
            left: m.left,
            right: m.right,
        })
        .unwrap_or_default();

    // The original's `PrintJobMetadata` has no `priority` field at all;
    // the broker reads it off the metadata dict anyway and falls back to
    // 5 when absent. Mirrored here rather than cleaned up.
    let priority_raw = request.metadata.priority.unwrap_or(5);
    let priority = validation::validate_priority(priority_raw)?;
    let page_count = request.metadata.page_count.unwrap_or(1);

    state.store.upsert_client(authenticated_client_id, peer_ip, None)?;

    let job = PrintJob::new(
        authenticated_client_id,
        user_name,
        document_name,
        ext.clone(),
        file_bytes.len() as u64,
        page_count,
        page_size,
        orientation,
        copies,
        request.parameters.color,
        request.parameters.duplex,
        quality,
        margins,
        priority,
    );

    let temp_path: PathBuf = PathBuf::from(&state.config.temp_folder)
        .join(format!("{}.{}", job.job_id, job.file_format));
    if let Some(parent) = temp_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&temp_path, &file_bytes).await?;

    if let Err(err) = state.store.create_job(&job) {
        // The temp file has no row pointing at it; remove it so a crashed
        // or rejected submission never leaves an orphaned payload behind.
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err);
    }

    state.queue.push(job.job_id.to_string(), job.priority, job.created_at);
    let queue_position = state.queue.position_of(&job.job_id.to_string());
    state.queue.renumber_positions(&state.store);

    info!(job_id = %job.job_id, queue_position, "print job admitted");

    Ok(success_response(
        "job accepted",
        Some(job.job_id.to_string()),
        queue_position,
    ))
}
