//! Upload-poll workflow engine
//!
//! Drives one run at a time: validate inputs, derive the object key, upload,
//! poll the destination bucket for the derived object on a fixed cadence,
//! download it, and materialize the result. Cancellation is cooperative via
//! a token checked before every wait and every probe.

use bytes::Bytes;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::config::{Credentials, WorkflowConfig};
use crate::s3::request::RequestDescriptor;
use crate::s3::transport::{ObjectStore, S3Transport, TransportError};
use crate::workflow::key;
use crate::workflow::result::MaterializedObject;
use crate::workflow::scheduler::{Scheduler, TokioScheduler};

/// Content type assumed when neither GET nor HEAD declared one.
const FALLBACK_CONTENT_TYPE: &str = "image/png";

/// Workflow states, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Preparing,
    Uploading,
    Waiting,
    Downloading,
    Complete,
    Error,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Preparing => "preparing",
            WorkflowState::Uploading => "uploading",
            WorkflowState::Waiting => "waiting",
            WorkflowState::Downloading => "downloading",
            WorkflowState::Complete => "complete",
            WorkflowState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Backend transformation preference, carried as object metadata.
///
/// Only a non-default preference is attached to the upload; the backend
/// treats a missing header as the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StylePreference {
    #[default]
    Cartoon,
    Colorize,
}

impl StylePreference {
    pub fn as_metadata(&self) -> &'static str {
        match self {
            StylePreference::Cartoon => "cartoon",
            StylePreference::Colorize => "colorize",
        }
    }
}

impl FromStr for StylePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cartoon" => Ok(StylePreference::Cartoon),
            "colorize" => Ok(StylePreference::Colorize),
            other => Err(format!("unknown style preference: {}", other)),
        }
    }
}

/// Everything one run needs from the caller.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub filename: String,
    pub bytes: Bytes,
    pub credentials: Credentials,
    pub input_bucket: String,
    pub output_bucket: String,
    pub preference: StylePreference,
}

/// Terminal run failures.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("missing required input: {0}")]
    Validation(&'static str),

    #[error("upload failed: {0}")]
    Upload(TransportError),

    #[error("probe failed: {0}")]
    Probe(TransportError),

    #[error("download failed: {0}")]
    Download(TransportError),

    #[error("timed out waiting for derived object after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("could not materialize result: {0}")]
    Materialize(#[from] std::io::Error),
}

struct ActiveRun {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ActiveRun {
    /// A run whose task completed, or whose handle was already joined,
    /// is no longer cancellable.
    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Single-run workflow engine.
///
/// Exactly one run is active at a time; starting a new run cancels the
/// previous one first. State is observed through `subscribe()`, activity
/// through `log()`, and the materialized result through `take_result()`.
pub struct WorkflowEngine {
    config: WorkflowConfig,
    scheduler: Arc<dyn Scheduler>,
    log: ActivityLog,
    state: Arc<watch::Sender<WorkflowState>>,
    result: Arc<Mutex<Option<MaterializedObject>>>,
    active: Mutex<Option<ActiveRun>>,
}

impl WorkflowEngine {
    pub fn new(config: WorkflowConfig) -> Self {
        Self::with_scheduler(config, Arc::new(TokioScheduler))
    }

    /// Engine with an injected scheduler, for time-accelerated tests.
    pub fn with_scheduler(config: WorkflowConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let (state, _) = watch::channel(WorkflowState::Idle);
        Self {
            config,
            scheduler,
            log: ActivityLog::new(),
            state: Arc::new(state),
            result: Arc::new(Mutex::new(None)),
            active: Mutex::new(None),
        }
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        *self.state.borrow()
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Take ownership of the materialized result, if the last run completed.
    pub fn take_result(&self) -> Option<MaterializedObject> {
        self.result.lock().unwrap().take()
    }

    /// Path and content type of the held result without taking ownership.
    pub fn result_info(&self) -> Option<(std::path::PathBuf, String)> {
        self.result
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| (r.path().to_path_buf(), r.content_type().to_string()))
    }

    /// Start a run against real S3 using the request's credentials.
    pub fn start(&self, request: StartRequest) {
        let store = Arc::new(S3Transport::new(request.credentials.clone()));
        self.start_with_store(request, store);
    }

    /// Start a run against an arbitrary store implementation.
    ///
    /// Cancels any active run, clears the activity log, and releases the
    /// previously held result before the new run can create a new one.
    pub fn start_with_store(&self, request: StartRequest, store: Arc<dyn ObjectStore>) {
        self.cancel_active();
        self.log.reset();
        self.result.lock().unwrap().take();

        let cancel = CancellationToken::new();
        let ctx = RunContext {
            store,
            scheduler: Arc::clone(&self.scheduler),
            config: self.config.clone(),
            log: self.log.clone(),
            state: Arc::clone(&self.state),
            result: Arc::clone(&self.result),
            cancel: cancel.clone(),
            request,
        };

        let task = tokio::spawn(run(ctx));
        *self.active.lock().unwrap() = Some(ActiveRun {
            cancel,
            task: Some(task),
        });
    }

    /// Cooperative abort: the run stops at its next suspension point and the
    /// engine returns to idle. Not an error, and the log is kept.
    ///
    /// A no-op once the run has already finished; only `reset()` takes a
    /// terminal state back to idle.
    pub fn cancel(&self) {
        let signalled = {
            let active = self.active.lock().unwrap();
            match active.as_ref() {
                Some(run) if !run.cancel.is_cancelled() && !run.is_finished() => {
                    run.cancel.cancel();
                    true
                }
                _ => false,
            }
        };
        if signalled {
            self.log.append("Cancelled");
            self.state.send_replace(WorkflowState::Idle);
        }
    }

    /// Cancel any in-flight run, clear the log, release the held result,
    /// and return to idle.
    pub fn reset(&self) {
        self.cancel_active();
        self.log.reset();
        self.result.lock().unwrap().take();
        self.state.send_replace(WorkflowState::Idle);
    }

    /// Wait for the active run's task to finish.
    pub async fn join(&self) {
        let task = {
            let mut active = self.active.lock().unwrap();
            active.as_mut().and_then(|run| run.task.take())
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn cancel_active(&self) {
        let active = self.active.lock().unwrap();
        if let Some(run) = active.as_ref() {
            run.cancel.cancel();
        }
    }
}

/// Cloned handles one run carries; the engine itself is not moved into the
/// task.
struct RunContext {
    store: Arc<dyn ObjectStore>,
    scheduler: Arc<dyn Scheduler>,
    config: WorkflowConfig,
    log: ActivityLog,
    state: Arc<watch::Sender<WorkflowState>>,
    result: Arc<Mutex<Option<MaterializedObject>>>,
    cancel: CancellationToken,
    request: StartRequest,
}

impl RunContext {
    fn set_state(&self, state: WorkflowState) {
        // After cancellation a reset or newer run owns the state channel.
        if self.cancel.is_cancelled() {
            return;
        }
        // send_replace publishes even when no receiver is subscribed.
        self.state.send_replace(state);
    }
}

async fn run(ctx: RunContext) {
    let outcome = drive(&ctx).await;

    // Once cancellation is observed, a reset or a newer run owns the state
    // and the log; this run must not touch either again.
    if ctx.cancel.is_cancelled() {
        debug!("run ended after cancellation");
        return;
    }

    if let Err(err) = outcome {
        warn!(error = %err, "workflow run failed");
        ctx.log.append(err.to_string());
        ctx.set_state(WorkflowState::Error);
    }
}

async fn drive(ctx: &RunContext) -> Result<(), WorkflowError> {
    let request = &ctx.request;

    // The run may have been cancelled before this task ever got scheduled.
    if ctx.cancel.is_cancelled() {
        return Ok(());
    }

    ctx.set_state(WorkflowState::Preparing);
    validate(request)?;

    let unique_id = key::fresh_unique_id();
    let uploaded_key = key::upload_key(&ctx.config.input_prefix, &unique_id, &request.filename);
    let content_type = mime_guess::from_path(&request.filename)
        .first_raw()
        .unwrap_or("application/octet-stream");

    let mut upload = RequestDescriptor::put(&request.input_bucket, &uploaded_key)
        .header("content-type", content_type)
        .body(request.bytes.clone());
    if request.preference != StylePreference::default() {
        upload = upload.header(
            "x-amz-meta-stylize-preference",
            request.preference.as_metadata(),
        );
    }

    ctx.log.append(format!(
        "Uploading {} to {}/{}",
        request.filename, request.input_bucket, uploaded_key
    ));
    ctx.set_state(WorkflowState::Uploading);
    ctx.store.put(&upload).await.map_err(WorkflowError::Upload)?;
    if ctx.cancel.is_cancelled() {
        return Ok(());
    }
    ctx.log.append("Upload complete");
    info!(key = %uploaded_key, "object uploaded");

    let derived_key = key::derived_key(&ctx.config.output_prefix, &uploaded_key);
    ctx.log.append(format!(
        "Waiting for {}/{}",
        request.output_bucket, derived_key
    ));
    ctx.set_state(WorkflowState::Waiting);

    let max_attempts = ctx.config.max_poll_attempts;
    let mut head_content_type = None;
    let mut ready = false;

    for attempt in 1..=max_attempts {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }
        ctx.scheduler.wait(ctx.config.poll_interval()).await;
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }

        ctx.log
            .append(format!("Probe attempt {}/{}", attempt, max_attempts));
        let probe = RequestDescriptor::head(&request.output_bucket, &derived_key);
        match ctx.store.head(&probe).await {
            Ok(response) => {
                head_content_type = response.content_type;
                ready = true;
                break;
            }
            Err(err) if err.is_not_found() => {
                debug!(attempt, "derived object not ready");
            }
            // Any other probe failure is terminal; retrying an unknown
            // failure class risks an infinite loop.
            Err(err) => return Err(WorkflowError::Probe(err)),
        }
    }

    if !ready {
        return Err(WorkflowError::Timeout {
            attempts: max_attempts,
        });
    }

    if ctx.cancel.is_cancelled() {
        return Ok(());
    }

    ctx.log.append("Derived object ready, downloading");
    ctx.set_state(WorkflowState::Downloading);
    let fetch = RequestDescriptor::get(&request.output_bucket, &derived_key);
    let response = ctx
        .store
        .get(&fetch)
        .await
        .map_err(WorkflowError::Download)?;
    if ctx.cancel.is_cancelled() {
        return Ok(());
    }

    let content_type = response
        .content_type
        .or(head_content_type)
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
    let object = MaterializedObject::materialize(&response.body, content_type)?;

    {
        let mut slot = ctx.result.lock().unwrap();
        // Release any previous handle before storing the new one.
        slot.take();
        *slot = Some(object);
    }

    ctx.log
        .append(format!("Download complete ({} bytes)", response.body.len()));
    ctx.set_state(WorkflowState::Complete);
    Ok(())
}

fn validate(request: &StartRequest) -> Result<(), WorkflowError> {
    if request.filename.is_empty() {
        return Err(WorkflowError::Validation("file"));
    }
    if request.credentials.region.is_empty() {
        return Err(WorkflowError::Validation("region"));
    }
    if request.credentials.access_key.is_empty() {
        return Err(WorkflowError::Validation("access key"));
    }
    if request.credentials.secret_key.is_empty() {
        return Err(WorkflowError::Validation("secret key"));
    }
    if request.input_bucket.is_empty() {
        return Err(WorkflowError::Validation("input bucket"));
    }
    if request.output_bucket.is_empty() {
        return Err(WorkflowError::Validation("output bucket"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_preference_parse() {
        assert_eq!("cartoon".parse::<StylePreference>(), Ok(StylePreference::Cartoon));
        assert_eq!("colorize".parse::<StylePreference>(), Ok(StylePreference::Colorize));
        assert!("sepia".parse::<StylePreference>().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_inputs() {
        let mut request = StartRequest {
            filename: "cat.png".to_string(),
            bytes: Bytes::from_static(b"x"),
            credentials: Credentials {
                region: "us-east-1".to_string(),
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
                session_token: None,
            },
            input_bucket: "in".to_string(),
            output_bucket: "out".to_string(),
            preference: StylePreference::default(),
        };
        assert!(validate(&request).is_ok());

        request.credentials.secret_key.clear();
        assert!(matches!(
            validate(&request),
            Err(WorkflowError::Validation("secret key"))
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::Waiting.to_string(), "waiting");
        assert_eq!(WorkflowState::Complete.to_string(), "complete");
    }
}
