//! Cloud Build Launcher core.
//!
//! Drives the Cloud Build REST API: switches the source-control branch of a
//! set of build targets and launches a build for each, reporting per-target
//! success or failure.
//!
//! Layers, leaf first:
//!
//! - [`transport`]: one bounded HTTP call classified as an [`Outcome`]
//! - [`decode`]: bare JSON arrays into typed lists
//! - [`api`]: list targets, list projects, update branch, launch build
//! - [`batch`]: plan and run a multi-target batch with a failure policy

pub mod api;
pub mod batch;
pub mod decode;
pub mod error;
pub mod fakes;
pub mod model;
pub mod obs;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use api::{branch_update_payload, BuildOperations, CloudBuildApi, STATUS_ACCEPTED, STATUS_OK};
pub use batch::{
    run_batch, BatchOrchestrator, BatchPlan, BatchReport, BatchRequest, BatchState, BatchStep,
    FailurePolicy,
};
pub use decode::decode_array;
pub use error::{CloudBuildError, Result};
pub use model::{target_ids, BuildTarget, Project};
pub use obs::{
    batch_span, emit_batch_finished, emit_batch_started, emit_request_completed,
    emit_request_failed, emit_step_finished, emit_target_skipped,
};
pub use settings::{
    default_settings_path, ApiOptions, EndpointConfig, LauncherSettings, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT,
};
pub use telemetry::init_tracing;
pub use transport::{
    FailureReason, HttpBackend, HttpMethod, HttpRequest, HttpResponse, Outcome, ReqwestBackend,
    TransportAdapter,
};
