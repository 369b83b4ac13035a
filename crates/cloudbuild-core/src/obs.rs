//! Structured observability hooks for remote calls and batch runs.
//!
//! This module provides:
//! - A batch-scoped tracing span via [`batch_span`]
//! - Emission functions for request completion and batch lifecycle events
//!
//! Events are emitted at `info!` level, failures at `warn!`. Filter with
//! `RUST_LOG`; pass `--json` to the binary for JSON lines.

use tracing::{info, warn, Span};

/// Span carrying the batch run id.
///
/// Attach it to the batch future with [`tracing::Instrument::instrument`] so
/// it is entered only while that future is polled.
///
/// # Example
///
/// ```ignore
/// run(plan).instrument(batch_span("0b6c...")).await;
/// // every event inside carries batch_id = "0b6c..."
/// ```
pub fn batch_span(batch_id: &str) -> Span {
    tracing::info_span!("cloudbuild.batch", batch_id = %batch_id)
}

/// Emit event: one HTTP call finished.
///
/// `url_class` is the path template (e.g. `buildtargets/{id}/builds`); the
/// concrete URL and the token are never logged.
pub fn emit_request_completed(method: &str, url_class: &str, outcome: &str, elapsed_ms: u64) {
    info!(
        event = "request.completed",
        method = %method,
        url_class = %url_class,
        outcome = %outcome,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: one HTTP call failed or timed out.
pub fn emit_request_failed(method: &str, url_class: &str, reason: &str, elapsed_ms: u64) {
    warn!(
        event = "request.failed",
        method = %method,
        url_class = %url_class,
        reason = %reason,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: batch execution started.
pub fn emit_batch_started(batch_id: &str, targets: usize, steps: usize) {
    info!(event = "batch.started", batch_id = %batch_id, targets = targets, steps = steps);
}

/// Emit event: a single batch step finished.
pub fn emit_step_finished(verb: &str, target_id: &str, success: bool) {
    if success {
        info!(event = "batch.step_finished", verb = %verb, target_id = %target_id, success = true);
    } else {
        warn!(event = "batch.step_finished", verb = %verb, target_id = %target_id, success = false);
    }
}

/// Emit event: a target's remaining steps were not attempted.
pub fn emit_target_skipped(target_id: &str, reason: &str) {
    warn!(event = "batch.target_skipped", target_id = %target_id, reason = %reason);
}

/// Emit event: batch finished, normally or aborted.
pub fn emit_batch_finished(
    batch_id: &str,
    duration_ms: u64,
    succeeded: usize,
    failed: usize,
    aborted: bool,
) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
        aborted = aborted,
    );
}
