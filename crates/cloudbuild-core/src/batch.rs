//! Batch branch-adjust and launch across several build targets.
//!
//! [`BatchPlan::build`] walks the stored target list in order and emits, for
//! each selected target, an optional [`BatchStep::AdjustBranch`] followed by
//! a [`BatchStep::LaunchBuild`]. [`BatchOrchestrator::execute`] runs the
//! steps strictly one after another, one target at a time, and collects a
//! line per attempted step into a [`BatchReport`].
//!
//! A failing step always ends that target's remaining steps. What happens to
//! the targets after it depends on the [`FailurePolicy`].
//! Nothing already applied is rolled back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::BuildOperations;
use crate::error::{CloudBuildError, Result};
use tracing::Instrument;

use crate::obs;

/// Report verb for branch adjustment steps.
pub const VERB_ADJUST: &str = "adjusting";

/// Report verb for launch steps.
pub const VERB_LAUNCH: &str = "start building";

/// What a failing step does to the targets after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure ends the whole batch. Later targets are never attempted.
    #[default]
    AbortBatch,
    /// A failure ends only the failing target; the batch moves on to the next one.
    SkipTarget,
}

/// Launch request assembled by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    /// Target ids the caller marked as selected.
    pub selected: BTreeSet<String>,
    /// Whether every selected target gets its branch switched before launching.
    pub change_branch: bool,
    pub branch_name: String,
    pub policy: FailurePolicy,
}

impl BatchRequest {
    /// Launch-only request for the given selection.
    pub fn new<I, S>(selected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchRequest {
            selected: selected.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Switch every selected target to `branch` before launching it.
    ///
    /// The name is kept as given; [`crate::CloudBuildApi::update_branch`]
    /// trims it at the wire boundary.
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.change_branch = true;
        self.branch_name = branch.to_string();
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// At least one target must be selected, and a branch name is required
    /// when the branch is to be changed.
    pub fn validate(&self) -> Result<()> {
        if self.selected.is_empty() {
            return Err(CloudBuildError::InvalidInput(
                "no build target selected".to_string(),
            ));
        }
        if self.change_branch && self.branch_name.trim().is_empty() {
            return Err(CloudBuildError::InvalidInput(
                "please input a valid branch name".to_string(),
            ));
        }
        Ok(())
    }
}

/// One remote mutation in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchStep {
    AdjustBranch { target_id: String, branch: String },
    LaunchBuild { target_id: String },
}

impl BatchStep {
    pub fn target_id(&self) -> &str {
        match self {
            BatchStep::AdjustBranch { target_id, .. } => target_id,
            BatchStep::LaunchBuild { target_id } => target_id,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            BatchStep::AdjustBranch { .. } => VERB_ADJUST,
            BatchStep::LaunchBuild { .. } => VERB_LAUNCH,
        }
    }

    /// `"<verb> target:<id> succeeded."` or `"<verb> target:<id> failed."`
    pub fn report_line(&self, success: bool) -> String {
        let result = if success { "succeeded" } else { "failed" };
        format!("{} target:{} {}.", self.verb(), self.target_id(), result)
    }
}

/// Ordered steps for one batch run.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Stable identifier for log correlation.
    pub batch_id: String,
    pub steps: Vec<BatchStep>,
    pub policy: FailurePolicy,
}

impl BatchPlan {
    /// Build the plan from the stored target list and the caller's request.
    ///
    /// The stored list decides both membership and order: a selected id that
    /// is no longer stored is ignored.
    pub fn build(stored_targets: &[String], request: &BatchRequest) -> Result<BatchPlan> {
        request.validate()?;

        let mut steps = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for target_id in stored_targets {
            if !request.selected.contains(target_id) || !seen.insert(target_id.as_str()) {
                continue;
            }
            if request.change_branch {
                steps.push(BatchStep::AdjustBranch {
                    target_id: target_id.clone(),
                    branch: request.branch_name.clone(),
                });
            }
            steps.push(BatchStep::LaunchBuild {
                target_id: target_id.clone(),
            });
        }

        Ok(BatchPlan {
            batch_id: uuid::Uuid::new_v4().to_string(),
            steps,
            policy: request.policy,
        })
    }

    /// Distinct target ids in execution order.
    pub fn target_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for step in &self.steps {
            if ids.last().map(String::as_str) != Some(step.target_id()) {
                ids.push(step.target_id().to_string());
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps grouped per target, preserving order.
    fn by_target(&self) -> Vec<(&str, Vec<&BatchStep>)> {
        let mut groups: Vec<(&str, Vec<&BatchStep>)> = Vec::new();
        for step in &self.steps {
            if let Some((target_id, steps)) = groups.last_mut() {
                if *target_id == step.target_id() {
                    steps.push(step);
                    continue;
                }
            }
            groups.push((step.target_id(), vec![step]));
        }
        groups
    }
}

/// Lifecycle of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
}

/// Append-only record of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    /// One line per attempted step, in execution order.
    pub lines: Vec<String>,
    pub succeeded_steps: usize,
    pub failed_steps: usize,
    /// Targets with a failed step.
    pub failed_targets: Vec<String>,
    /// Targets never attempted because the batch aborted.
    pub skipped_targets: Vec<String>,
    /// `true` when a failure ended the batch early.
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    fn new(batch_id: &str) -> Self {
        let now = Utc::now();
        BatchReport {
            batch_id: batch_id.to_string(),
            lines: Vec::new(),
            succeeded_steps: 0,
            failed_steps: 0,
            failed_targets: Vec::new(),
            skipped_targets: Vec::new(),
            aborted: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_steps == 0 && !self.aborted
    }

    /// Report lines joined for display, each terminated by a newline.
    pub fn text(&self) -> String {
        self.lines.iter().map(|line| format!("{}\n", line)).collect()
    }

    fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Runs a [`BatchPlan`] against a [`BuildOperations`] backend.
pub struct BatchOrchestrator<'a> {
    ops: &'a dyn BuildOperations,
    state: BatchState,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(ops: &'a dyn BuildOperations) -> Self {
        BatchOrchestrator {
            ops,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Execute every step of `plan` in order.
    ///
    /// An orchestrator runs exactly one plan; a second call is rejected.
    pub async fn execute(&mut self, plan: &BatchPlan) -> Result<BatchReport> {
        if self.state != BatchState::Idle {
            return Err(CloudBuildError::InvalidInput(format!(
                "orchestrator already used (state {:?})",
                self.state
            )));
        }
        self.state = BatchState::Running;

        let report = self
            .run_plan(plan)
            .instrument(obs::batch_span(&plan.batch_id))
            .await;
        self.state = BatchState::Completed;
        Ok(report)
    }

    async fn run_plan(&self, plan: &BatchPlan) -> BatchReport {
        let groups = plan.by_target();
        obs::emit_batch_started(&plan.batch_id, groups.len(), plan.steps.len());

        let mut report = BatchReport::new(&plan.batch_id);
        for (index, (target_id, steps)) in groups.iter().enumerate() {
            let Err(err) = self.run_target(target_id, steps, &mut report).await else {
                continue;
            };
            match plan.policy {
                FailurePolicy::SkipTarget => {
                    tracing::debug!(target_id = %target_id, error = %err, "continuing with next target");
                }
                FailurePolicy::AbortBatch => {
                    report.aborted = true;
                    for (remaining, _) in &groups[index + 1..] {
                        obs::emit_target_skipped(remaining, &err.to_string());
                        report.skipped_targets.push(remaining.to_string());
                    }
                    break;
                }
            }
        }

        report.finished_at = Utc::now();
        obs::emit_batch_finished(
            &plan.batch_id,
            report.duration_ms(),
            report.succeeded_steps,
            report.failed_steps,
            report.aborted,
        );
        report
    }

    /// Run one target's steps; the first failure skips the rest and is raised.
    async fn run_target(
        &self,
        target_id: &str,
        steps: &[&BatchStep],
        report: &mut BatchReport,
    ) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            let success = match step {
                BatchStep::AdjustBranch { target_id, branch } => {
                    self.ops.update_branch(target_id, branch).await
                }
                BatchStep::LaunchBuild { target_id } => self.ops.launch_build(target_id).await,
            };
            obs::emit_step_finished(step.verb(), target_id, success);
            report.lines.push(step.report_line(success));

            if success {
                report.succeeded_steps += 1;
                continue;
            }

            report.failed_steps += 1;
            report.failed_targets.push(target_id.to_string());
            if index + 1 < steps.len() {
                obs::emit_target_skipped(target_id, &format!("{} failed", step.verb()));
            }
            return Err(CloudBuildError::StepFailed {
                verb: step.verb().to_string(),
                target_id: target_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Plan and execute a batch in one call.
pub async fn run_batch(
    ops: &dyn BuildOperations,
    stored_targets: &[String],
    request: &BatchRequest,
) -> Result<BatchReport> {
    let plan = BatchPlan::build(stored_targets, request)?;
    BatchOrchestrator::new(ops).execute(&plan).await
}
