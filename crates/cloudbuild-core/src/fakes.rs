//! Scripted fakes for the transport and operation seams (testing only).
//!
//! Provides `ScriptedBackend` (an [`HttpBackend`] that replays canned
//! replies) and `ScriptedOperations` (a [`BuildOperations`] that fails on
//! chosen calls). Both record every call they receive.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::BuildOperations;
use crate::error::{CloudBuildError, Result};
use crate::transport::{HttpBackend, HttpRequest, HttpResponse};

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond { status: u16, body: String },
    NetworkError(String),
    /// Never completes within any realistic deadline.
    Hang,
}

impl ScriptedReply {
    pub fn respond(status: u16, body: &str) -> Self {
        ScriptedReply::Respond {
            status,
            body: body.to_string(),
        }
    }

    pub fn network_error(detail: &str) -> Self {
        ScriptedReply::NetworkError(detail.to_string())
    }
}

/// Replays replies in order. Once exhausted every call is a network error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        ScriptedBackend {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(ScriptedReply::Respond { status, body }) => Ok(HttpResponse { status, body }),
            Some(ScriptedReply::NetworkError(detail)) => Err(CloudBuildError::Network(detail)),
            Some(ScriptedReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CloudBuildError::Network("hung request finished".to_string()))
            }
            None => Err(CloudBuildError::Network("no scripted reply left".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedOperations
// ---------------------------------------------------------------------------

/// A call received by [`ScriptedOperations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    UpdateBranch { target_id: String, branch: String },
    LaunchBuild { target_id: String },
}

/// Succeeds on every call except the targets registered as failing.
#[derive(Debug, Default)]
pub struct ScriptedOperations {
    failing_updates: HashSet<String>,
    failing_launches: HashSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `update_branch` fail for `target_id`.
    pub fn fail_update(mut self, target_id: &str) -> Self {
        self.failing_updates.insert(target_id.to_string());
        self
    }

    /// Make `launch_build` fail for `target_id`.
    pub fn fail_launch(mut self, target_id: &str) -> Self {
        self.failing_launches.insert(target_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildOperations for ScriptedOperations {
    async fn update_branch(&self, target_id: &str, branch: &str) -> bool {
        self.calls.lock().unwrap().push(RecordedCall::UpdateBranch {
            target_id: target_id.to_string(),
            branch: branch.to_string(),
        });
        !self.failing_updates.contains(target_id)
    }

    async fn launch_build(&self, target_id: &str) -> bool {
        self.calls.lock().unwrap().push(RecordedCall::LaunchBuild {
            target_id: target_id.to_string(),
        });
        !self.failing_launches.contains(target_id)
    }
}
