//! Remote operations of the Cloud Build API.
//!
//! | operation            | request                                               | expects |
//! |----------------------|-------------------------------------------------------|---------|
//! | `list_build_targets` | `GET  /orgs/{org}/projects/{project}/buildtargets`    | 200     |
//! | `list_projects`      | `GET  /projects`                                      | 200     |
//! | `update_branch`      | `PUT  .../buildtargets/{target}`                      | 200     |
//! | `launch_build`       | `POST .../buildtargets/{target}/builds` (empty body)  | 202     |
//!
//! List operations raise on any failure. `update_branch` and `launch_build`
//! return `false` instead of raising.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::decode::decode_array;
use crate::error::{CloudBuildError, Result};
use crate::model::{BuildTarget, Project};
use crate::settings::{ApiOptions, EndpointConfig};
use crate::transport::{HttpBackend, HttpMethod, Outcome, ReqwestBackend, TransportAdapter};

/// Status returned by reads and config updates.
pub const STATUS_OK: u16 = 200;

/// Status returned when a build launch is accepted. The build has not necessarily started.
pub const STATUS_ACCEPTED: u16 = 202;

/// Mutations the batch orchestrator needs from the remote service.
///
/// Inject [`CloudBuildApi`] in production or a scripted fake in tests.
#[async_trait]
pub trait BuildOperations: Send + Sync {
    /// Point the target's source control at `branch`. `true` only on 200.
    async fn update_branch(&self, target_id: &str, branch: &str) -> bool;

    /// Start a build of the target. `true` only on 202.
    async fn launch_build(&self, target_id: &str) -> bool;
}

#[derive(Serialize)]
struct BranchUpdatePayload<'a> {
    settings: BranchSettings<'a>,
}

#[derive(Serialize)]
struct BranchSettings<'a> {
    scm: ScmSettings<'a>,
}

#[derive(Serialize)]
struct ScmSettings<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    branch: &'a str,
}

/// Body of the branch update request: `{"settings":{"scm":{"type":"git","branch":"<branch>"}}}`.
///
/// The branch name is JSON-escaped.
pub fn branch_update_payload(branch: &str) -> Result<String> {
    let payload = BranchUpdatePayload {
        settings: BranchSettings {
            scm: ScmSettings {
                kind: "git",
                branch,
            },
        },
    };
    Ok(serde_json::to_string(&payload)?)
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() || value == "." || value == ".." {
        return Err(CloudBuildError::InvalidInput(format!(
            "{} {:?} is not a valid path segment",
            kind, value
        )));
    }
    Ok(())
}

/// Client for one organization/project pair.
#[derive(Debug, Clone)]
pub struct CloudBuildApi {
    transport: TransportAdapter,
    endpoint: EndpointConfig,
    base_url: Url,
}

impl CloudBuildApi {
    /// Create a client over an explicit backend.
    ///
    /// Fails with [`CloudBuildError::InvalidConfig`] when the endpoint is
    /// incomplete or the base URL is unusable.
    pub fn new(
        endpoint: EndpointConfig,
        options: ApiOptions,
        backend: Arc<dyn HttpBackend>,
    ) -> Result<Self> {
        endpoint.validate()?;
        let base_url = Url::parse(&options.base_url).map_err(|e| {
            CloudBuildError::InvalidConfig(format!("base url {:?}: {}", options.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CloudBuildError::InvalidConfig(format!(
                "base url {:?} cannot carry a path",
                options.base_url
            )));
        }

        let transport = TransportAdapter::new(backend, &endpoint.api_token, options.timeout);
        Ok(CloudBuildApi {
            transport,
            endpoint,
            base_url,
        })
    }

    /// Create a client that talks to the network through reqwest.
    pub fn connect(endpoint: EndpointConfig, options: ApiOptions) -> Result<Self> {
        let backend = Arc::new(ReqwestBackend::new()?);
        Self::new(endpoint, options, backend)
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn url_with(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CloudBuildError::InvalidConfig("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn project_url(&self, tail: &[&str]) -> Result<Url> {
        validate_segment("organization id", &self.endpoint.org_id)?;
        validate_segment("project id", &self.endpoint.project_id)?;
        let mut segments = vec![
            "orgs",
            self.endpoint.org_id.as_str(),
            "projects",
            self.endpoint.project_id.as_str(),
        ];
        segments.extend_from_slice(tail);
        self.url_with(&segments)
    }

    /// `.../buildtargets`
    pub fn build_targets_url(&self) -> Result<Url> {
        self.project_url(&["buildtargets"])
    }

    /// `.../buildtargets/{target}`
    pub fn build_target_url(&self, target_id: &str) -> Result<Url> {
        validate_segment("target id", target_id)?;
        self.project_url(&["buildtargets", target_id])
    }

    /// `.../buildtargets/{target}/builds`
    pub fn builds_url(&self, target_id: &str) -> Result<Url> {
        validate_segment("target id", target_id)?;
        self.project_url(&["buildtargets", target_id, "builds"])
    }

    /// `/projects`
    pub fn projects_url(&self) -> Result<Url> {
        self.url_with(&["projects"])
    }

    /// GET `url` and decode the bare JSON array it returns.
    pub async fn fetch_array<T: DeserializeOwned>(&self, url: Url, url_class: &str) -> Result<Vec<T>> {
        let body = self
            .transport
            .send(HttpMethod::Get, url, url_class, None, STATUS_OK)
            .await
            .into_result()?;
        let items = decode_array(&body)?;
        debug!(url_class = %url_class, count = items.len(), "decoded list response");
        Ok(items)
    }

    /// All build targets of the configured project, in server order.
    pub async fn list_build_targets(&self) -> Result<Vec<BuildTarget>> {
        let url = self.build_targets_url()?;
        self.fetch_array(url, "buildtargets").await
    }

    /// All projects visible to the token.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let url = self.projects_url()?;
        self.fetch_array(url, "projects").await
    }

    /// Branch update with the full outcome. Invalid input never reaches the network.
    ///
    /// Surrounding whitespace is trimmed from `branch` here and nowhere else,
    /// so batch runs and direct calls send the same branch text.
    pub async fn update_branch_outcome(&self, target_id: &str, branch: &str) -> Result<Outcome<()>> {
        let branch = branch.trim();
        if branch.is_empty() {
            return Err(CloudBuildError::InvalidInput(
                "branch name must not be empty".to_string(),
            ));
        }
        let url = self.build_target_url(target_id)?;
        let body = branch_update_payload(branch)?;
        debug!(target_id = %target_id, branch = %branch, "updating target branch");
        Ok(self
            .transport
            .send(HttpMethod::Put, url, "buildtargets/{id}", Some(body), STATUS_OK)
            .await
            .map(|_| ()))
    }

    /// Build launch with the full outcome.
    pub async fn launch_build_outcome(&self, target_id: &str) -> Result<Outcome<()>> {
        let url = self.builds_url(target_id)?;
        debug!(target_id = %target_id, "launching build");
        Ok(self
            .transport
            .send(
                HttpMethod::Post,
                url,
                "buildtargets/{id}/builds",
                None,
                STATUS_ACCEPTED,
            )
            .await
            .map(|_| ()))
    }

    /// `true` iff the server answered 200.
    pub async fn update_branch(&self, target_id: &str, branch: &str) -> bool {
        match self.update_branch_outcome(target_id, branch).await {
            Ok(outcome) => outcome.is_success(),
            Err(e) => {
                warn!(target_id = %target_id, error = %e, "branch update rejected before sending");
                false
            }
        }
    }

    /// `true` iff the server answered 202.
    pub async fn launch_build(&self, target_id: &str) -> bool {
        match self.launch_build_outcome(target_id).await {
            Ok(outcome) => outcome.is_success(),
            Err(e) => {
                warn!(target_id = %target_id, error = %e, "build launch rejected before sending");
                false
            }
        }
    }
}

#[async_trait]
impl BuildOperations for CloudBuildApi {
    async fn update_branch(&self, target_id: &str, branch: &str) -> bool {
        CloudBuildApi::update_branch(self, target_id, branch).await
    }

    async fn launch_build(&self, target_id: &str) -> bool {
        CloudBuildApi::launch_build(self, target_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedBackend, ScriptedReply};
    use crate::transport::FailureReason;

    fn api(replies: Vec<ScriptedReply>) -> (CloudBuildApi, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(replies));
        let api = CloudBuildApi::new(
            EndpointConfig::new("acme", "space-game", "token"),
            ApiOptions::default(),
            backend.clone(),
        )
        .unwrap();
        (api, backend)
    }

    #[test]
    fn test_branch_payload_exact_bytes() {
        assert_eq!(
            branch_update_payload("main").unwrap(),
            r#"{"settings":{"scm":{"type":"git","branch":"main"}}}"#
        );
    }

    #[test]
    fn test_branch_payload_escapes_quotes() {
        let payload = branch_update_payload(r#"feat/"quoted""#).unwrap();
        assert_eq!(
            payload,
            r#"{"settings":{"scm":{"type":"git","branch":"feat/\"quoted\""}}}"#
        );
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["settings"]["scm"]["branch"], r#"feat/"quoted""#);
    }

    #[test]
    fn test_urls() {
        let (api, _) = api(vec![]);
        assert_eq!(
            api.build_targets_url().unwrap().as_str(),
            "https://build-api.cloud.unity3d.com/api/v1/orgs/acme/projects/space-game/buildtargets"
        );
        assert_eq!(
            api.build_target_url("abc123").unwrap().as_str(),
            "https://build-api.cloud.unity3d.com/api/v1/orgs/acme/projects/space-game/buildtargets/abc123"
        );
        assert_eq!(
            api.builds_url("abc123").unwrap().as_str(),
            "https://build-api.cloud.unity3d.com/api/v1/orgs/acme/projects/space-game/buildtargets/abc123/builds"
        );
        assert_eq!(
            api.projects_url().unwrap().as_str(),
            "https://build-api.cloud.unity3d.com/api/v1/projects"
        );
    }

    #[test]
    fn test_target_id_is_percent_encoded() {
        let (api, _) = api(vec![]);
        let url = api.build_target_url("a/b c").unwrap();
        assert!(url.as_str().ends_with("/buildtargets/a%2Fb%20c"));
    }

    #[test]
    fn test_dot_segments_rejected() {
        let (api, _) = api(vec![]);
        assert!(matches!(
            api.build_target_url(".."),
            Err(CloudBuildError::InvalidInput(_))
        ));
        assert!(api.builds_url("").is_err());
    }

    #[test]
    fn test_new_rejects_incomplete_endpoint() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let result = CloudBuildApi::new(
            EndpointConfig::new("acme", "", "token"),
            ApiOptions::default(),
            backend,
        );
        assert!(matches!(result, Err(CloudBuildError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_update_branch_sends_put_with_payload() {
        let (api, backend) = api(vec![ScriptedReply::respond(200, "{}")]);
        assert!(api.update_branch("abc123", "main").await);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert!(requests[0].url.path().ends_with("/buildtargets/abc123"));
        assert_eq!(
            requests[0].body.as_deref(),
            Some(r#"{"settings":{"scm":{"type":"git","branch":"main"}}}"#)
        );
    }

    #[tokio::test]
    async fn test_update_branch_false_on_other_status() {
        let (api, _) = api(vec![
            ScriptedReply::respond(202, ""),
            ScriptedReply::respond(404, "not found"),
            ScriptedReply::network_error("dns failure"),
        ]);
        assert!(!api.update_branch("t", "main").await);
        assert!(!api.update_branch("t", "main").await);
        assert!(!api.update_branch("t", "main").await);
    }

    #[tokio::test]
    async fn test_update_branch_trims_branch_before_sending() {
        let (api, backend) = api(vec![ScriptedReply::respond(200, "{}")]);
        assert!(api.update_branch("abc123", "  release/1.0\n").await);
        assert_eq!(
            backend.requests()[0].body.as_deref(),
            Some(r#"{"settings":{"scm":{"type":"git","branch":"release/1.0"}}}"#)
        );
    }

    #[tokio::test]
    async fn test_update_branch_empty_branch_never_sent() {
        let (api, backend) = api(vec![ScriptedReply::respond(200, "")]);
        assert!(!api.update_branch("t", "  ").await);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_launch_build_requires_202() {
        let (api, backend) = api(vec![
            ScriptedReply::respond(202, "[]"),
            ScriptedReply::respond(200, "[]"),
        ]);
        assert!(api.launch_build("abc123").await);
        assert!(!api.launch_build("abc123").await);

        let requests = backend.requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert!(requests[0].url.path().ends_with("/buildtargets/abc123/builds"));
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn test_launch_build_outcome_reports_reason() {
        let (api, _) = api(vec![ScriptedReply::respond(500, "boom")]);
        let outcome = api.launch_build_outcome("t").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Failure(FailureReason::UnexpectedStatus(500))
        );
    }

    #[tokio::test]
    async fn test_list_build_targets_decodes_bare_array() {
        let (api, backend) = api(vec![ScriptedReply::respond(
            200,
            r#"[{"name":"iOS","buildtargetid":"ios"},{"name":"Android","buildtargetid":"android"}]"#,
        )]);
        let targets = api.list_build_targets().await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].id, "android");
        assert_eq!(backend.requests()[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_list_build_targets_raises_on_status() {
        let (api, _) = api(vec![ScriptedReply::respond(401, "unauthorized")]);
        let err = api.list_build_targets().await.unwrap_err();
        assert!(matches!(err, CloudBuildError::UnexpectedStatus(401)));
    }

    #[tokio::test]
    async fn test_list_projects_raises_on_malformed_body() {
        let (api, _) = api(vec![ScriptedReply::respond(200, "<html>")]);
        let err = api.list_projects().await.unwrap_err();
        assert!(matches!(err, CloudBuildError::Decode(_)));
    }
}
