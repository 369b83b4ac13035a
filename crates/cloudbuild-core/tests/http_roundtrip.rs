//! End-to-end tests of `CloudBuildApi` over `ReqwestBackend` against a local
//! mock server.

use std::time::Duration;

use cloudbuild_core::{ApiOptions, CloudBuildApi, CloudBuildError, EndpointConfig};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_PATH: &str = "/api/v1/orgs/acme/projects/space-game";

fn api_for(server: &MockServer, timeout: Duration) -> CloudBuildApi {
    let options = ApiOptions::default()
        .with_base_url(&format!("{}/api/v1", server.uri()))
        .with_timeout(timeout);
    CloudBuildApi::connect(EndpointConfig::new("acme", "space-game", "c2VjcmV0"), options)
        .expect("client")
}

#[tokio::test]
async fn list_build_targets_decodes_server_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/buildtargets", PROJECT_PATH)))
        .and(header("Authorization", "Basic c2VjcmV0"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"name":"iOS Dev","buildtargetid":"ios-dev","platform":"ios"},
                {"name":"Android Dev","buildtargetid":"android-dev","platform":"android"}]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let targets = api_for(&server, Duration::from_secs(5))
        .list_build_targets()
        .await
        .unwrap();

    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].name, "iOS Dev");
    assert_eq!(targets[1].id, "android-dev");
}

#[tokio::test]
async fn list_projects_uses_root_projects_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"name":"Space Game","projectid":"space-game","orgName":"Acme","orgid":"acme","guid":"g-1"}]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let projects = api_for(&server, Duration::from_secs(5))
        .list_projects()
        .await
        .unwrap();

    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].org_name, "Acme");
}

#[tokio::test]
async fn update_branch_puts_exact_payload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/buildtargets/abc123", PROJECT_PATH)))
        .and(body_string(
            r#"{"settings":{"scm":{"type":"git","branch":"main"}}}"#,
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(
        api_for(&server, Duration::from_secs(5))
            .update_branch("abc123", "main")
            .await
    );
}

#[tokio::test]
async fn launch_build_accepts_only_202() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/buildtargets/ios-dev/builds", PROJECT_PATH)))
        .respond_with(ResponseTemplate::new(202).set_body_string("[]"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/buildtargets/android-dev/builds", PROJECT_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let api = api_for(&server, Duration::from_secs(5));
    assert!(api.launch_build("ios-dev").await);
    assert!(!api.launch_build("android-dev").await);
}

#[tokio::test]
async fn slow_server_resolves_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/buildtargets", PROJECT_PATH)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[]")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = api_for(&server, Duration::from_millis(200))
        .list_build_targets()
        .await
        .unwrap_err();
    assert!(matches!(err, CloudBuildError::Timeout));
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    // Nothing listens on port 1; the connection is refused.
    let options = ApiOptions::default()
        .with_base_url("http://127.0.0.1:1/api/v1")
        .with_timeout(Duration::from_secs(5));
    let api = CloudBuildApi::connect(EndpointConfig::new("acme", "space-game", "t"), options)
        .unwrap();

    let err = api.list_build_targets().await.unwrap_err();
    assert!(matches!(err, CloudBuildError::Network(_)));
    assert!(!api.launch_build("ios-dev").await);
}
