//! Records decoded from list responses.

use serde::{Deserialize, Serialize};

/// A named build configuration on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Display name, presentation only.
    pub name: String,
    /// Stable key used in every subsequent API call.
    #[serde(rename = "buildtargetid")]
    pub id: String,
}

/// A project visible to the token. Only used for project selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(rename = "projectid")]
    pub project_id: String,
    #[serde(rename = "orgName", default)]
    pub org_name: String,
    #[serde(rename = "orgid", default)]
    pub org_id: String,
    /// Project guid.
    #[serde(default)]
    pub guid: String,
}

/// Identifiers of `targets`, in order.
pub fn target_ids(targets: &[BuildTarget]) -> Vec<String> {
    targets.iter().map(|t| t.id.clone()).collect()
}
