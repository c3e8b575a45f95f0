//! Wire types for `aws` CLI JSON responses.

use serde::Deserialize;

use crate::backend::NodeRole;

/// Stack status reported once creation has finished successfully.
pub(crate) const READY_STATUS: &str = "CREATE_COMPLETE";

/// Statuses that mean creation can no longer succeed.
pub(crate) const FAILED_STATUSES: [&str; 5] = [
    "CREATE_FAILED",
    "ROLLBACK_IN_PROGRESS",
    "ROLLBACK_COMPLETE",
    "ROLLBACK_FAILED",
    "DELETE_COMPLETE",
];

/// Maps a cluster role to the logical resource identifier its instances are
/// tagged with by the DC/OS templates.
pub(crate) const fn logical_id(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => "MasterServerGroup",
        NodeRole::PrivateAgent => "SlaveServerGroup",
        NodeRole::PublicAgent => "PublicSlaveServerGroup",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateStackResponse {
    pub stack_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeStacksResponse {
    pub stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StackDescription {
    pub stack_status: String,
    #[serde(default)]
    pub stack_status_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeInstancesResponse {
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Reservation {
    pub instances: Vec<InstanceDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InstanceDescription {
    #[serde(default)]
    pub public_ip_address: Option<String>,
    #[serde(default)]
    pub private_ip_address: Option<String>,
}
