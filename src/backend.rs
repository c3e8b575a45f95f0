//! Provider boundary for provisioning disposable CloudFormation clusters.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

/// Network placement identifiers for an advanced (zen) deployment. The values
/// are passed through to the template unmodified.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZenNetwork {
    /// VPC identifier hosting the cluster.
    pub vpc: String,
    /// Internet gateway identifier.
    pub gateway: String,
    /// Subnet identifier for private agents.
    pub private_subnet: String,
    /// Subnet identifier for public agents.
    pub public_subnet: String,
}

/// Variant-specific parameter set for a stack creation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VariantParameters {
    /// Simple topology: fixed admin access rule, one master, uniform sizing.
    Simple {
        /// CIDR granted administrative access to the cluster.
        admin_location: String,
    },
    /// Advanced (zen) topology: per-role instance sizing plus optional
    /// network placement.
    Advanced {
        /// Instance type applied to masters and both agent roles.
        instance_type: String,
        /// Network placement identifiers, forwarded verbatim when present.
        network: Option<ZenNetwork>,
    },
}

/// Parameters required to create a new stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateRequest {
    /// Name under which the stack is created.
    pub stack_name: String,
    /// URL of the CloudFormation template.
    pub template_url: String,
    /// Key pair name injected into the template.
    pub key_pair_name: String,
    /// Number of private agents to request.
    pub private_agents: u32,
    /// Number of public agents to request.
    pub public_agents: u32,
    /// Simple or advanced parameter set.
    pub variant: VariantParameters,
}

impl CreateRequest {
    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required string is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.stack_name.trim().is_empty() {
            return Err(BackendError::Validation("stack_name".to_owned()));
        }
        if self.template_url.trim().is_empty() {
            return Err(BackendError::Validation("template_url".to_owned()));
        }
        if self.key_pair_name.trim().is_empty() {
            return Err(BackendError::Validation("key_pair_name".to_owned()));
        }
        match self.variant {
            VariantParameters::Simple { ref admin_location } => {
                if admin_location.trim().is_empty() {
                    return Err(BackendError::Validation("admin_location".to_owned()));
                }
            }
            VariantParameters::Advanced {
                ref instance_type, ..
            } => {
                if instance_type.trim().is_empty() {
                    return Err(BackendError::Validation("instance_type".to_owned()));
                }
            }
        }
        Ok(())
    }
}

/// Handle for a stack, either created by this run or attached to by name.
///
/// The `owned` flag is written once at provisioning time and read by the
/// orchestrator when it decides whether cleanup may delete the stack. An
/// attached stack is never owned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackHandle {
    /// Provider-assigned stack identifier, or the caller-supplied name when
    /// attaching to an existing stack.
    pub stack_id: String,
    /// Plain stack name. Instances are tagged with the name, not the
    /// identifier, so node discovery filters on this.
    pub stack_name: String,
    /// Whether this run created the stack and may delete it.
    pub owned: bool,
}

/// Cluster roles exposed by the provider boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeRole {
    /// Control-plane node running the cluster management services.
    Master,
    /// Worker node without externally routed traffic.
    PrivateAgent,
    /// Worker node accepting externally routed traffic.
    PublicAgent,
}

/// Addresses of a single cluster node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeAddress {
    /// Externally reachable address, present only for some masters.
    pub public_ip: Option<IpAddr>,
    /// Cluster-internal address, always present.
    pub private_ip: IpAddr,
}

/// Node addresses grouped by role, derived once from a ready stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topology {
    /// Control-plane nodes, in provider order.
    pub masters: Vec<NodeAddress>,
    /// Private agents, in provider order.
    pub private_agents: Vec<NodeAddress>,
    /// Public agents, in provider order.
    pub public_agents: Vec<NodeAddress>,
}

impl Topology {
    /// Returns the externally reachable address of the first master, used as
    /// the remote-execution entry node.
    #[must_use]
    pub fn entry_address(&self) -> Option<IpAddr> {
        self.masters.first().and_then(|node| node.public_ip)
    }

    /// Returns the private addresses of all nodes with the given role.
    #[must_use]
    pub fn private_ips(&self, role: NodeRole) -> Vec<IpAddr> {
        let nodes = match role {
            NodeRole::Master => &self.masters,
            NodeRole::PrivateAgent => &self.private_agents,
            NodeRole::PublicAgent => &self.public_agents,
        };
        nodes.iter().map(|node| node.private_ip).collect()
    }
}

/// Errors raised by backend request validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cluster providers.
///
/// Attaching to an existing stack needs no provider call and therefore has no
/// method here; callers construct an unowned [`StackHandle`] directly.
pub trait ClusterBackend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issues the stack creation request and returns a handle used for
    /// subsequent calls. Does not wait for the stack to become ready.
    fn create<'a>(
        &'a self,
        request: &'a CreateRequest,
    ) -> BackendFuture<'a, StackHandle, Self::Error>;

    /// Blocks until the provider reports the stack fully created.
    fn wait_until_ready<'a>(
        &'a self,
        handle: &'a StackHandle,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Returns the addresses of every running node with the given role, in
    /// provider order.
    fn nodes<'a>(
        &'a self,
        handle: &'a StackHandle,
        role: NodeRole,
    ) -> BackendFuture<'a, Vec<NodeAddress>, Self::Error>;

    /// Requests deletion of the stack.
    fn delete(&self, handle: StackHandle) -> BackendFuture<'_, (), Self::Error>;
}
