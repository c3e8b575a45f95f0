//! Core library for the cftest deployment-test driver.
//!
//! The crate provisions an ephemeral DC/OS cluster through AWS
//! CloudFormation (or attaches to an existing stack), establishes SSH
//! connectivity to the cluster's entry node under a bounded retry, drives
//! the remote integration suite, and deletes the stack only when this run
//! created it and the suite passed.

pub mod backend;
pub mod cloudformation;
pub mod config;
pub mod provision;
pub mod retry;
pub mod run;
pub mod runner;
pub mod test_support;
pub mod tunnel;

pub use backend::{
    ClusterBackend, CreateRequest, NodeAddress, NodeRole, StackHandle, Topology,
    VariantParameters, ZenNetwork,
};
pub use cloudformation::{CloudFormationBackend, CloudFormationError};
pub use config::{
    ConfigError, DcosConfig, ProvisioningPath, RunConfig, TemplateVariant, infer_variant,
};
pub use provision::{STACK_NAME_PREFIX, provision};
pub use retry::{RetryPolicy, retry_with_policy};
pub use run::{CleanupAction, RunError, RunOrchestrator, RunOutcome};
pub use runner::{TestContext, TestResult, TestRunError, run_suite};
pub use tunnel::{
    CommandOutput, CommandRunner, Connector, ProcessCommandRunner, RemoteCommandOutput,
    SshConfig, SshSession, TunnelError,
};
