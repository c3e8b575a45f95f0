//! CloudFormation backend implementation of the cluster lifecycle.
//!
//! Stack operations shell out to the `aws` CLI and decode its JSON output;
//! credentials reach the CLI through the inherited process environment. The
//! wait for stack completion is the slow step of a whole run and owns its own
//! generous timeout.

mod error;
mod lifecycle;
mod types;

use std::time::Duration;

use tracing::info;

use crate::backend::{
    BackendFuture, ClusterBackend, CreateRequest, NodeAddress, NodeRole, StackHandle,
};
use crate::tunnel::{CommandRunner, ProcessCommandRunner};

pub use error::CloudFormationError;

const DEFAULT_AWS_BIN: &str = "aws";
const POLL_INTERVAL: Duration = Duration::from_secs(15);
const WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Backend that provisions clusters through the CloudFormation API.
#[derive(Clone, Debug)]
pub struct CloudFormationBackend<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    region: String,
    aws_bin: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl CloudFormationBackend<ProcessCommandRunner> {
    /// Creates a backend for `region` using the system `aws` CLI.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self::with_runner(region, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> CloudFormationBackend<R> {
    /// Creates a backend with a caller-supplied command runner.
    #[must_use]
    pub fn with_runner(region: impl Into<String>, runner: R) -> Self {
        Self {
            runner,
            region: region.into(),
            aws_bin: DEFAULT_AWS_BIN.to_owned(),
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        }
    }

    /// Overrides the completion polling interval.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the completion wait timeout.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl<R> ClusterBackend for CloudFormationBackend<R>
where
    R: CommandRunner + Send + Sync,
{
    type Error = CloudFormationError;

    fn create<'a>(
        &'a self,
        request: &'a CreateRequest,
    ) -> BackendFuture<'a, StackHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let stack_id = self.create_stack(request)?;
            info!(stack_name = %request.stack_name, %stack_id, "stack creation requested");
            Ok(StackHandle {
                stack_id,
                stack_name: request.stack_name.clone(),
                owned: true,
            })
        })
    }

    fn wait_until_ready<'a>(
        &'a self,
        handle: &'a StackHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.wait_for_complete(handle).await })
    }

    fn nodes<'a>(
        &'a self,
        handle: &'a StackHandle,
        role: NodeRole,
    ) -> BackendFuture<'a, Vec<NodeAddress>, Self::Error> {
        Box::pin(async move { self.role_nodes(handle, role) })
    }

    fn delete(&self, handle: StackHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.delete_stack(&handle)?;
            info!(stack_id = %handle.stack_id, "stack deletion requested");
            Ok(())
        })
    }
}
