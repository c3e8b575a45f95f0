//! Remote execution of the integration test suite.
//!
//! Builds the remote command line from the topology facts and forwarded
//! environment, stages the run with a single working-directory check, and
//! executes the suite over the open session. A non-zero suite status is a
//! legitimate result here, never an error, and nothing at this layer retries.

use std::collections::BTreeMap;
use std::net::IpAddr;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::info;

use crate::config::AwsCredentials;
use crate::tunnel::{CommandRunner, RemoteCommandOutput, SshSession, TunnelError};

/// Facts the remote suite needs, assembled from configuration and topology.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestContext {
    /// Provider region the cluster runs in.
    pub aws_region: String,
    /// Address used for cluster-internal name resolution.
    pub dns_address: IpAddr,
    /// Private addresses of the control-plane nodes.
    pub master_hosts: Vec<IpAddr>,
    /// Private addresses of the private agents.
    pub agent_hosts: Vec<IpAddr>,
    /// Private addresses of the public agents.
    pub public_agent_hosts: Vec<IpAddr>,
    /// Credential pair exposed to the remote process.
    pub credentials: AwsCredentials,
    /// Forwarded environment variables, prefix already stripped.
    pub add_env: BTreeMap<String, String>,
    /// Remote directory the suite runs in.
    pub pytest_dir: String,
    /// Suite invocation command line, passed through verbatim.
    pub pytest_cmd: String,
}

/// Outcome of a remote suite run. A zero status denotes success; any
/// non-zero status is a failure at some level (setup, execution, or
/// infrastructure).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestResult {
    /// Exit status of the remote invocation.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl TestResult {
    /// Returns `true` when the suite passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.status == 0
    }
}

/// Errors raised while driving the remote suite.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TestRunError {
    /// Raised when the management channel fails.
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
    /// Raised when the remote invocation terminates without an exit status.
    #[error("remote test run terminated without an exit status")]
    MissingExitStatus,
}

/// Runs the integration suite over `session` and returns its result
/// verbatim.
///
/// # Errors
///
/// Returns [`TestRunError`] when the channel fails or the remote process
/// reports no exit status. A failing suite is reported through
/// [`TestResult::status`], not as an error.
pub fn run_suite<R: CommandRunner>(
    session: &SshSession<R>,
    context: &TestContext,
) -> Result<TestResult, TestRunError> {
    if let Some(setup_failure) = stage(session, context)? {
        return Ok(setup_failure);
    }

    let command = build_test_command(context);
    info!(host = %session.host(), dir = %context.pytest_dir, "running integration suite");
    let output = session.run(&command)?;
    into_result(output)
}

/// Single staging step: confirm the remote working directory exists before
/// launching the suite. A missing directory is a setup-level failure,
/// surfaced as a non-zero result.
fn stage<R: CommandRunner>(
    session: &SshSession<R>,
    context: &TestContext,
) -> Result<Option<TestResult>, TestRunError> {
    let command = format!("test -d {}", escape(context.pytest_dir.as_str().into()));
    let output = session.run(&command)?;
    if output.exit_code == Some(0) {
        return Ok(None);
    }
    into_result(output).map(Some)
}

fn into_result(output: RemoteCommandOutput) -> Result<TestResult, TestRunError> {
    let status = output.exit_code.ok_or(TestRunError::MissingExitStatus)?;
    Ok(TestResult {
        status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Renders the full remote invocation: change into the working directory and
/// run the suite with the context exposed through its environment.
#[must_use]
pub fn build_test_command(context: &TestContext) -> String {
    let mut env_pairs: Vec<(String, String)> = vec![
        (
            "AWS_ACCESS_KEY_ID".to_owned(),
            context.credentials.access_key_id.clone(),
        ),
        (
            "AWS_SECRET_ACCESS_KEY".to_owned(),
            context.credentials.secret_access_key.clone(),
        ),
        ("AWS_REGION".to_owned(), context.aws_region.clone()),
        ("DCOS_PROVIDER".to_owned(), "aws".to_owned()),
        ("DNS_SEARCH".to_owned(), "false".to_owned()),
        (
            "DCOS_DNS_ADDRESS".to_owned(),
            context.dns_address.to_string(),
        ),
        ("MASTER_HOSTS".to_owned(), join_hosts(&context.master_hosts)),
        ("SLAVE_HOSTS".to_owned(), join_hosts(&context.agent_hosts)),
        (
            "PUBLIC_SLAVE_HOSTS".to_owned(),
            join_hosts(&context.public_agent_hosts),
        ),
    ];
    // Forwarded variables come last so they can override the assembled ones.
    env_pairs.extend(
        context
            .add_env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    let exports = env_pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", escape(value.as_str().into())))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "cd {} && {exports} {}",
        escape(context.pytest_dir.as_str().into()),
        context.pytest_cmd
    )
}

fn join_hosts(hosts: &[IpAddr]) -> String {
    hosts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
