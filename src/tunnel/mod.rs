//! SSH connectivity to the cluster entry node.
//!
//! Wraps the system `ssh` client: a [`Connector`] opens a session against a
//! host under a bounded retry (the provider reports infrastructure ready
//! before the node's SSH service necessarily is), and the resulting
//! [`SshSession`] executes remote commands while preserving remote exit
//! codes. Sessions hold no operating-system resources, so nothing can leak
//! across runs when a session goes out of scope.

use std::ffi::OsString;
use std::net::IpAddr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

mod types;

pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};

use crate::retry::{RetryPolicy, retry_with_policy};

/// Delay between connection attempts.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Total time budget for establishing connectivity.
pub const CONNECT_RETRY_BUDGET: Duration = Duration::from_secs(120);

const DEFAULT_SSH_PORT: u16 = 22;
const SSH_CONNECT_TIMEOUT_SECS: u32 = 10;

/// Settings for opening SSH sessions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Remote login user.
    pub user: String,
    /// Path to the SSH private key file.
    pub identity_file: Utf8PathBuf,
    /// TCP port of the remote SSH service.
    pub port: u16,
    /// Retry policy applied while establishing connectivity.
    pub retry: RetryPolicy,
}

impl SshConfig {
    /// Creates a config with the stock binary, port, and retry policy.
    #[must_use]
    pub fn new(user: impl Into<String>, identity_file: Utf8PathBuf) -> Self {
        Self {
            ssh_bin: "ssh".to_owned(),
            user: user.into(),
            identity_file,
            port: DEFAULT_SSH_PORT,
            retry: RetryPolicy::new(CONNECT_RETRY_INTERVAL, CONNECT_RETRY_BUDGET),
        }
    }

    /// Overrides the retry policy, primarily to keep tests fast.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Result of executing a command on the remote side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code of the remote command, when one was reported.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Errors raised while establishing or using SSH connectivity.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TunnelError {
    /// Raised when the identity file permissions cannot be restricted.
    #[error("failed to restrict permissions on {path}: {message}")]
    KeyPermissions {
        /// Identity file path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the SSH client cannot be spawned.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when a connection attempt is refused or rejected.
    #[error("connection attempt to {host} failed (status {status_text}): {stderr}")]
    Probe {
        /// Target host.
        host: String,
        /// Exit status of the attempt, as text.
        status_text: String,
        /// Stderr captured from the SSH client.
        stderr: String,
    },
}

/// Opens SSH sessions under the configured bounded retry.
#[derive(Clone, Debug)]
pub struct Connector<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl<R: CommandRunner + Clone> Connector<R> {
    /// Creates a connector from SSH settings and a command runner.
    #[must_use]
    pub const fn new(config: SshConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Establishes connectivity to `host` and returns an open session.
    ///
    /// The identity file permissions are restricted to owner read/write
    /// before the first attempt; the underlying transport rejects keys with
    /// broader permissions. Attempts repeat at a fixed interval until the
    /// elapsed-time budget is spent, at which point the last underlying
    /// failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::KeyPermissions`] when the key cannot be
    /// tightened, or the final [`TunnelError`] from the last attempt.
    pub async fn connect(&self, host: IpAddr) -> Result<SshSession<R>, TunnelError> {
        restrict_key_permissions(&self.config.identity_file)?;

        retry_with_policy(self.config.retry, || self.probe(host)).await?;

        Ok(SshSession {
            config: self.config.clone(),
            runner: self.runner.clone(),
            host,
        })
    }

    fn probe(&self, host: IpAddr) -> Result<(), TunnelError> {
        let args = build_ssh_args(&self.config, host, "true");
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }

        debug!(host = %host, status = ?output.code, "connection attempt failed");
        Err(TunnelError::Probe {
            host: host.to_string(),
            status_text: status_text(output.code),
            stderr: output.stderr,
        })
    }
}

/// Open management channel to a single cluster node.
#[derive(Clone, Debug)]
pub struct SshSession<R: CommandRunner> {
    config: SshConfig,
    runner: R,
    host: IpAddr,
}

impl<R: CommandRunner> SshSession<R> {
    /// Returns the host this session is bound to.
    #[must_use]
    pub const fn host(&self) -> IpAddr {
        self.host
    }

    /// Executes `remote_command` on the remote side.
    ///
    /// The command is passed verbatim to the SSH client; callers are
    /// responsible for quoting. A non-zero remote exit status is reported in
    /// the output, not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Spawn`] when the SSH client cannot be started.
    pub fn run(&self, remote_command: &str) -> Result<RemoteCommandOutput, TunnelError> {
        let args = build_ssh_args(&self.config, self.host, remote_command);
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        Ok(RemoteCommandOutput {
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn build_ssh_args(config: &SshConfig, host: IpAddr, remote_command: &str) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-p"),
        OsString::from(config.port.to_string()),
        OsString::from("-i"),
        OsString::from(config.identity_file.as_str()),
        OsString::from("-o"),
        OsString::from("BatchMode=yes"),
        OsString::from("-o"),
        OsString::from("StrictHostKeyChecking=no"),
        OsString::from("-o"),
        OsString::from("UserKnownHostsFile=/dev/null"),
        OsString::from("-o"),
        OsString::from(format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}")),
    ];
    args.push(OsString::from(format!("{}@{}", config.user, host)));
    args.push(OsString::from(remote_command));
    args
}

fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_owned(), |value| value.to_string())
}

/// Restricts the identity file to owner read/write. The SSH client rejects
/// keys with broader permissions, so this runs before the first attempt.
///
/// # Errors
///
/// Returns [`TunnelError::KeyPermissions`] when the file cannot be updated.
pub fn restrict_key_permissions(path: &Utf8Path) -> Result<(), TunnelError> {
    let to_error = |err: std::io::Error| TunnelError::KeyPermissions {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let metadata = std::fs::metadata(path).map_err(to_error)?;
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(0o600);
    }
    std::fs::set_permissions(path, permissions).map_err(to_error)
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn config() -> SshConfig {
        SshConfig::new("core", Utf8PathBuf::from("default_ssh_key"))
    }

    #[test]
    fn ssh_args_include_identity_and_target() {
        let host = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));
        let args = build_ssh_args(&config(), host, "true");
        let rendered: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert!(rendered.contains(&"default_ssh_key".to_owned()));
        assert!(rendered.contains(&"core@203.0.113.10".to_owned()));
        assert!(rendered.contains(&"BatchMode=yes".to_owned()));
        assert_eq!(rendered.last(), Some(&"true".to_owned()));
    }

    #[test]
    fn status_text_handles_missing_code() {
        assert_eq!(status_text(None), "unknown");
        assert_eq!(status_text(Some(255)), "255");
    }
}
