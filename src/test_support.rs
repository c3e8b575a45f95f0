//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::tunnel::{CommandOutput, CommandRunner, SpawnError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// The runner is `Send + Sync` so backend futures built on it stay sendable.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptedState>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    responses: VecDeque<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.state().invocations.clone()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout payload.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.state().responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let mut state = self.state();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        state.responses.pop_front().ok_or_else(|| SpawnError {
            program: program.to_owned(),
            message: "no scripted response available".to_owned(),
        })
    }
}

/// Produces a minimal `aws cloudformation create-stack` JSON payload.
#[must_use]
pub fn json_create_stack(stack_id: &str) -> String {
    format!("{{\"StackId\":\"{stack_id}\"}}")
}

/// Produces a minimal `aws cloudformation describe-stacks` JSON payload.
#[must_use]
pub fn json_stack_status(status: &str, reason: Option<&str>) -> String {
    let reason_field = reason.map_or_else(String::new, |text| {
        format!(",\"StackStatusReason\":\"{text}\"")
    });
    format!("{{\"Stacks\":[{{\"StackStatus\":\"{status}\"{reason_field}}}]}}")
}

/// Produces a minimal `aws ec2 describe-instances` JSON payload with one
/// reservation holding the given `(public, private)` address pairs.
#[must_use]
pub fn json_instances(addresses: &[(Option<&str>, &str)]) -> String {
    let instances = addresses
        .iter()
        .map(|(public, private)| {
            let public_field = public.map_or_else(String::new, |address| {
                format!("\"PublicIpAddress\":\"{address}\",")
            });
            format!("{{{public_field}\"PrivateIpAddress\":\"{private}\"}}")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Reservations\":[{{\"Instances\":[{instances}]}}]}}")
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when the same key is passed twice; restoring
    /// duplicates would be order-dependent.
    #[must_use]
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
