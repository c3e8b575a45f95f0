//! End-to-end workflow tests for the run orchestrator, driven through a
//! scripted backend and a scripted SSH runner.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8PathBuf;
use cftest::backend::{
    BackendFuture, ClusterBackend, CreateRequest, NodeAddress, NodeRole, StackHandle,
};
use cftest::config::AwsCredentials;
use cftest::test_support::ScriptedRunner;
use cftest::{
    CleanupAction, Connector, ProvisioningPath, RetryPolicy, RunConfig, RunError,
    RunOrchestrator, SshConfig, TemplateVariant,
};
use rstest::rstest;
use tempfile::NamedTempFile;
use thiserror::Error;

use test_constants::{ACCESS_KEY_ID, SECRET_ACCESS_KEY, SIMPLE_TEMPLATE_URL};

const SCRIPTED_STACK_ID: &str = "arn:aws:cloudformation:eu-central-1:123456789012:stack/x/guid";
const SCRIPTED_STACK_NAME: &str = "CF-integration-test-scripted";

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted backend failure: {0}")]
struct ScriptedBackendError(String);

#[derive(Debug, Default)]
struct BackendState {
    masters: Vec<NodeAddress>,
    private_agents: Vec<NodeAddress>,
    public_agents: Vec<NodeAddress>,
    fail_create: bool,
    fail_delete: bool,
    create_calls: usize,
    wait_calls: usize,
    deleted: Vec<StackHandle>,
}

/// Backend double that records lifecycle calls and serves a fixed topology.
#[derive(Clone, Debug, Default)]
struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_topology(masters: Vec<NodeAddress>) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state();
            state.masters = masters;
            state.private_agents = vec![node(None, "10.0.1.1"), node(None, "10.0.1.2")];
            state.public_agents = vec![node(None, "10.0.2.1")];
        }
        backend
    }

    fn reachable() -> Self {
        Self::with_topology(vec![node(Some("203.0.113.10"), "10.0.0.1")])
    }

    fn fail_create(self) -> Self {
        self.state().fail_create = true;
        self
    }

    fn fail_delete(self) -> Self {
        self.state().fail_delete = true;
        self
    }

    fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    fn wait_calls(&self) -> usize {
        self.state().wait_calls
    }

    fn deleted(&self) -> Vec<StackHandle> {
        self.state().deleted.clone()
    }
}

impl ClusterBackend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn create<'a>(
        &'a self,
        _request: &'a CreateRequest,
    ) -> BackendFuture<'a, StackHandle, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.create_calls += 1;
            if state.fail_create {
                return Err(ScriptedBackendError("create refused".to_owned()));
            }
            Ok(StackHandle {
                stack_id: SCRIPTED_STACK_ID.to_owned(),
                stack_name: SCRIPTED_STACK_NAME.to_owned(),
                owned: true,
            })
        })
    }

    fn wait_until_ready<'a>(
        &'a self,
        _handle: &'a StackHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.state().wait_calls += 1;
            Ok(())
        })
    }

    fn nodes<'a>(
        &'a self,
        _handle: &'a StackHandle,
        role: NodeRole,
    ) -> BackendFuture<'a, Vec<NodeAddress>, Self::Error> {
        Box::pin(async move {
            let state = self.state();
            Ok(match role {
                NodeRole::Master => state.masters.clone(),
                NodeRole::PrivateAgent => state.private_agents.clone(),
                NodeRole::PublicAgent => state.public_agents.clone(),
            })
        })
    }

    fn delete(&self, handle: StackHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_delete {
                return Err(ScriptedBackendError("delete refused".to_owned()));
            }
            state.deleted.push(handle);
            Ok(())
        })
    }
}

fn node(public: Option<&str>, private: &str) -> NodeAddress {
    NodeAddress {
        public_ip: public.map(|value| value.parse().expect("valid public IP")),
        private_ip: private.parse().expect("valid private IP"),
    }
}

fn config(provisioning: ProvisioningPath, key_path: Utf8PathBuf, ci_flags: &str) -> RunConfig {
    RunConfig {
        aws_region: "eu-central-1".to_owned(),
        credentials: AwsCredentials {
            access_key_id: ACCESS_KEY_ID.to_owned(),
            secret_access_key: SECRET_ACCESS_KEY.to_owned(),
        },
        provisioning,
        zen: None,
        ssh_key_path: key_path,
        ssh_user: "core".to_owned(),
        add_env: BTreeMap::new(),
        pytest_dir: "/opt/mesosphere/active/dcos-integration-test".to_owned(),
        pytest_cmd: "py.test -vv -rs".to_owned(),
        ci_flags: ci_flags.to_owned(),
    }
}

fn template_path() -> ProvisioningPath {
    ProvisioningPath::Template {
        url: SIMPLE_TEMPLATE_URL.to_owned(),
        variant: TemplateVariant::Simple,
    }
}

fn orchestrator(
    backend: ScriptedBackend,
    runner: &ScriptedRunner,
    key_path: Utf8PathBuf,
) -> RunOrchestrator<ScriptedBackend, ScriptedRunner> {
    let ssh = SshConfig::new("core", key_path).with_retry(RetryPolicy::new(
        Duration::from_millis(1),
        Duration::from_millis(50),
    ));
    RunOrchestrator::new(backend, Connector::new(ssh, runner.clone()))
}

fn key_file() -> (NamedTempFile, Utf8PathBuf) {
    let file = NamedTempFile::new().expect("temp key file");
    let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf-8 temp path");
    (file, path)
}

/// Queues the probe, staging check, and suite responses for one full run.
fn script_full_run(runner: &ScriptedRunner, suite_status: i32) {
    runner.push_success();
    runner.push_success();
    runner.push_output(Some(suite_status), "suite output", "");
}

#[tokio::test]
async fn passing_suite_on_an_owned_stack_deletes_it() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable();
    let runner = ScriptedRunner::new();
    script_full_run(&runner, 0);

    let outcome = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect("run should complete");

    assert!(outcome.result.passed());
    assert_eq!(outcome.cleanup, CleanupAction::Cleaned);
    assert_eq!(backend.create_calls(), 1);
    assert_eq!(backend.wait_calls(), 1);
    let deleted = backend.deleted();
    assert_eq!(deleted.len(), 1);
    assert!(
        deleted.first().is_some_and(|handle| handle.owned),
        "only the owned handle may be deleted"
    );
}

#[tokio::test]
async fn failing_suite_leaves_the_stack_for_inspection() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable();
    let runner = ScriptedRunner::new();
    script_full_run(&runner, 3);

    let outcome = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect("a failing suite is still a completed run");

    assert_eq!(outcome.result.status, 3);
    assert_eq!(outcome.cleanup, CleanupAction::Left);
    assert!(backend.deleted().is_empty(), "no deletion on failure");
    assert_eq!(outcome.exit_code(false), 3);
    assert_eq!(outcome.exit_code(true), 0, "CI mode reports success");
}

#[tokio::test]
async fn attached_stack_is_never_deleted_even_on_success() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable();
    let runner = ScriptedRunner::new();
    script_full_run(&runner, 0);

    let provisioning = ProvisioningPath::ExistingStack {
        name: "operator-stack".to_owned(),
        variant: TemplateVariant::Simple,
    };
    let outcome = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(provisioning, path, ""))
        .await
        .expect("run should complete");

    assert!(outcome.result.passed());
    assert_eq!(outcome.cleanup, CleanupAction::Left);
    assert_eq!(backend.create_calls(), 0, "attach makes no provider calls");
    assert_eq!(backend.wait_calls(), 0);
    assert!(backend.deleted().is_empty());
}

#[tokio::test]
async fn unreachable_entry_node_leaves_the_stack() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable();
    let runner = ScriptedRunner::new();
    for _ in 0..1024 {
        runner.push_failure(255);
    }

    let error = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect_err("connectivity failure should abort the run");

    assert!(matches!(error, RunError::Connect(_)), "{error}");
    assert!(
        backend.deleted().is_empty(),
        "an unreachable cluster is kept for post-mortem"
    );
}

#[tokio::test]
async fn provisioning_failure_is_surfaced_without_cleanup() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable().fail_create();
    let runner = ScriptedRunner::new();

    let error = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect_err("create failure should abort the run");

    assert!(matches!(error, RunError::Provision(_)), "{error}");
    assert!(backend.deleted().is_empty());
    assert!(runner.invocations().is_empty(), "no SSH traffic expected");
}

#[rstest]
#[case::no_masters(Vec::new())]
#[case::no_public_address(vec![node(None, "10.0.0.1")])]
#[tokio::test]
async fn missing_entry_address_aborts_before_any_connection(#[case] masters: Vec<NodeAddress>) {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::with_topology(masters);
    let runner = ScriptedRunner::new();

    let error = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect_err("run should abort");

    assert!(
        matches!(error, RunError::MissingEntryAddress { ref stack_id } if stack_id == SCRIPTED_STACK_ID),
        "{error}"
    );
    assert!(runner.invocations().is_empty(), "no SSH traffic expected");
    assert!(backend.deleted().is_empty());
}

#[tokio::test]
async fn teardown_failure_after_a_passing_suite_is_an_error() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable().fail_delete();
    let runner = ScriptedRunner::new();
    script_full_run(&runner, 0);

    let error = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect_err("delete failure should surface");

    assert!(matches!(error, RunError::Teardown(_)), "{error}");
}

#[tokio::test]
async fn missing_remote_directory_is_a_setup_failure_not_an_error() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::reachable();
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_output(Some(1), "", "");

    let outcome = orchestrator(backend.clone(), &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect("setup failure completes the run with a non-zero status");

    assert_eq!(outcome.result.status, 1);
    assert_eq!(outcome.cleanup, CleanupAction::Left);
    assert_eq!(
        runner.invocations().len(),
        2,
        "the suite must not run after a failed staging check"
    );
}

#[tokio::test]
async fn entry_node_uses_the_first_master_public_address() {
    let (_key, path) = key_file();
    let backend = ScriptedBackend::with_topology(vec![
        node(Some("203.0.113.10"), "10.0.0.1"),
        node(Some("203.0.113.11"), "10.0.0.2"),
    ]);
    let runner = ScriptedRunner::new();
    script_full_run(&runner, 0);

    orchestrator(backend, &runner, path.clone())
        .execute(&config(template_path(), path, ""))
        .await
        .expect("run should complete");

    let invocations = runner.invocations();
    let probe = invocations.first().expect("probe invocation expected");
    assert!(
        probe.command_string().contains("core@203.0.113.10"),
        "{}",
        probe.command_string()
    );
    let entry = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));
    assert!(
        invocations
            .iter()
            .all(|invocation| invocation.command_string().contains(&entry.to_string())),
        "all traffic should target the entry node"
    );
}
