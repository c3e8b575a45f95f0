//! Run configuration resolved from environment-style inputs.
//!
//! The `DCOS_*` knobs load through `ortho-config`, which merges defaults,
//! configuration files, and environment variables. Credentials, the region,
//! CI flags, and the `TEST_ADD_ENV_*` forwarding scan sit outside that prefix
//! and are resolved directly from a captured environment snapshot, so the
//! resolution itself stays a pure function that tests can drive without
//! mutating the process environment.

use std::collections::BTreeMap;
use std::env;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::ZenNetwork;

/// Template name suffixes that denote the simple topology. Any other
/// template name enables the advanced (zen) parameter set.
pub const SIMPLE_TEMPLATE_SUFFIXES: [&str; 2] = [
    "single-master.cloudformation.json",
    "multi-master.cloudformation.json",
];

/// Prefix selecting environment variables forwarded to the remote test run.
/// The prefix is stripped before forwarding.
pub const ADD_ENV_PREFIX: &str = "TEST_ADD_ENV_";

/// Default remote directory containing the integration test suite.
pub const DEFAULT_PYTEST_DIR: &str = "/opt/mesosphere/active/dcos-integration-test";

const DEFAULT_REGION: &str = "eu-central-1";
const REGION_ENV: &str = "DEFAULT_AWS_REGION";
const ADVANCED_TEMPLATE_ENV: &str = "DCOS_ADVANCED_TEMPLATE";
const CI_FLAGS_ENV: &str = "CI_FLAGS";
const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// `DCOS_*` settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "DCOS")]
pub struct DcosConfig {
    /// URL of the CloudFormation template to deploy. When set, the topology
    /// variant is inferred from the template name.
    pub template_url: Option<String>,
    /// Name (or identifier) of an already existing stack to attach to
    /// instead of deploying a template. Attaching also requires
    /// `DCOS_ADVANCED_TEMPLATE` to declare the stack's topology variant.
    pub stack_name: Option<String>,
    /// VPC identifier for advanced deployments.
    pub advanced_vpc: Option<String>,
    /// Internet gateway identifier for advanced deployments.
    pub advanced_gateway: Option<String>,
    /// Private-agent subnet identifier for advanced deployments.
    pub advanced_private_subnet: Option<String>,
    /// Public-agent subnet identifier for advanced deployments.
    pub advanced_public_subnet: Option<String>,
    /// Path to the SSH private key used to reach the cluster.
    #[ortho_config(default = "default_ssh_key".to_owned())]
    pub ssh_key_path: String,
    /// Login user on the cluster nodes.
    #[ortho_config(default = "core".to_owned())]
    pub ssh_user: String,
    /// Remote directory containing the integration test suite.
    #[ortho_config(default = DEFAULT_PYTEST_DIR.to_owned())]
    pub pytest_dir: String,
    /// Remote test invocation. Defaults to a pytest command line combined
    /// with the CI flags.
    pub pytest_cmd: Option<String>,
}

impl DcosConfig {
    /// Loads the `DCOS_*` settings without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging the sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cftest")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Topology variant of a deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemplateVariant {
    /// One master, fixed admin access, uniform sizing.
    Simple,
    /// Zen template with per-role sizing and network placement parameters.
    Advanced,
}

/// How the cluster for this run is obtained.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisioningPath {
    /// Deploy a fresh stack from the template. The run owns the result.
    Template {
        /// Template URL passed to the create call.
        url: String,
        /// Variant inferred from the template name.
        variant: TemplateVariant,
    },
    /// Attach to an existing stack by name. The run never owns the result.
    ExistingStack {
        /// Stack name or identifier supplied by the operator.
        name: String,
        /// Variant declared explicitly by the operator.
        variant: TemplateVariant,
    },
}

/// AWS credential pair forwarded to the provider CLI and the remote run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCredentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// Immutable, validated configuration for one run, built once at start.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunConfig {
    /// Provider region for all API calls and the remote run.
    pub aws_region: String,
    /// Credential pair, required with no default.
    pub credentials: AwsCredentials,
    /// Create-from-template or attach-to-existing decision.
    pub provisioning: ProvisioningPath,
    /// Network placement identifiers, required together or all absent.
    pub zen: Option<ZenNetwork>,
    /// Path to the SSH identity file.
    pub ssh_key_path: Utf8PathBuf,
    /// Remote login user.
    pub ssh_user: String,
    /// Environment variables forwarded to the remote run, prefix stripped.
    pub add_env: BTreeMap<String, String>,
    /// Remote directory the test command runs in.
    pub pytest_dir: String,
    /// Remote test invocation command line.
    pub pytest_cmd: String,
    /// Extra flags passed to pytest; non-empty also enables CI mode.
    pub ci_flags: String,
}

impl RunConfig {
    /// Loads and resolves the full run configuration from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading fails or validation rejects the
    /// inputs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dcos = DcosConfig::load_without_cli_args()?;
        let vars: BTreeMap<String, String> = env::vars().collect();
        Self::resolve(&dcos, &vars)
    }

    /// Resolves a validated configuration from loaded `DCOS_*` settings and
    /// an environment snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the provisioning source is absent, the
    /// variant flag is missing for an attached stack, a credential is unset,
    /// or the zen network parameters are only partially supplied.
    pub fn resolve(
        dcos: &DcosConfig,
        vars: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let provisioning = provisioning_path(dcos, vars)?;
        let credentials = AwsCredentials {
            access_key_id: require_var(vars, ACCESS_KEY_ENV)?,
            secret_access_key: require_var(vars, SECRET_KEY_ENV)?,
        };
        let zen = zen_network(dcos)?;
        let ci_flags = lookup(vars, CI_FLAGS_ENV).unwrap_or_default();
        let pytest_cmd = dcos.pytest_cmd.clone().unwrap_or_else(|| {
            format!("py.test -vv -rs {ci_flags}").trim_end().to_owned()
        });

        Ok(Self {
            aws_region: lookup(vars, REGION_ENV).unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            credentials,
            provisioning,
            zen,
            ssh_key_path: Utf8PathBuf::from(dcos.ssh_key_path.clone()),
            ssh_user: dcos.ssh_user.clone(),
            add_env: forwarded_env(vars),
            pytest_dir: dcos.pytest_dir.clone(),
            pytest_cmd,
            ci_flags,
        })
    }

    /// Returns the topology variant for this run.
    #[must_use]
    pub const fn variant(&self) -> TemplateVariant {
        match self.provisioning {
            ProvisioningPath::Template { variant, .. }
            | ProvisioningPath::ExistingStack { variant, .. } => variant,
        }
    }

    /// Whether the process exit status is forced to zero after a completed
    /// test run.
    #[must_use]
    pub fn ci_mode(&self) -> bool {
        !self.ci_flags.trim().is_empty()
    }
}

/// Infers the topology variant from a template name. Two well-known suffixes
/// denote the simple variant; everything else is advanced.
#[must_use]
pub fn infer_variant(template_url: &str) -> TemplateVariant {
    if SIMPLE_TEMPLATE_SUFFIXES
        .iter()
        .any(|suffix| template_url.ends_with(suffix))
    {
        TemplateVariant::Simple
    } else {
        TemplateVariant::Advanced
    }
}

/// Selects the environment variables forwarded to the remote run and strips
/// the prefix from each key. Collisions after stripping are last-write-wins.
#[must_use]
pub fn forwarded_env(vars: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    vars.iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(ADD_ENV_PREFIX)
                .filter(|stripped| !stripped.is_empty())
                .map(|stripped| (stripped.to_owned(), value.clone()))
        })
        .collect()
}

fn provisioning_path(
    dcos: &DcosConfig,
    vars: &BTreeMap<String, String>,
) -> Result<ProvisioningPath, ConfigError> {
    let template = normalise(dcos.template_url.as_deref());
    let stack = normalise(dcos.stack_name.as_deref());
    match (template, stack) {
        (Some(url), _) => Ok(ProvisioningPath::Template {
            variant: infer_variant(url),
            url: url.to_owned(),
        }),
        (None, Some(name)) => {
            let advanced = advanced_template_flag(vars)?;
            let variant = if advanced {
                TemplateVariant::Advanced
            } else {
                TemplateVariant::Simple
            };
            Ok(ProvisioningPath::ExistingStack {
                name: name.to_owned(),
                variant,
            })
        }
        (None, None) => Err(ConfigError::MissingProvisioningSource),
    }
}

/// Reads the advanced-template flag from the environment snapshot. The flag
/// is read here rather than through the config derive: the derive
/// materialises an unset optional as its default, and attaching without an
/// explicit variant must stay an error.
fn advanced_template_flag(vars: &BTreeMap<String, String>) -> Result<bool, ConfigError> {
    let value = lookup(vars, ADVANCED_TEMPLATE_ENV).ok_or(ConfigError::MissingVariantFlag)?;
    value.to_lowercase().parse().map_err(|_| {
        ConfigError::Parse(format!(
            "{ADVANCED_TEMPLATE_ENV} must be 'true' or 'false', got '{value}'"
        ))
    })
}

fn zen_network(dcos: &DcosConfig) -> Result<Option<ZenNetwork>, ConfigError> {
    let vpc = normalise(dcos.advanced_vpc.as_deref());
    let gateway = normalise(dcos.advanced_gateway.as_deref());
    let private_subnet = normalise(dcos.advanced_private_subnet.as_deref());
    let public_subnet = normalise(dcos.advanced_public_subnet.as_deref());
    match (vpc, gateway, private_subnet, public_subnet) {
        (None, None, None, None) => Ok(None),
        (Some(v), Some(g), Some(prv), Some(publ)) => Ok(Some(ZenNetwork {
            vpc: v.to_owned(),
            gateway: g.to_owned(),
            private_subnet: prv.to_owned(),
            public_subnet: publ.to_owned(),
        })),
        _ => Err(ConfigError::IncompleteZenNetwork),
    }
}

fn normalise(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

fn lookup(vars: &BTreeMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn require_var(vars: &BTreeMap<String, String>, name: &str) -> Result<String, ConfigError> {
    lookup(vars, name).ok_or_else(|| ConfigError::MissingCredential {
        name: name.to_owned(),
    })
}

/// Errors raised while loading or validating the run configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when neither a template nor an existing stack is named.
    #[error("either DCOS_TEMPLATE_URL or DCOS_STACK_NAME must be set")]
    MissingProvisioningSource,
    /// Raised when attaching to a stack without declaring its variant.
    #[error("DCOS_ADVANCED_TEMPLATE=[true/false] must be set when using DCOS_STACK_NAME")]
    MissingVariantFlag,
    /// Raised when a required credential variable is unset or empty.
    #[error("required environment variable {name} is not set")]
    MissingCredential {
        /// Name of the missing variable.
        name: String,
    },
    /// Raised when only a subset of the zen network parameters is supplied.
    #[error(
        "DCOS_ADVANCED_VPC, DCOS_ADVANCED_GATEWAY, DCOS_ADVANCED_PRIVATE_SUBNET, and \
         DCOS_ADVANCED_PUBLIC_SUBNET must be provided together or not at all"
    )]
    IncompleteZenNetwork,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
