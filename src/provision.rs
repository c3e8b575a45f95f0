//! Attach-or-create provisioning decision and stack naming.
//!
//! Attaching to an operator-named stack makes no provider calls and yields an
//! unowned handle that cleanup must never delete. Creating from a template
//! generates a collision-resistant stack name, issues the variant-specific
//! create request, and blocks until the provider reports the stack complete.

use tracing::info;
use uuid::Uuid;

use crate::backend::{ClusterBackend, CreateRequest, StackHandle, VariantParameters};
use crate::config::{ProvisioningPath, RunConfig, TemplateVariant};

/// Prefix for stack names generated by this tool.
pub const STACK_NAME_PREFIX: &str = "CF-integration-test-";

/// Default number of private agents for a fresh deployment.
pub const DEFAULT_PRIVATE_AGENTS: u32 = 2;

/// Default number of public agents for a fresh deployment.
pub const DEFAULT_PUBLIC_AGENTS: u32 = 1;

/// Key pair injected into fresh deployments; the key itself is delivered by
/// CI or the operator.
pub const DEFAULT_KEY_PAIR_NAME: &str = "default";

/// Admin access rule fixed for simple deployments.
pub const DEFAULT_ADMIN_LOCATION: &str = "0.0.0.0/0";

/// Uniform instance sizing for advanced deployments.
pub const ADVANCED_INSTANCE_TYPE: &str = "m3.xlarge";

/// Builds the create request for a fresh deployment of `template_url`.
#[must_use]
pub fn create_request(config: &RunConfig, template_url: &str) -> CreateRequest {
    let variant = match config.variant() {
        TemplateVariant::Simple => VariantParameters::Simple {
            admin_location: DEFAULT_ADMIN_LOCATION.to_owned(),
        },
        TemplateVariant::Advanced => VariantParameters::Advanced {
            instance_type: ADVANCED_INSTANCE_TYPE.to_owned(),
            network: config.zen.clone(),
        },
    };

    CreateRequest {
        stack_name: generate_stack_name(),
        template_url: template_url.to_owned(),
        key_pair_name: DEFAULT_KEY_PAIR_NAME.to_owned(),
        private_agents: DEFAULT_PRIVATE_AGENTS,
        public_agents: DEFAULT_PUBLIC_AGENTS,
        variant,
    }
}

/// Generates a unique stack name under [`STACK_NAME_PREFIX`].
#[must_use]
pub fn generate_stack_name() -> String {
    format!("{STACK_NAME_PREFIX}{}", Uuid::new_v4().simple())
}

/// Provisions the cluster for this run, attaching or creating as configured.
///
/// The creation path returns only once the provider reports the stack fully
/// created; attaching returns immediately with an unowned handle.
///
/// # Errors
///
/// Propagates any backend error from the create call or the ready wait. No
/// cleanup is attempted here; that decision belongs to the orchestrator.
pub async fn provision<B: ClusterBackend>(
    backend: &B,
    config: &RunConfig,
) -> Result<StackHandle, B::Error> {
    match config.provisioning {
        ProvisioningPath::ExistingStack { ref name, .. } => {
            info!(stack = %name, "attaching to existing stack");
            Ok(StackHandle {
                stack_id: name.clone(),
                stack_name: name.clone(),
                owned: false,
            })
        }
        ProvisioningPath::Template { ref url, .. } => {
            let request = create_request(config, url);
            info!(stack_name = %request.stack_name, "spinning up CloudFormation stack");
            let handle = backend.create(&request).await?;
            backend.wait_until_ready(&handle).await?;
            Ok(handle)
        }
    }
}
