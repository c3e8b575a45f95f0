//! Stack lifecycle operations driven through the `aws` CLI.

use std::ffi::OsString;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;

use crate::backend::{CreateRequest, NodeAddress, NodeRole, StackHandle, VariantParameters};
use crate::tunnel::{CommandOutput, CommandRunner};

use super::CloudFormationBackend;
use super::error::CloudFormationError;
use super::types::{
    CreateStackResponse, DescribeInstancesResponse, DescribeStacksResponse, FAILED_STATUSES,
    READY_STATUS, StackDescription, logical_id,
};

fn parameter(key: &str, value: &str) -> OsString {
    OsString::from(format!("ParameterKey={key},ParameterValue={value}"))
}

fn variant_parameters(request: &CreateRequest) -> Vec<OsString> {
    let mut params = vec![parameter("KeyName", &request.key_pair_name)];
    match request.variant {
        VariantParameters::Simple { ref admin_location } => {
            params.push(parameter("AdminLocation", admin_location));
            params.push(parameter(
                "SlaveInstanceCount",
                &request.private_agents.to_string(),
            ));
            params.push(parameter(
                "PublicSlaveInstanceCount",
                &request.public_agents.to_string(),
            ));
        }
        VariantParameters::Advanced {
            ref instance_type,
            ref network,
        } => {
            params.push(parameter("MasterInstanceType", instance_type));
            params.push(parameter("PrivateAgentInstanceType", instance_type));
            params.push(parameter("PublicAgentInstanceType", instance_type));
            params.push(parameter(
                "PrivateAgentInstanceCount",
                &request.private_agents.to_string(),
            ));
            params.push(parameter(
                "PublicAgentInstanceCount",
                &request.public_agents.to_string(),
            ));
            if let Some(zen) = network {
                params.push(parameter("Vpc", &zen.vpc));
                params.push(parameter("Gateway", &zen.gateway));
                params.push(parameter("PrivateSubnet", &zen.private_subnet));
                params.push(parameter("PublicSubnet", &zen.public_subnet));
            }
        }
    }
    params
}

fn parse_ip(operation: &str, value: &str) -> Result<IpAddr, CloudFormationError> {
    IpAddr::from_str(value).map_err(|err| CloudFormationError::Payload {
        operation: operation.to_owned(),
        message: format!("bad address '{value}': {err}"),
    })
}

impl<R: CommandRunner> CloudFormationBackend<R> {
    fn run_cli(
        &self,
        operation: &str,
        args: Vec<OsString>,
    ) -> Result<CommandOutput, CloudFormationError> {
        let mut full_args = vec![
            OsString::from("--region"),
            OsString::from(self.region.clone()),
            OsString::from("--output"),
            OsString::from("json"),
        ];
        full_args.extend(args);

        let output = self.runner.run(&self.aws_bin, &full_args)?;
        if output.is_success() {
            return Ok(output);
        }

        Err(CloudFormationError::Api {
            operation: operation.to_owned(),
            status_text: output
                .code
                .map_or_else(|| "unknown".to_owned(), |code| code.to_string()),
            stderr: output.stderr,
        })
    }

    fn run_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<OsString>,
    ) -> Result<T, CloudFormationError> {
        let output = self.run_cli(operation, args)?;
        serde_json::from_str(&output.stdout).map_err(|err| CloudFormationError::Payload {
            operation: operation.to_owned(),
            message: err.to_string(),
        })
    }

    pub(super) fn create_stack(
        &self,
        request: &CreateRequest,
    ) -> Result<String, CloudFormationError> {
        let mut args = vec![
            OsString::from("cloudformation"),
            OsString::from("create-stack"),
            OsString::from("--stack-name"),
            OsString::from(request.stack_name.clone()),
            OsString::from("--template-url"),
            OsString::from(request.template_url.clone()),
            OsString::from("--capabilities"),
            OsString::from("CAPABILITY_IAM"),
            OsString::from("--parameters"),
        ];
        args.extend(variant_parameters(request));

        let response: CreateStackResponse = self.run_json("create-stack", args)?;
        Ok(response.stack_id)
    }

    pub(super) fn stack_description(
        &self,
        stack_id: &str,
    ) -> Result<StackDescription, CloudFormationError> {
        let args = vec![
            OsString::from("cloudformation"),
            OsString::from("describe-stacks"),
            OsString::from("--stack-name"),
            OsString::from(stack_id),
        ];
        let response: DescribeStacksResponse = self.run_json("describe-stacks", args)?;
        response
            .stacks
            .into_iter()
            .next()
            .ok_or_else(|| CloudFormationError::Payload {
                operation: "describe-stacks".to_owned(),
                message: format!("no stack named {stack_id} in response"),
            })
    }

    pub(super) async fn wait_for_complete(
        &self,
        handle: &StackHandle,
    ) -> Result<(), CloudFormationError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            let description = self.stack_description(&handle.stack_id)?;
            if description.stack_status == READY_STATUS {
                return Ok(());
            }
            if FAILED_STATUSES.contains(&description.stack_status.as_str()) {
                return Err(CloudFormationError::CreateFailed {
                    stack_id: handle.stack_id.clone(),
                    status: description.stack_status,
                    reason: description.stack_status_reason.unwrap_or_default(),
                });
            }

            debug!(
                stack_id = %handle.stack_id,
                status = %description.stack_status,
                "stack not complete yet"
            );
            sleep(self.poll_interval).await;
        }

        Err(CloudFormationError::Timeout {
            stack_id: handle.stack_id.clone(),
        })
    }

    pub(super) fn role_nodes(
        &self,
        handle: &StackHandle,
        role: NodeRole,
    ) -> Result<Vec<NodeAddress>, CloudFormationError> {
        let args = vec![
            OsString::from("ec2"),
            OsString::from("describe-instances"),
            OsString::from("--filters"),
            // The stack-name tag carries the plain name; the ARN returned by
            // create-stack lives in the stack-id tag.
            OsString::from(format!(
                "Name=tag:aws:cloudformation:stack-name,Values={}",
                handle.stack_name
            )),
            OsString::from(format!(
                "Name=tag:aws:cloudformation:logical-id,Values={}",
                logical_id(role)
            )),
            OsString::from("Name=instance-state-name,Values=running"),
        ];
        let response: DescribeInstancesResponse = self.run_json("describe-instances", args)?;

        let mut nodes = Vec::new();
        for instance in response
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
        {
            let private_value =
                instance
                    .private_ip_address
                    .ok_or_else(|| CloudFormationError::Payload {
                        operation: "describe-instances".to_owned(),
                        message: "running instance missing private IP".to_owned(),
                    })?;
            let public_ip = instance
                .public_ip_address
                .as_deref()
                .map(|value| parse_ip("describe-instances", value))
                .transpose()?;
            nodes.push(NodeAddress {
                public_ip,
                private_ip: parse_ip("describe-instances", &private_value)?,
            });
        }
        Ok(nodes)
    }

    pub(super) fn delete_stack(&self, handle: &StackHandle) -> Result<(), CloudFormationError> {
        let args = vec![
            OsString::from("cloudformation"),
            OsString::from("delete-stack"),
            OsString::from("--stack-name"),
            OsString::from(handle.stack_id.clone()),
        ];
        self.run_cli("delete-stack", args).map(|_| ())
    }
}
