//! Testing utilities for Kilt workspace
//!
//! Template builders and canned build specs.

#![allow(missing_docs)]

use kilt_core::{BuildSpec, Configuration, MountResource, PolicyStatement};
use serde_json::{json, Map, Value};

/// Recipe used across integration tests, in YAML
pub const RECIPE_YAML: &str = r#"
build:
  image: "kilt:1"
  entry_point: ["/kilt/wrap"]
  command: ["--"]
  environment_variables:
    KILT_ENABLED: "true"
  mount:
    - name: KiltAgent
      image: "kilt-agent:1"
      volumes: ["/kilt"]
      entry_point: ["/kilt/install"]
  execution_policies:
    - name: secrets
      version: "2012-10-17"
      effect: Allow
      action: ["secretsmanager:GetSecretValue"]
      resource: ["*"]
"#;

pub fn agent_mount() -> MountResource {
    MountResource::new(
        "KiltAgent",
        "kilt-agent:1",
        vec!["/kilt".to_string()],
        vec!["/kilt/install".to_string()],
    )
    .unwrap()
}

pub fn policy(name: &str, action: &str) -> PolicyStatement {
    PolicyStatement::new(
        name,
        "2012-10-17",
        "Allow",
        vec![action.to_string()],
        vec!["*".to_string()],
    )
    .unwrap()
}

/// Build spec equivalent to [`RECIPE_YAML`]
pub fn build_spec() -> BuildSpec {
    BuildSpec::new()
        .with_image("kilt:1")
        .with_entry_point(["/kilt/wrap"])
        .with_command(["--"])
        .with_env("KILT_ENABLED", "true")
        .with_mount(agent_mount())
        .with_policy(policy("secrets", "secretsmanager:GetSecretValue"))
}

pub fn opt_in() -> Configuration {
    Configuration::new().with_opt_in(true)
}

pub fn container(name: &str, entry_point: &[&str], command: &[&str]) -> Value {
    let mut def = Map::new();
    def.insert("Name".to_string(), json!(name));
    def.insert("Image".to_string(), json!(format!("{name}:latest")));
    if !entry_point.is_empty() {
        def.insert("EntryPoint".to_string(), json!(entry_point));
    }
    if !command.is_empty() {
        def.insert("Command".to_string(), json!(command));
    }
    Value::Object(def)
}

/// Fargate task definition linked to `role` through `Fn::GetAtt`
pub fn task_definition(role: Option<&str>, tags: &[(&str, &str)], containers: Vec<Value>) -> Value {
    let mut props = Map::new();
    props.insert("RequiresCompatibilities".to_string(), json!(["FARGATE"]));
    if let Some(role) = role {
        props.insert("ExecutionRoleArn".to_string(), json!({"Fn::GetAtt": [role, "Arn"]}));
    }
    props.insert("ContainerDefinitions".to_string(), Value::Array(containers));
    if !tags.is_empty() {
        let tags: Vec<Value> = tags.iter().map(|(k, v)| json!({"Key": k, "Value": v})).collect();
        props.insert("Tags".to_string(), Value::Array(tags));
    }
    json!({"Type": "AWS::ECS::TaskDefinition", "Properties": props})
}

pub fn role() -> Value {
    json!({
        "Type": "AWS::IAM::Role",
        "Properties": {
            "AssumeRolePolicyDocument": {
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": {"Service": "ecs-tasks.amazonaws.com"},
                    "Action": "sts:AssumeRole"
                }]
            }
        }
    })
}

/// Template with the given resources, in order
pub fn template(resources: Vec<(&str, Value)>) -> Value {
    let resources: Map<String, Value> = resources
        .into_iter()
        .map(|(name, resource)| (name.to_string(), resource))
        .collect();
    json!({"AWSTemplateFormatVersion": "2010-09-09", "Resources": resources})
}

pub fn to_bytes(template: &Value) -> Vec<u8> {
    serde_json::to_vec(template).unwrap()
}

pub fn from_bytes(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}
