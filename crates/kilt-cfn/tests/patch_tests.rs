use kilt_cfn::{patch, patch_value, PatchWarning, SkipReason, UnitPatchError};
use kilt_core::{BuildSpec, Configuration, MountResource};
use kilt_test_utils::{
    build_spec, container, from_bytes, opt_in, policy, role, task_definition, template, to_bytes,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn serialized(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

#[test]
fn test_wraps_api_and_grants_secrets() {
    let mut input = template(vec![
        (
            "App",
            task_definition(
                Some("AppRole"),
                &[("kilt-include", "true")],
                vec![container("api", &["/bin/api"], &[])],
            ),
        ),
        ("AppRole", json!({"Type": "AWS::IAM::Role", "Properties": {"Policies": []}})),
    ]);
    input["Resources"]["App"]["Properties"]["ExecutionRoleArn"] = json!({"Ref": "AppRole"});
    let spec = BuildSpec::new()
        .with_entry_point(["/kilt/wrap"])
        .with_policy(policy("secrets", "secretsmanager:GetSecretValue"));

    let output = patch(&to_bytes(&input), &opt_in(), &spec).unwrap();
    let doc = from_bytes(&output.document);

    let api = &doc["Resources"]["App"]["Properties"]["ContainerDefinitions"][0];
    assert_eq!(api["EntryPoint"], json!(["/kilt/wrap"]));
    assert!(api["Command"]
        .as_array()
        .unwrap()
        .contains(&json!("/bin/api")));

    let policies = doc["Resources"]["AppRole"]["Properties"]["Policies"].as_array().unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(
        policies[0],
        json!({
            "PolicyName": "secrets",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["secretsmanager:GetSecretValue"],
                    "Resource": ["*"]
                }]
            }
        })
    );
    assert!(output.is_success());
    assert_eq!(output.report.patched.len(), 1);
    assert_eq!(output.report.patched[0].role.as_deref(), Some("AppRole"));
}

#[test]
fn test_user_container_named_like_default_sidecar_is_kept() {
    let agent = json!({"Name": "agent", "Image": "agent:latest", "EntryPoint": ["/opt/agent"], "Command": ["run"]});
    let input = template(vec![(
        "App",
        task_definition(None, &[], vec![container("api", &["/bin/api"], &[]), agent.clone()]),
    )]);
    let spec = BuildSpec::new().with_entry_point(["/kilt/wrap"]).with_mount(
        MountResource::new(
            "",
            "datadog/agent:7",
            vec!["/kilt".to_string()],
            vec!["/run".to_string()],
        )
        .unwrap(),
    );

    let mut doc = input.clone();
    let report = patch_value(&mut doc, &Configuration::new(), &spec).unwrap();

    assert_eq!(
        report.failed[0].error,
        UnitPatchError::SidecarNameConflict {
            container: "agent".to_string()
        }
    );
    assert_eq!(doc["Resources"]["App"]["Properties"]["ContainerDefinitions"][1], agent);
    assert_eq!(serialized(&doc), serialized(&input));
}

#[test]
fn test_failed_unit_does_not_touch_others() {
    let mut broken = task_definition(
        Some("AppRole"),
        &[],
        vec![container("api", &["/bin/api"], &[])],
    );
    broken["Properties"]["ContainerDefinitions"][0]["Environment"] = json!({"A": "1"});

    let input = template(vec![
        ("Bucket", json!({"Type": "AWS::S3::Bucket", "Properties": {"BucketName": "logs"}})),
        ("Broken", broken),
        ("Healthy", task_definition(None, &[], vec![container("web", &[], &["serve"])])),
        ("AppRole", role()),
    ]);

    let mut doc = input.clone();
    let report = patch_value(&mut doc, &Configuration::new(), &build_spec()).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].unit, "Broken");
    assert!(matches!(
        report.failed[0].error,
        UnitPatchError::InvalidContainer { index: 0, .. }
    ));

    assert_eq!(serialized(&doc["Resources"]["Broken"]), serialized(&input["Resources"]["Broken"]));
    assert_eq!(serialized(&doc["Resources"]["Bucket"]), serialized(&input["Resources"]["Bucket"]));
    // Broken failed before its grant, so the role is untouched too
    assert_eq!(serialized(&doc["Resources"]["AppRole"]), serialized(&input["Resources"]["AppRole"]));

    let healthy = &doc["Resources"]["Healthy"]["Properties"]["ContainerDefinitions"];
    assert_eq!(healthy[0]["EntryPoint"], json!(["/kilt/wrap"]));
    assert_eq!(healthy[1]["Name"], "KiltAgent");
}

#[test]
fn test_opt_out_mode() {
    let input = template(vec![
        (
            "Ignored",
            task_definition(None, &[("kilt-ignore", "")], vec![container("api", &["/bin/api"], &[])]),
        ),
        ("Plain", task_definition(None, &[], vec![container("api", &["/bin/api"], &[])])),
    ]);

    let mut doc = input.clone();
    let report = patch_value(&mut doc, &Configuration::new(), &build_spec()).unwrap();

    assert_eq!(serialized(&doc["Resources"]["Ignored"]), serialized(&input["Resources"]["Ignored"]));
    assert_ne!(doc["Resources"]["Plain"], input["Resources"]["Plain"]);
    assert_eq!(report.skipped, vec![("Ignored".to_string(), SkipReason::Ignored)]);
}

#[test]
fn test_opt_in_mode() {
    let input = template(vec![
        ("Included", task_definition(None, &[("kilt-include", "")], vec![container("api", &["/bin/api"], &[])])),
        (
            "PerContainer",
            task_definition(
                None,
                &[("kilt-include-containers", "worker")],
                vec![container("api", &["/bin/api"], &[]), container("worker", &["/bin/worker"], &[])],
            ),
        ),
        ("Untagged", task_definition(None, &[], vec![container("api", &["/bin/api"], &[])])),
    ]);

    let mut doc = input.clone();
    let report = patch_value(&mut doc, &opt_in(), &build_spec()).unwrap();

    assert_eq!(serialized(&doc["Resources"]["Untagged"]), serialized(&input["Resources"]["Untagged"]));
    assert_eq!(
        doc["Resources"]["Included"]["Properties"]["ContainerDefinitions"][0]["EntryPoint"],
        json!(["/kilt/wrap"])
    );

    let per_container = &doc["Resources"]["PerContainer"]["Properties"]["ContainerDefinitions"];
    assert_eq!(per_container[0], input["Resources"]["PerContainer"]["Properties"]["ContainerDefinitions"][0]);
    assert_eq!(per_container[1]["EntryPoint"], json!(["/kilt/wrap"]));
    assert_eq!(report.patched.len(), 2);
}

#[test]
fn test_ignore_containers_in_opt_out_mode() {
    let input = template(vec![(
        "App",
        task_definition(
            None,
            &[("kilt-ignore-containers", "proxy, ")],
            vec![container("api", &["/bin/api"], &[]), container("proxy", &["/bin/envoy"], &[])],
        ),
    )]);

    let mut doc = input.clone();
    patch_value(&mut doc, &Configuration::new(), &build_spec()).unwrap();

    let defs = &doc["Resources"]["App"]["Properties"]["ContainerDefinitions"];
    assert_eq!(defs[0]["EntryPoint"], json!(["/kilt/wrap"]));
    assert_eq!(defs[1], input["Resources"]["App"]["Properties"]["ContainerDefinitions"][1]);
}

#[test]
fn test_unresolved_role_still_patches_containers() {
    let input = template(vec![(
        "App",
        task_definition(Some("Missing"), &[], vec![container("api", &["/bin/api"], &[])]),
    )]);

    let mut doc = input;
    let report = patch_value(&mut doc, &Configuration::new(), &build_spec()).unwrap();

    assert!(report.is_success());
    let warnings: Vec<_> = report.warnings().cloned().collect();
    assert_eq!(warnings, vec![PatchWarning::UnresolvedRole { unit: "App".to_string() }]);
    assert_eq!(
        doc["Resources"]["App"]["Properties"]["ContainerDefinitions"][0]["EntryPoint"],
        json!(["/kilt/wrap"])
    );
}

#[test]
fn test_non_fargate_resources_are_left_alone() {
    let input = template(vec![
        (
            "Ec2Task",
            json!({"Type": "AWS::ECS::TaskDefinition", "Properties": {
                "RequiresCompatibilities": ["EC2"],
                "ContainerDefinitions": [{"Name": "api"}]
            }}),
        ),
        (
            "NoCompat",
            json!({"Type": "AWS::ECS::TaskDefinition", "Properties": {
                "ContainerDefinitions": [{"Name": "api"}]
            }}),
        ),
    ]);

    let output = patch(&to_bytes(&input), &Configuration::new(), &build_spec()).unwrap();
    assert_eq!(from_bytes(&output.document), input);
    assert_eq!(output.report, kilt_cfn::PatchReport::default());
}

#[test]
fn test_output_keeps_key_order() {
    let input = br#"{"Resources":{"Z":{"Type":"AWS::S3::Bucket"},"A":{"Type":"AWS::S3::Bucket"}},"Outputs":{}}"#;
    let output = patch(input, &Configuration::new(), &build_spec()).unwrap();

    let text = String::from_utf8(output.document).unwrap();
    let z = text.find("\"Z\"").unwrap();
    let a = text.find("\"A\"").unwrap();
    let outputs = text.find("\"Outputs\"").unwrap();
    assert!(z < a && a < outputs);
}
