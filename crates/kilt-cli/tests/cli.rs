use std::path::Path;
use std::process::Command;

use kilt_test_utils::{container, role, task_definition, template, RECIPE_YAML};
use serde_json::{json, Value};
use tempfile::TempDir;

fn kilt() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kilt"))
}

fn write(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_patch_writes_out_file() {
    let dir = TempDir::new().unwrap();
    let recipe = write(dir.path(), "recipe.yaml", RECIPE_YAML.as_bytes());
    let input = template(vec![
        ("App", task_definition(Some("AppRole"), &[], vec![container("api", &["/bin/api"], &[])])),
        ("AppRole", role()),
    ]);
    let template = write(dir.path(), "template.json", &serde_json::to_vec(&input).unwrap());
    let out = dir.path().join("out.json");

    let status = kilt()
        .args(["patch", "--recipe", recipe.as_str(), "--template", template.as_str(), "--out"])
        .arg(&out)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    let doc: Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
    let api = &doc["Resources"]["App"]["Properties"]["ContainerDefinitions"][0];
    assert_eq!(api["EntryPoint"], json!(["/kilt/wrap"]));
    assert_eq!(api["Command"], json!(["--", "/bin/api"]));
    assert_eq!(
        doc["Resources"]["AppRole"]["Properties"]["Policies"][0]["PolicyName"],
        "secrets"
    );
}

#[test]
fn test_patch_to_stdout_with_opt_in() {
    let dir = TempDir::new().unwrap();
    let recipe = write(dir.path(), "recipe.yaml", RECIPE_YAML.as_bytes());
    let input = template(vec![(
        "App",
        task_definition(None, &[], vec![container("api", &["/bin/api"], &[])]),
    )]);
    let template = write(dir.path(), "template.json", &serde_json::to_vec(&input).unwrap());

    let output = kilt()
        .args(["patch", "--opt-in", "--recipe", recipe.as_str(), "--template", template.as_str()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc, input);
}

#[test]
fn test_failed_unit_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let recipe = write(dir.path(), "recipe.yaml", RECIPE_YAML.as_bytes());
    let input = json!({"Resources": {"App": {
        "Type": "AWS::ECS::TaskDefinition",
        "Properties": {"RequiresCompatibilities": ["FARGATE"]}
    }}});
    let template = write(dir.path(), "template.json", &serde_json::to_vec(&input).unwrap());

    let output = kilt()
        .args(["patch", "--recipe", recipe.as_str(), "--template", template.as_str()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(!output.stdout.is_empty());
}

#[test]
fn test_malformed_template_is_fatal() {
    let dir = TempDir::new().unwrap();
    let recipe = write(dir.path(), "recipe.yaml", RECIPE_YAML.as_bytes());
    let template = write(dir.path(), "template.json", b"{\"Resources\": ");

    let output = kilt()
        .args(["patch", "--recipe", recipe.as_str(), "--template", template.as_str()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_validate_reports_mount_index() {
    let dir = TempDir::new().unwrap();
    let recipe = write(
        dir.path(),
        "recipe.json",
        br#"{"build": {"mount": [
            {"image": "a", "volumes": ["/a"], "entry_point": ["/a"]},
            {"image": "b", "entry_point": ["/b"]}
        ]}}"#,
    );

    let output = kilt().args(["validate", "--recipe", recipe.as_str()]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mounts[1]"), "stderr: {stderr}");
}

#[test]
fn test_validate_prints_summary() {
    let dir = TempDir::new().unwrap();
    let recipe = write(dir.path(), "recipe.yaml", RECIPE_YAML.as_bytes());

    let output = kilt().args(["validate", "--recipe", recipe.as_str()]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mount: KiltAgent"));
    assert!(stdout.contains("Policy: secrets"));
}
