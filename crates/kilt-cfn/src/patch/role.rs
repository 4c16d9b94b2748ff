//! Execution role linkage and policy grants
//!
//! Grants are inline policies keyed by `PolicyName`. Merging replaces an entry
//! with the same key, so several units sharing one role converge on the same
//! document whatever order they are patched in.

use kilt_core::PolicyStatement;
use serde_json::{json, Value};

use crate::document::{kind, Tree, TreePath};
use crate::error::DocumentError;

/// Logical name of the role referenced by a task definition's `ExecutionRoleArn`.
///
/// Understands `{"Ref": name}`, `{"Fn::GetAtt": [name, "Arn"]}` and
/// `{"Fn::GetAtt": "name.Arn"}`.
#[must_use]
pub fn execution_role_name(resource: &Value) -> Option<&str> {
    let reference = resource.lookup(&["Properties", "ExecutionRoleArn"])?;

    if let Some(name) = reference.str_at(&["Ref"]) {
        return Some(name);
    }
    match reference.lookup(&["Fn::GetAtt"])? {
        Value::Array(parts) => match parts.as_slice() {
            [name, attr] if attr.as_str() == Some("Arn") => name.as_str(),
            _ => None,
        },
        Value::String(dotted) => dotted.strip_suffix(".Arn"),
        _ => None,
    }
}

/// Inline policy entry for one grant
#[must_use]
pub fn policy_entry(policy: &PolicyStatement) -> Value {
    json!({
        "PolicyName": policy.key(),
        "PolicyDocument": {
            "Version": policy.version(),
            "Statement": [{
                "Effect": policy.effect(),
                "Action": policy.actions(),
                "Resource": policy.resources(),
            }]
        }
    })
}

/// Merge grants into a role resource's `Properties.Policies`.
///
/// Returns the keys that were written. The role is validated before any
/// edit, so an error leaves it untouched.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if `Properties` is not an object, or
/// `Policies` is not an array of objects
pub fn merge_policies(
    role: &mut Value,
    policies: &[PolicyStatement],
) -> Result<Vec<String>, DocumentError> {
    if policies.is_empty() {
        return Ok(Vec::new());
    }
    check_role(role)?;

    if let Some(slot) = role.lookup_mut(&["Properties", "Policies"]) {
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
    }
    let entries = role.ensure_array(&["Properties", "Policies"])?;
    let mut written = Vec::with_capacity(policies.len());

    for policy in policies {
        let entry = policy_entry(policy);
        let existing = entries
            .iter()
            .position(|e| e.get("PolicyName").and_then(Value::as_str) == Some(policy.key()));
        match existing {
            Some(i) => entries[i] = entry,
            None => entries.push(entry),
        }
        tracing::debug!(policy = policy.key(), "merged policy grant");
        written.push(policy.key().to_string());
    }
    Ok(written)
}

/// Check that a role's `Properties.Policies` can take grants
///
/// # Errors
/// [`DocumentError::TypeMismatch`] for a non-object `Properties`, a non-array
/// `Policies` or a non-object policy entry
pub fn check_role(role: &Value) -> Result<(), DocumentError> {
    match role.lookup(&["Properties"]) {
        None | Some(Value::Object(_)) => {}
        Some(other) => {
            return Err(DocumentError::type_mismatch(
                TreePath::new(&["Properties"]),
                "object",
                kind(other),
            ))
        }
    }
    match role.lookup(&["Properties", "Policies"]) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) => items.iter().enumerate().try_for_each(|(i, item)| {
            if item.is_object() {
                Ok(())
            } else {
                Err(DocumentError::type_mismatch(
                    TreePath::new(&["Properties", "Policies"]).child(i.to_string()),
                    "object",
                    kind(item),
                ))
            }
        }),
        Some(other) => Err(DocumentError::type_mismatch(
            TreePath::new(&["Properties", "Policies"]),
            "array",
            kind(other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy(name: &str, action: &str) -> PolicyStatement {
        PolicyStatement::new(
            name,
            "2012-10-17",
            "Allow",
            vec![action.to_string()],
            vec!["*".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn resolves_role_references() {
        let by_ref = json!({"Properties": {"ExecutionRoleArn": {"Ref": "AppRole"}}});
        let by_getatt = json!({"Properties": {"ExecutionRoleArn": {"Fn::GetAtt": ["AppRole", "Arn"]}}});
        let by_dotted = json!({"Properties": {"ExecutionRoleArn": {"Fn::GetAtt": "AppRole.Arn"}}});
        let literal = json!({"Properties": {"ExecutionRoleArn": "arn:aws:iam::1:role/x"}});
        let other_attr = json!({"Properties": {"ExecutionRoleArn": {"Fn::GetAtt": ["AppRole", "RoleId"]}}});

        assert_eq!(execution_role_name(&by_ref), Some("AppRole"));
        assert_eq!(execution_role_name(&by_getatt), Some("AppRole"));
        assert_eq!(execution_role_name(&by_dotted), Some("AppRole"));
        assert_eq!(execution_role_name(&literal), None);
        assert_eq!(execution_role_name(&other_attr), None);
        assert_eq!(execution_role_name(&json!({"Properties": {}})), None);
    }

    #[test]
    fn creates_policies_list() {
        let mut role = json!({"Type": "AWS::IAM::Role"});
        let written = merge_policies(&mut role, &[policy("secrets", "secretsmanager:GetSecretValue")]).unwrap();

        assert_eq!(written, vec!["secrets"]);
        assert_eq!(
            role["Properties"]["Policies"],
            json!([{
                "PolicyName": "secrets",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": ["secretsmanager:GetSecretValue"],
                        "Resource": ["*"]
                    }]
                }
            }])
        );
    }

    #[test]
    fn replaces_same_key_and_keeps_others() {
        let mut role = json!({"Properties": {"Policies": [
            {"PolicyName": "existing", "PolicyDocument": {}},
            {"PolicyName": "secrets", "PolicyDocument": {}}
        ]}});

        merge_policies(&mut role, &[policy("secrets", "a")]).unwrap();
        merge_policies(&mut role, &[policy("secrets", "a")]).unwrap();

        let policies = role["Properties"]["Policies"].as_array().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0]["PolicyName"], "existing");
        assert_eq!(policies[1], policy_entry(&policy("secrets", "a")));
    }

    #[test]
    fn null_policies_count_as_absent() {
        let mut role = json!({"Properties": {"Policies": null}});
        assert!(check_role(&role).is_ok());

        merge_policies(&mut role, &[policy("secrets", "a")]).unwrap();
        assert_eq!(
            role["Properties"]["Policies"],
            json!([policy_entry(&policy("secrets", "a"))])
        );
    }

    #[test]
    fn rejects_bad_policies_without_editing() {
        let mut role = json!({"Properties": {"Policies": {"PolicyName": "x"}}});
        let before = role.clone();
        assert!(merge_policies(&mut role, &[policy("p", "a")]).is_err());
        assert_eq!(role, before);

        let mut role = json!({"Properties": {"Policies": ["x"]}});
        assert!(merge_policies(&mut role, &[policy("p", "a")]).is_err());
    }
}
