//! JSON Patch (RFC 6902) generation for read-modify-patch updates.

use json_patch::{Patch, PatchOperation, diff, patch};
use serde_json::Value;

use crate::error::{ProviderError, Result};

/// Patch turning `original` into `modified`.
///
/// `resourceType` and `id` never change through a patch; a diff that touches
/// them is rejected.
pub fn generate(original: &Value, modified: &Value) -> Result<Patch> {
    let operations = diff(original, modified);
    for op in &operations.0 {
        let path = operation_path(op);
        if path == "/resourceType" || path == "/id" {
            return Err(ProviderError::Unsupported(format!(
                "patch would modify {path}"
            )));
        }
    }
    Ok(operations)
}

/// Apply `operations` to a copy of `resource`.
pub fn apply(resource: &Value, operations: &Patch) -> Result<Value> {
    let mut patched = resource.clone();
    patch(&mut patched, operations)
        .map_err(|e| ProviderError::Failed(format!("patch operation failed: {e}")))?;
    Ok(patched)
}

fn operation_path(op: &PatchOperation) -> &str {
    match op {
        PatchOperation::Add(add_op) => add_op.path.as_str(),
        PatchOperation::Remove(remove_op) => remove_op.path.as_str(),
        PatchOperation::Replace(replace_op) => replace_op.path.as_str(),
        PatchOperation::Move(move_op) => move_op.path.as_str(),
        PatchOperation::Copy(copy_op) => copy_op.path.as_str(),
        PatchOperation::Test(test_op) => test_op.path.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn practitioner() -> Value {
        json!({
            "resourceType": "Practitioner",
            "id": "p1",
            "meta": {"versionId": "1"},
            "identifier": [{"system": "s", "value": "v", "use": "usual"}],
            "name": [{"family": "Doe", "given": ["Jane"]}]
        })
    }

    #[test]
    fn test_patch_reproduces_modified_document() {
        let original = practitioner();
        let mut modified = original.clone();
        modified["name"][0]["given"] = json!(["Jane", "Q"]);
        modified["identifier"].as_array_mut().unwrap().push(json!({"system": "t", "value": "w"}));
        modified.as_object_mut().unwrap().remove("meta");

        let ops = generate(&original, &modified).unwrap();
        assert!(!ops.0.is_empty());
        let patched = apply(&original, &ops).unwrap();
        assert_eq!(
            serde_json::to_vec(&patched).unwrap(),
            serde_json::to_vec(&modified).unwrap()
        );
    }

    #[test]
    fn test_no_changes_no_operations() {
        let original = practitioner();
        assert!(generate(&original, &original.clone()).unwrap().0.is_empty());
    }

    #[test]
    fn test_id_change_rejected() {
        let original = practitioner();
        let mut modified = original.clone();
        modified["id"] = json!("p2");
        assert!(generate(&original, &modified).is_err());
    }
}
