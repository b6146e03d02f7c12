//! Set-diff reconciliation for collection attributes.

use std::collections::BTreeSet;
use std::future::Future;

use octofhir_client::{CallError, ResponseEnvelope};
use serde_json::Value;

use crate::attr::AttrValue;
use crate::data::ResourceData;
use crate::error::{Diagnostic, Diagnostics, ProviderError, Result};

/// Which side of a set diff an operation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Add,
    Remove,
}

impl SetOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOp::Add => "add",
            SetOp::Remove => "remove",
        }
    }
}

/// Elements to add and remove to turn `old` into `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl SetDiff {
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            to_add: new.difference(old).cloned().collect(),
            to_remove: old.difference(new).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Element operations needed, the size of the symmetric difference.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Per-element failure reported inside a 207 batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFailure {
    pub element: String,
    pub status: u16,
    pub message: String,
}

/// Outcome of one batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub failures: Vec<ElementFailure>,
}

impl BatchOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    /// Interpret a 200/207 batch response.
    ///
    /// Multi-status bodies are either a bare array or an object holding
    /// `results`/`entry`; elements with a non-2xx `status` are failures.
    pub fn from_envelope(envelope: &ResponseEnvelope) -> Self {
        if envelope.status != 207 {
            return Self::ok();
        }
        let Ok(body) = envelope.json::<Value>() else {
            return Self::ok();
        };
        let items = match &body {
            Value::Array(items) => items.as_slice(),
            Value::Object(obj) => obj
                .get("results")
                .or_else(|| obj.get("entry"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        };
        let failures = items
            .iter()
            .filter_map(|item| {
                let status = element_status(item)?;
                if (200..300).contains(&status) {
                    return None;
                }
                let element = ["id", "value", "reference"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str))
                    .unwrap_or("?")
                    .to_string();
                let message = item
                    .get("message")
                    .or_else(|| item.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(ElementFailure {
                    element,
                    status,
                    message,
                })
            })
            .collect();
        Self { failures }
    }
}

fn element_status(item: &Value) -> Option<u16> {
    match item.get("status")? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        // FHIR style "201 Created"
        Value::String(s) => s.split_whitespace().next()?.parse().ok(),
        _ => None,
    }
}

/// What a reconciliation did.
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Elements the server reported as already present or already gone
    pub skipped: Vec<String>,
    pub warnings: Diagnostics,
}

/// Converge a collection attribute from `old` to `new`.
///
/// Removals run before additions. `apply` is called at most once per side
/// with every element of that side. A 422 answer ("already gone" / "already
/// present") is swallowed; per-element failures inside a 200/207 batch become
/// warnings. Any other failure aborts with an error.
pub async fn reconcile_set<F, Fut>(
    attribute: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
    apply: F,
) -> Result<ReconcileResult>
where
    F: FnMut(SetOp, Vec<String>) -> Fut,
    Fut: Future<Output = std::result::Result<BatchOutcome, CallError>>,
{
    let mut reached = old.clone();
    reconcile_tracked(attribute, old, new, apply, &mut reached).await
}

/// [`reconcile_set`] over a set attribute of `data`.
///
/// Whatever the server confirmed is recorded as applied on `data`, also
/// when a later side fails, so a failed update still persists it.
pub async fn reconcile_attribute<F, Fut>(
    data: &mut ResourceData,
    attribute: &str,
    apply: F,
) -> Result<ReconcileResult>
where
    F: FnMut(SetOp, Vec<String>) -> Fut,
    Fut: Future<Output = std::result::Result<BatchOutcome, CallError>>,
{
    let (old, new) = data.set_change(attribute);
    let mut reached = old.clone();
    let result = reconcile_tracked(attribute, &old, &new, apply, &mut reached).await;
    data.record_applied(attribute, AttrValue::string_set(reached));
    result
}

async fn reconcile_tracked<F, Fut>(
    attribute: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
    mut apply: F,
    reached: &mut BTreeSet<String>,
) -> Result<ReconcileResult>
where
    F: FnMut(SetOp, Vec<String>) -> Fut,
    Fut: Future<Output = std::result::Result<BatchOutcome, CallError>>,
{
    let diff = SetDiff::between(old, new);
    let mut result = ReconcileResult::default();
    if diff.is_empty() {
        return Ok(result);
    }

    let sides = [(SetOp::Remove, diff.to_remove), (SetOp::Add, diff.to_add)];
    for (op, elements) in sides {
        if elements.is_empty() {
            continue;
        }
        match apply(op, elements.clone()).await {
            Ok(outcome) => {
                let failed: BTreeSet<&str> =
                    outcome.failures.iter().map(|f| f.element.as_str()).collect();
                for failure in &outcome.failures {
                    result.warnings.push(
                        Diagnostic::warning(format!(
                            "{attribute}: could not {} '{}'",
                            op.as_str(),
                            failure.element
                        ))
                        .with_detail(format!("HTTP {}: {}", failure.status, failure.message))
                        .with_attribute(attribute),
                    );
                }
                let applied: Vec<String> = elements
                    .into_iter()
                    .filter(|e| !failed.contains(e.as_str()))
                    .collect();
                track(reached, op, &applied);
                match op {
                    SetOp::Add => result.added.extend(applied),
                    SetOp::Remove => result.removed.extend(applied),
                }
            }
            Err(err) if err.status() == 422 => {
                tracing::debug!(attribute, op = op.as_str(), error = %err, "ignoring 422");
                track(reached, op, &elements);
                result.skipped.extend(elements);
            }
            Err(err) => {
                return Err(ProviderError::client(
                    format!("{} {attribute}", op.as_str()),
                    err,
                ));
            }
        }
    }

    tracing::info!(
        attribute,
        added = result.added.len(),
        removed = result.removed.len(),
        skipped = result.skipped.len(),
        "collection reconciled"
    );
    Ok(result)
}

fn track(reached: &mut BTreeSet<String>, op: SetOp, elements: &[String]) {
    for element in elements {
        match op {
            SetOp::Add => reached.insert(element.clone()),
            SetOp::Remove => reached.remove(element),
        };
    }
}

/// Treat a 422 answer to a single-element operation as success.
pub fn tolerate_unprocessable<T>(
    result: std::result::Result<T, CallError>,
) -> std::result::Result<Option<T>, CallError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(err) if err.status() == 422 => Ok(None),
        Err(err) => Err(err),
    }
}
