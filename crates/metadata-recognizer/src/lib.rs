//! Recognition of Solidity compiler metadata manifests within an arbitrary
//! blob of bytes: a direct JSON object, a JSON string wrapping one (double
//! encoding), or a nested escaped JSON object buried inside unrelated text.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecognizerError {
    #[error("metadata recognized but settings.compilationTarget has {0} entries, expected exactly 1")]
    NotSingleTarget(usize),
}

/// The marker hardhat stamps on compiler build-info bundles.
const BUILD_INFO_MARKER: &str = "hh-sol-build-info-1";

/// Attempt to recognize `blob` as a Solidity metadata manifest, per the
/// algorithm: direct parse, then double-decode, then (if still unrecognized)
/// search for a nested escaped JSON object and retry both steps on it.
pub fn recognize(blob: &str) -> Option<Value> {
    if let Some(value) = try_recognize_json(blob) {
        return Some(value);
    }
    let nested = extract_nested_metadata(blob)?;
    try_recognize_json(&nested)
}

/// Checks the single-compilation-target invariant that must hold after
/// recognition. Callers are expected to discard (and diagnose) any manifest
/// for which this returns an error.
pub fn enforce_single_target(value: &Value) -> Result<(), RecognizerError> {
    let len = compilation_target_len(value);
    if len == 1 {
        Ok(())
    } else {
        Err(RecognizerError::NotSingleTarget(len))
    }
}

/// The recognition predicate from the metadata manifest data model: a
/// Solidity compiler metadata document must declare its language, a single
/// compilation target, a format version, full natspec/ABI output, and at
/// least one source.
pub fn is_metadata_candidate(value: &Value) -> bool {
    value.get("language").and_then(Value::as_str) == Some("Solidity")
        && compilation_target_len(value) > 0
        && is_present_non_empty(value.get("version"))
        && is_present_non_empty(value.pointer("/output/abi"))
        && is_present_non_empty(value.pointer("/output/userdoc"))
        && is_present_non_empty(value.pointer("/output/devdoc"))
        && is_present_non_empty(value.get("sources"))
}

fn compilation_target_len(value: &Value) -> usize {
    value
        .pointer("/settings/compilationTarget")
        .and_then(Value::as_object)
        .map(|m| m.len())
        .unwrap_or(0)
}

fn is_present_non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

fn try_recognize_json(text: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text).ok()?;
    if is_metadata_candidate(&value) {
        return Some(value);
    }
    if let Value::String(inner) = &value {
        if let Ok(inner_value) = serde_json::from_str::<Value>(inner) {
            if is_metadata_candidate(&inner_value) {
                return Some(inner_value);
            }
        }
    }
    None
}

/// Scans raw blob text for a quoted, backslash-escaped JSON object whose
/// prefix looks like metadata (`{\"compiler\":{\"version\"...`), and returns
/// it unescaped so it can be re-parsed as ordinary JSON.
fn extract_nested_metadata(text: &str) -> Option<String> {
    const MARKER: &str = "{\\\"compiler\\\":{\\\"version\\\"";
    let start = text.find(MARKER)?;

    let bytes = text.as_bytes();
    let mut i = start;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut end = None;
    while i < bytes.len() {
        if i + 1 < bytes.len() && bytes[i] == b'\\' && bytes[i + 1] == b'"' {
            in_string = !in_string;
            i += 2;
            continue;
        }
        if !in_string {
            match bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    let end = end?;
    let escaped = &text[start..end];
    Some(escaped.replace("\\\"", "\"").replace("\\\\", "\\"))
}

/// A compiler build-info bundle's harvested contents: inline sources (bypass
/// general recognition) and per-contract metadata blobs (fed back through
/// [`recognize`] by the caller).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildInfoHarvest {
    pub sources: Vec<(String, String)>,
    pub metadata_blobs: Vec<String>,
}

pub fn is_build_info(text: &str) -> bool {
    text.contains(BUILD_INFO_MARKER)
}

/// Harvests `input.sources[*].content` and `output.contracts[*][*].metadata`
/// from a compiler build-info bundle. Returns `None` if the marker is absent
/// or the blob does not parse as JSON.
pub fn harvest_build_info(text: &str) -> Option<BuildInfoHarvest> {
    if !is_build_info(text) {
        return None;
    }
    let value: Value = serde_json::from_str(text).ok()?;

    let mut sources = Vec::new();
    if let Some(input_sources) = value.pointer("/input/sources").and_then(Value::as_object) {
        for (path, entry) in input_sources {
            if let Some(content) = entry.get("content").and_then(Value::as_str) {
                sources.push((path.clone(), content.to_string()));
            }
        }
    }

    let mut metadata_blobs = Vec::new();
    if let Some(contracts) = value.pointer("/output/contracts").and_then(Value::as_object) {
        for per_file in contracts.values() {
            let Some(per_file) = per_file.as_object() else {
                continue;
            };
            for contract in per_file.values() {
                if let Some(metadata) = contract.get("metadata").and_then(Value::as_str) {
                    metadata_blobs.push(metadata.to_string());
                }
            }
        }
    }

    Some(BuildInfoHarvest {
        sources,
        metadata_blobs,
    })
}
