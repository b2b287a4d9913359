//! Reconciliation of Solidity compiler metadata manifests against a bag of
//! candidate sources: the core of contract verification. Given an unordered
//! set of blobs (files, directories, archives, or compiler build-info
//! bundles), find the manifests, hash-index everything else, and pair each
//! declared source with a provided one by content-addressed lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// A raw input blob: an originating path (diagnostic only) and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBlob {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl From<PathBlob> for archive_expander::Blob {
    fn from(blob: PathBlob) -> Self {
        archive_expander::Blob {
            path: blob.path,
            bytes: blob.bytes,
        }
    }
}

impl From<archive_expander::Blob> for PathBlob {
    fn from(blob: archive_expander::Blob) -> Self {
        PathBlob {
            path: blob.path,
            bytes: blob.bytes,
        }
    }
}

/// A text view of a [`PathBlob`]: the path plus its UTF-8 decoded contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContent {
    pub path: String,
    pub content: String,
}

/// A declared source the reconciler could not find among the candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSource {
    pub keccak256: String,
    pub urls: Vec<String>,
}

/// A declared source whose provided content hashed to something other than
/// the manifest's declared digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSource {
    pub expected_keccak256: String,
    pub computed_keccak256: String,
    pub message: String,
}

/// One manifest's reconciliation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedContract {
    pub manifest: Value,
    pub found: BTreeMap<String, String>,
    pub missing: BTreeMap<String, MissingSource>,
    pub invalid: BTreeMap<String, InvalidSource>,
    pub all_sources: Option<BTreeMap<String, String>>,
}

impl CheckedContract {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    fn diagnostic(&self) -> Option<String> {
        if self.is_valid() {
            return None;
        }
        Some(format!(
            "{} missing, {} invalid",
            self.missing.len(),
            self.invalid.len()
        ))
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no metadata manifests found in input (metadata.json missing)")]
    NoManifestsFound,
    #[error("every recognized manifest was discarded by the single-target check")]
    MalformedManifests,
}

/// Resolves `paths` to blobs (files are loaded, directories walked
/// recursively), then hands them to [`check_files`]. Paths that cannot be
/// read are pushed to `unreadable_sink` when provided, otherwise dropped
/// silently.
pub fn check_paths(
    paths: &[PathBuf],
    unreadable_sink: Option<&mut Vec<String>>,
) -> Result<Vec<CheckedContract>, ValidationError> {
    let blobs = load_paths(paths, unreadable_sink);
    check_files(blobs, None)
}

fn load_paths(paths: &[PathBuf], mut unreadable_sink: Option<&mut Vec<String>>) -> Vec<PathBlob> {
    let mut blobs = Vec::new();
    for root in paths {
        if root.is_dir() {
            for entry in walkdir::WalkDir::new(root)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() {
                    load_one(
                        entry.path(),
                        &mut blobs,
                        unreadable_sink.as_mut().map(|v| &mut **v),
                    );
                }
            }
        } else {
            load_one(root, &mut blobs, unreadable_sink.as_mut().map(|v| &mut **v));
        }
    }
    blobs
}

fn load_one(path: &Path, blobs: &mut Vec<PathBlob>, unreadable_sink: Option<&mut Vec<String>>) {
    match std::fs::read(path) {
        Ok(bytes) => blobs.push(PathBlob {
            path: path.to_string_lossy().into_owned(),
            bytes,
        }),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "could not read path");
            if let Some(sink) = unreadable_sink {
                sink.push(path.to_string_lossy().into_owned());
            }
        }
    }
}

/// An entry in the candidate-source pool: a path plus its decoded content,
/// when the blob round-trips through UTF-8. Non-text blobs are kept only so
/// they can be reported as unused; they never enter the hash index.
struct Candidate {
    path: String,
    content: Option<String>,
}

/// The core reconciliation operation. See module docs for the algorithm.
#[tracing::instrument(skip_all, fields(blob_count = blobs.len()))]
pub fn check_files(
    blobs: Vec<PathBlob>,
    unused_sink: Option<&mut Vec<String>>,
) -> Result<Vec<CheckedContract>, ValidationError> {
    let (expanded, archive_errors) =
        archive_expander::expand_all(blobs.into_iter().map(Into::into).collect());
    for err in &archive_errors {
        tracing::warn!(error = %err, "archive failed to expand");
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut manifests: Vec<Value> = Vec::new();
    let mut recognized_total = 0usize;

    for blob in expanded {
        let Ok(text) = String::from_utf8(blob.bytes) else {
            candidates.push(Candidate {
                path: blob.path,
                content: None,
            });
            continue;
        };

        if metadata_recognizer::is_build_info(&text) {
            match metadata_recognizer::harvest_build_info(&text) {
                Some(harvest) => {
                    for (path, content) in harvest.sources {
                        candidates.push(Candidate {
                            path,
                            content: Some(content),
                        });
                    }
                    for metadata_blob in harvest.metadata_blobs {
                        recognize_one(&metadata_blob, &mut manifests, &mut recognized_total);
                    }
                }
                None => {
                    tracing::warn!(path = %blob.path, "build-info marker present but blob did not parse");
                }
            }
            continue;
        }

        match metadata_recognizer::recognize(&text) {
            Some(value) => {
                recognized_total += 1;
                match metadata_recognizer::enforce_single_target(&value) {
                    Ok(()) => manifests.push(value),
                    Err(err) => {
                        tracing::warn!(path = %blob.path, error = %err, "discarding malformed manifest");
                    }
                }
            }
            None => candidates.push(Candidate {
                path: blob.path,
                content: Some(text),
            }),
        }
    }

    if recognized_total == 0 {
        return Err(ValidationError::NoManifestsFound);
    }
    if manifests.is_empty() {
        return Err(ValidationError::MalformedManifests);
    }

    let mut index: BTreeMap<String, (String, String)> = BTreeMap::new();
    for candidate in &candidates {
        let Some(content) = &candidate.content else {
            continue;
        };
        for variant in keccak_variants::variations(content) {
            let digest = keccak_variants::keccak256_hex(&variant);
            index.insert(digest, (candidate.path.clone(), content.clone()));
        }
    }

    let mut consumed_paths = std::collections::BTreeSet::new();
    let mut contracts = Vec::with_capacity(manifests.len());

    for manifest in manifests {
        let contract = reconcile(&manifest, &index, &mut consumed_paths);
        if let Some(diagnostic) = contract.diagnostic() {
            tracing::warn!(diagnostic = %diagnostic, "checked contract is not valid");
        }
        contracts.push(contract);
    }

    if let Some(sink) = unused_sink {
        for candidate in &candidates {
            if !consumed_paths.contains(&candidate.path) {
                sink.push(candidate.path.clone());
            }
        }
    }

    Ok(contracts)
}

fn recognize_one(text: &str, manifests: &mut Vec<Value>, recognized_total: &mut usize) {
    if let Some(value) = metadata_recognizer::recognize(text) {
        *recognized_total += 1;
        match metadata_recognizer::enforce_single_target(&value) {
            Ok(()) => manifests.push(value),
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed harvested manifest");
            }
        }
    }
}

fn reconcile(
    manifest: &Value,
    index: &BTreeMap<String, (String, String)>,
    consumed_paths: &mut std::collections::BTreeSet<String>,
) -> CheckedContract {
    let mut found = BTreeMap::new();
    let mut missing = BTreeMap::new();
    let mut invalid = BTreeMap::new();

    let sources = manifest
        .get("sources")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (logical_path, entry) in sources {
        let declared_digest = entry
            .get("keccak256")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if let Some(content) = entry.get("content").and_then(Value::as_str) {
            let computed = keccak_variants::keccak256_hex(content);
            if computed == declared_digest {
                found.insert(logical_path, content.to_string());
            } else {
                invalid.insert(
                    logical_path.clone(),
                    InvalidSource {
                        expected_keccak256: declared_digest,
                        computed_keccak256: computed,
                        message: format!("inline content of '{logical_path}' does not match declared digest"),
                    },
                );
            }
            continue;
        }

        match index.get(&declared_digest) {
            Some((path, content)) => {
                consumed_paths.insert(path.clone());
                found.insert(logical_path, content.clone());
            }
            None => {
                let urls = entry
                    .get("urls")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                missing.insert(
                    logical_path,
                    MissingSource {
                        keccak256: declared_digest,
                        urls,
                    },
                );
            }
        }
    }

    CheckedContract {
        manifest: manifest.clone(),
        found,
        missing,
        invalid,
        all_sources: None,
    }
}

/// Returns a new checked contract whose source map is the union of every
/// supplied source and the original contract's hash-verified sources. On key
/// collision, the originally verified content wins.
pub fn use_all_sources(contract: &CheckedContract, blobs: &[PathBlob]) -> CheckedContract {
    let mut all_sources: BTreeMap<String, String> = BTreeMap::new();
    for blob in blobs {
        if let Ok(content) = String::from_utf8(blob.bytes.clone()) {
            all_sources.insert(blob.path.clone(), content);
        }
    }
    for (path, content) in &contract.found {
        all_sources.insert(path.clone(), content.clone());
    }

    CheckedContract {
        all_sources: Some(all_sources),
        ..contract.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_manifest(content: &str) -> Value {
        let digest = keccak_variants::keccak256_hex(content);
        json!({
            "language": "Solidity",
            "compiler": {"version": "0.8.14+commit.80d49f37"},
            "version": 1,
            "settings": {"compilationTarget": {"contracts/A.sol": "A"}},
            "output": {
                "abi": [{"type": "function"}],
                "devdoc": {"methods": {}},
                "userdoc": {"methods": {}}
            },
            "sources": {
                "contracts/A.sol": {"keccak256": digest, "urls": ["bzzr://dead"]}
            }
        })
    }

    fn blob(path: &str, content: &str) -> PathBlob {
        PathBlob {
            path: path.to_string(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn fails_with_no_manifests_found() {
        let blobs = vec![blob("A.sol", "contract A {}")];
        assert!(matches!(
            check_files(blobs, None),
            Err(ValidationError::NoManifestsFound)
        ));
    }

    #[test]
    fn fails_with_malformed_manifests_when_all_discarded() {
        let mut multi_target = sample_manifest("contract A {}");
        multi_target["settings"]["compilationTarget"]["contracts/B.sol"] = json!("B");
        let blobs = vec![blob("metadata.json", &multi_target.to_string())];
        assert!(matches!(
            check_files(blobs, None),
            Err(ValidationError::MalformedManifests)
        ));
    }

    #[test]
    fn reconciles_source_found_by_hash() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let blobs = vec![
            blob("metadata.json", &manifest.to_string()),
            blob("contracts/A.sol", content),
        ];
        let contracts = check_files(blobs, None).expect("should produce one contract");
        assert_eq!(contracts.len(), 1);
        assert!(contracts[0].is_valid());
        assert_eq!(
            contracts[0].found.get("contracts/A.sol"),
            Some(&content.to_string())
        );
    }

    #[test]
    fn reconciles_via_line_ending_variation() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let blobs = vec![
            blob("metadata.json", &manifest.to_string()),
            blob("contracts/A.sol", "contract A {}\r\n"),
        ];
        let contracts = check_files(blobs, None).expect("should produce one contract");
        assert!(contracts[0].is_valid());
    }

    #[test]
    fn reports_missing_source() {
        let manifest = sample_manifest("contract A {}\n");
        let blobs = vec![blob("metadata.json", &manifest.to_string())];
        let contracts = check_files(blobs, None).expect("should still produce a contract");
        assert!(!contracts[0].is_valid());
        assert!(contracts[0].missing.contains_key("contracts/A.sol"));
        assert_eq!(
            contracts[0].missing["contracts/A.sol"].urls,
            vec!["bzzr://dead".to_string()]
        );
    }

    #[test]
    fn reports_invalid_inline_content() {
        let mut manifest = sample_manifest("contract A {}\n");
        manifest["sources"]["contracts/A.sol"]["content"] = json!("contract A { uint x; }");
        let blobs = vec![blob("metadata.json", &manifest.to_string())];
        let contracts = check_files(blobs, None).expect("should still produce a contract");
        assert!(!contracts[0].is_valid());
        assert!(contracts[0].invalid.contains_key("contracts/A.sol"));
    }

    #[test]
    fn unused_sink_reports_unconsumed_candidates() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let blobs = vec![
            blob("metadata.json", &manifest.to_string()),
            blob("contracts/A.sol", content),
            blob("contracts/Unused.sol", "contract Unused {}"),
        ];
        let mut unused = Vec::new();
        let contracts = check_files(blobs, Some(&mut unused)).expect("should reconcile");
        assert!(contracts[0].is_valid());
        assert_eq!(unused, vec!["contracts/Unused.sol".to_string()]);
    }

    #[test]
    fn use_all_sources_unions_and_prefers_verified_content() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let blobs = vec![
            blob("metadata.json", &manifest.to_string()),
            blob("contracts/A.sol", content),
            blob("contracts/Extra.sol", "contract Extra {}"),
        ];
        let contracts = check_files(blobs.clone(), None).expect("should reconcile");
        let enriched = use_all_sources(&contracts[0], &blobs);
        let all_sources = enriched.all_sources.expect("should populate all_sources");
        assert_eq!(
            all_sources.get("contracts/A.sol"),
            Some(&content.to_string())
        );
        assert!(all_sources.contains_key("contracts/Extra.sol"));
    }

    #[test]
    fn harvests_build_info_bundle_and_bypasses_general_recognition() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let metadata_str = serde_json::to_string(&manifest).unwrap();
        let build_info = json!({
            "_format": "hh-sol-build-info-1",
            "input": {
                "sources": {
                    "contracts/A.sol": {"content": content}
                }
            },
            "output": {
                "contracts": {
                    "contracts/A.sol": {
                        "A": {"metadata": metadata_str}
                    }
                }
            }
        });
        let blobs = vec![blob("build-info-1.json", &build_info.to_string())];
        let contracts = check_files(blobs, None).expect("should reconcile from build-info");
        assert_eq!(contracts.len(), 1);
        assert!(contracts[0].is_valid());
    }
}
