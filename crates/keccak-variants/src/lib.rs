//! keccak256 hashing plus enumeration of line-ending variations.
//!
//! Source text travels through tooling that silently rewrites line endings or
//! strips trailing newlines. To reconstruct the hash the Solidity compiler
//! metadata declares for the *original* tree, every plausible rewrite has to
//! be tried and hashed in turn.

use blockscout_display_bytes::Bytes as DisplayBytes;
use sha3::{Digest, Keccak256};

/// keccak256 of `text`, returned as the raw 32-byte digest.
pub fn keccak256(text: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(text.as_bytes()));
    out
}

/// keccak256 of `text`, formatted as `0x`-prefixed lowercase hex.
pub fn keccak256_hex(text: &str) -> String {
    DisplayBytes::from(keccak256(text).to_vec()).to_string()
}

/// The Cartesian product of content variators and ending variators, in the
/// order the kernel contract requires: 3 content variants x 6 ending
/// variants = 18 entries. Duplicates are not suppressed.
pub fn variations(text: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(18);
    for content in content_variants(text) {
        for ending in ending_variants(&content) {
            out.push(ending);
        }
    }
    out
}

fn content_variants(text: &str) -> [String; 3] {
    [text.to_string(), lf_to_crlf(text), crlf_to_lf(text)]
}

fn ending_variants(text: &str) -> [String; 6] {
    let trimmed = right_trim(text);
    [
        text.to_string(),
        trimmed.clone(),
        format!("{trimmed}\n"),
        format!("{trimmed}\r\n"),
        format!("{text}\n"),
        format!("{text}\r\n"),
    ]
}

/// Replaces every `\n` (optionally preceded by `\r`) with `\r\n`.
fn lf_to_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' && chars.peek() == Some(&'\n') {
            chars.next();
            out.push_str("\r\n");
        } else if c == '\n' {
            out.push_str("\r\n");
        } else {
            out.push(c);
        }
    }
    out
}

/// Replaces every `\r\n` with `\n`.
fn crlf_to_lf(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Trims trailing whitespace (spaces, tabs, `\r`, `\n`) from the end.
fn right_trim(text: &str) -> String {
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keccak256_matches_known_vector() {
        // keccak256("") = c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
        assert_eq!(
            keccak256_hex(""),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn variations_has_18_entries() {
        assert_eq!(variations("a\n").len(), 18);
    }

    #[test]
    fn variations_contains_crlf_rewrite() {
        let vars = variations("a\n");
        assert!(vars.contains(&"a\r\n".to_string()));
    }

    #[test]
    fn variations_contains_trimmed_and_lf_rewrite() {
        let vars = variations("a\n\n  \n");
        assert!(vars.contains(&"a".to_string()));
        assert!(vars.contains(&"a\n".to_string()));
    }

    #[test]
    fn lf_to_crlf_does_not_double_existing_crlf() {
        assert_eq!(lf_to_crlf("a\r\nb\n"), "a\r\nb\r\n");
    }

    #[test]
    fn reconciliation_style_example_from_spec() {
        // manifest declares digest of "a\n"; provided file contains "a\r\n"
        let declared_digest = keccak256_hex("a\n");
        let provided = "a\r\n";
        let matches = variations(provided)
            .iter()
            .any(|v| keccak256_hex(v) == declared_digest);
        assert!(matches, "CRLF->LF variator should reconcile the hash");
    }
}
