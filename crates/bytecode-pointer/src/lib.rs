//! Decoding of the metadata pointer embedded in deployed EVM bytecode.
//!
//! The last two bytes of deployed bytecode big-endian-encode the length of a
//! preceding CBOR map. That map carries a content-addressed reference to the
//! contract's metadata (`ipfs`, `bzzr0` or `bzzr1`), plus (usually) the
//! `solc` compiler version, which this decoder ignores.

use blockscout_display_bytes::Bytes as DisplayBytes;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Ipfs,
    Bzzr0,
    Bzzr1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress {
    pub kind: StorageKind,
    pub digest: Vec<u8>,
}

impl std::fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            StorageKind::Ipfs => "ipfs",
            StorageKind::Bzzr0 => "bzzr0",
            StorageKind::Bzzr1 => "bzzr1",
        };
        write!(f, "{kind}:{}", DisplayBytes::from(self.digest.clone()))
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bytecode too short to contain a metadata trailer")]
    TooShort,
    #[error("declared trailer length ({declared}) exceeds available bytecode ({available})")]
    LengthOutOfRange { declared: usize, available: usize },
    #[error("failed to decode CBOR trailer: {0}")]
    Cbor(String),
    #[error("no recognized metadata pointer (ipfs/bzzr0/bzzr1) in trailer")]
    NoMetadataPointer,
}

/// Decodes the [`SourceAddress`] embedded in `deployed_bytecode`'s trailer.
pub fn decode_source_address(deployed_bytecode: &[u8]) -> Result<SourceAddress, DecodeError> {
    if deployed_bytecode.len() < 2 {
        return Err(DecodeError::TooShort);
    }
    let (body, len_bytes) = deployed_bytecode.split_at(deployed_bytecode.len() - 2);
    let trailer_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    if trailer_len > body.len() {
        return Err(DecodeError::LengthOutOfRange {
            declared: trailer_len,
            available: body.len(),
        });
    }
    let cbor = &body[body.len() - trailer_len..];
    decode_cbor_map(cbor)
}

fn decode_cbor_map(cbor: &[u8]) -> Result<SourceAddress, DecodeError> {
    let mut decoder = minicbor::Decoder::new(cbor);
    let number_of_elements = decoder
        .map()
        .map_err(|err| DecodeError::Cbor(err.to_string()))?
        .unwrap_or(u64::MAX);

    let mut found = None;
    for _ in 0..number_of_elements {
        let key = match decoder.str() {
            Ok(key) => key,
            Err(_) => break,
        };
        let kind = match key {
            "ipfs" => Some(StorageKind::Ipfs),
            "bzzr0" => Some(StorageKind::Bzzr0),
            "bzzr1" => Some(StorageKind::Bzzr1),
            _ => None,
        };
        match kind {
            Some(kind) if found.is_none() => {
                let digest = decoder
                    .bytes()
                    .map_err(|err| DecodeError::Cbor(err.to_string()))?;
                found = Some(SourceAddress {
                    kind,
                    digest: digest.to_vec(),
                });
            }
            _ => {
                // Not a storage key we recognize (or already found one):
                // skip the value, whatever its type (commonly `solc`).
                decoder
                    .skip()
                    .map_err(|err| DecodeError::Cbor(err.to_string()))?;
            }
        }
    }

    found.ok_or(DecodeError::NoMetadataPointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hex_to_bytes(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn decodes_ipfs_pointer_with_trailer() {
        // { "ipfs": b'1220bcc988...', "solc": b'00080e' }, known-good vector
        // shared with the solc-version decoder this crate is grounded on.
        let cbor_hex = "a2646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e";
        let cbor = hex_to_bytes(cbor_hex);
        let mut bytecode = vec![0x60, 0x80, 0x60, 0x40]; // dummy runtime code prefix
        bytecode.extend_from_slice(&cbor);
        let len = cbor.len() as u16;
        bytecode.extend_from_slice(&len.to_be_bytes());

        let address = decode_source_address(&bytecode).expect("should decode pointer");
        assert_eq!(address.kind, StorageKind::Ipfs);
        assert_eq!(
            DisplayBytes::from(address.digest).to_string(),
            "0x1220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df53625"
        );
    }

    #[test]
    fn decodes_bzzr0_pointer() {
        let cbor_hex =
            "a165627a7a72305820d4fba422541feba2d648f6657d9354ec14ea9f5919b520abe0feb60981d7b17c";
        let cbor = hex_to_bytes(cbor_hex);
        let mut bytecode = vec![0xfe];
        bytecode.extend_from_slice(&cbor);
        bytecode.extend_from_slice(&(cbor.len() as u16).to_be_bytes());

        let address = decode_source_address(&bytecode).expect("should decode pointer");
        assert_eq!(address.kind, StorageKind::Bzzr0);
    }

    #[test]
    fn rejects_too_short_bytecode() {
        assert!(matches!(
            decode_source_address(&[0x01]),
            Err(DecodeError::TooShort)
        ));
    }

    #[test]
    fn rejects_length_out_of_range() {
        let bytecode = vec![0xff, 0xff]; // declares 65535-byte trailer with 0 bytes available
        assert!(matches!(
            decode_source_address(&bytecode),
            Err(DecodeError::LengthOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_trailer_without_metadata_pointer() {
        // a map with only "solc", no ipfs/bzzr0/bzzr1
        let cbor_hex = "a164736f6c634300080e";
        let cbor = hex_to_bytes(cbor_hex);
        let mut bytecode = vec![0x00];
        bytecode.extend_from_slice(&cbor);
        bytecode.extend_from_slice(&(cbor.len() as u16).to_be_bytes());

        let result = decode_source_address(&bytecode);
        assert!(result.is_err());
    }
}
