// Document hashing
// SHA-256 over raw bytes; batch hashes combine member digests in signing order

use sha2::{Digest, Sha256};

use crate::error::{FirmaError, FirmaResult};

pub type DocumentDigest = [u8; 32];

pub fn sha256(bytes: &[u8]) -> DocumentDigest {
    Sha256::digest(bytes).into()
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

pub fn decode_digest(value: &str) -> FirmaResult<DocumentDigest> {
    let bytes = hex::decode(value)
        .map_err(|_| FirmaError::Validation(format!("'{}' is not a hex digest", value)))?;
    bytes
        .try_into()
        .map_err(|_| FirmaError::Validation(format!("'{}' is not a SHA-256 digest", value)))
}

/// SHA-256 over the concatenated member digests; reordering the members changes the result
pub fn combined_hash(digests: &[DocumentDigest]) -> DocumentDigest {
    let mut hasher = Sha256::new();
    for digest in digests {
        hasher.update(digest);
    }
    hasher.finalize().into()
}

pub fn combined_hash_hex(hashes: &[String]) -> FirmaResult<String> {
    let digests = hashes
        .iter()
        .map(|h| decode_digest(h))
        .collect::<FirmaResult<Vec<_>>>()?;
    Ok(hex::encode(combined_hash(&digests)))
}
