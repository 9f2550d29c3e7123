use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the only signature scheme produced by the signing engine
pub const ALGORITHM_RSA_SHA256: &str = "RSA-SHA256";

/// Immutable record of one signing operation.
///
/// Batch signatures cover several documents: `document_hash` is then the combined
/// hash and `constituent_hashes` keeps the member hashes in signing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureRecord {
    pub id: Uuid,
    /// SHA-256, lowercase hex
    pub document_hash: String,
    pub signature_hex: String,
    pub algorithm: String,
    pub certificate_id: Uuid,
    pub certificate_serial: String,
    pub public_key_pem: String,
    pub timestamp: DateTime<Utc>,
    pub constituent_hashes: Option<Vec<String>>,
    pub document_ids: Vec<Uuid>,
    pub signer: Option<String>,
    /// Blob key of the derived signed copy, when one was written
    pub signed_blob_key: Option<String>,
}

impl SignatureRecord {
    pub fn is_batch(&self) -> bool {
        self.constituent_hashes.is_some()
    }

    /// Audit/export representation
    pub fn export(&self) -> SignatureExport {
        SignatureExport {
            document_hash: self.document_hash.clone(),
            signature: self.signature_hex.clone(),
            algorithm: self.algorithm.clone(),
            certificate_serial: self.certificate_serial.clone(),
            public_key_pem: self.public_key_pem.clone(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            constituent_hashes: self.constituent_hashes.clone(),
        }
    }
}

/// Portable form of a signature for audit trails and external verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureExport {
    pub document_hash: String,
    pub signature: String,
    pub algorithm: String,
    pub certificate_serial: String,
    pub public_key_pem: String,
    /// ISO-8601 UTC timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constituent_hashes: Option<Vec<String>>,
}
