// PKCS#12 certificate import
// Opens a passphrase-protected container, reads the X.509 fields and seals the key

use chrono::{DateTime, Utc};
use p12::PFX;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use tracing::debug;
use x509_cert::Certificate as X509Certificate;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, EncodePem};
use x509_cert::name::Name;
use x509_cert::time::Time;
use zeroize::Zeroizing;

use super::keys::{KeyVault, SealedPrivateKey};
use crate::error::{FirmaError, FirmaResult};
use crate::models::SubjectIdentity;

/// Certificate fields and sealed key extracted from a container
#[derive(Debug, Clone)]
pub struct ImportedMaterial {
    pub serial_number: String,
    pub issuer_dn: String,
    pub subject_dn: String,
    pub subject: SubjectIdentity,
    pub public_key_pem: String,
    pub certificate_pem: String,
    pub sealed_private_key: SealedPrivateKey,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

fn invalid(reason: impl Into<String>) -> FirmaError {
    FirmaError::Validation(format!("invalid PKCS#12 container: {}", reason.into()))
}

/// Extract the first key and certificate of a PKCS#12 container
pub fn extract_pkcs12(
    der: &[u8],
    passphrase: &str,
    vault: &KeyVault,
) -> FirmaResult<ImportedMaterial> {
    let pfx = PFX::parse(der).map_err(|e| invalid(format!("{:?}", e)))?;
    if !pfx.verify_mac(passphrase) {
        return Err(FirmaError::Validation(
            "PKCS#12 passphrase is incorrect".to_string(),
        ));
    }

    let key_der = Zeroizing::new(
        pfx.key_bags(passphrase)
            .map_err(|e| invalid(format!("{:?}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| invalid("no private key"))?,
    );
    let cert_der = pfx
        .cert_x509_bags(passphrase)
        .map_err(|e| invalid(format!("{:?}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| invalid("no certificate"))?;

    let private_key =
        RsaPrivateKey::from_pkcs8_der(&key_der).map_err(|_| invalid("unsupported private key"))?;
    let certificate =
        X509Certificate::from_der(&cert_der).map_err(|e| invalid(format!("{}", e)))?;
    let tbs = &certificate.tbs_certificate;

    let public_key = private_key.to_public_key();
    let public_key_der = public_key
        .to_pkcs1_der()
        .map_err(|e| FirmaError::Crypto(format!("Failed to encode public key: {}", e)))?;
    if tbs.subject_public_key_info.subject_public_key.raw_bytes() != public_key_der.as_bytes() {
        return Err(invalid("private key does not match the certificate"));
    }
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| FirmaError::Crypto(format!("Failed to encode public key: {}", e)))?;

    let certificate_pem = certificate
        .to_pem(LineEnding::LF)
        .map_err(|e| FirmaError::Crypto(format!("Failed to encode certificate: {}", e)))?;
    let material = ImportedMaterial {
        serial_number: hex::encode_upper(tbs.serial_number.as_bytes()),
        subject: subject_from_name(&tbs.subject),
        subject_dn: tbs.subject.to_string(),
        issuer_dn: tbs.issuer.to_string(),
        public_key_pem,
        certificate_pem,
        sealed_private_key: vault.seal_pkcs8_der(&key_der)?,
        not_before: to_datetime(&tbs.validity.not_before)?,
        not_after: to_datetime(&tbs.validity.not_after)?,
    };
    debug!(
        "Opened PKCS#12 container for '{}' (serial {})",
        material.subject_dn, material.serial_number
    );
    Ok(material)
}

fn to_datetime(time: &Time) -> FirmaResult<DateTime<Utc>> {
    let since_epoch = time.to_unix_duration();
    DateTime::<Utc>::from_timestamp(since_epoch.as_secs() as i64, 0)
        .ok_or_else(|| invalid("validity date out of range"))
}

/// Read the subject attributes by OID; values may contain escaped separators
fn subject_from_name(name: &Name) -> SubjectIdentity {
    let mut subject = SubjectIdentity::new(String::new());
    for atv in name.0.iter().flat_map(|rdn| rdn.0.iter()) {
        // UTF8String, PrintableString and IA5String carry their text as-is
        let Ok(value) = std::str::from_utf8(atv.value.value()) else {
            continue;
        };
        let value = value.to_string();
        if atv.oid == OID_CN {
            subject.common_name = value;
        } else if atv.oid == OID_O {
            subject.organization = Some(value);
        } else if atv.oid == OID_C {
            subject.country = Some(value);
        } else if atv.oid == OID_SERIAL_NUMBER {
            subject.identifier = Some(value);
        } else if atv.oid == OID_EMAIL {
            subject.email = Some(value);
        }
    }
    subject
}
