// Sealed private key storage
// Private keys only exist in plaintext inside KeyVault::with_private_key

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{FirmaError, FirmaResult};

const NONCE_SIZE: usize = 12;
const MASTER_KEY_SIZE: usize = 32;

/// Default PBKDF2 rounds used to derive the master key from the configured secret
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Private key material encrypted under the vault master key.
///
/// Holds a PKCS#8 DER document encrypted with ChaCha20-Poly1305.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedPrivateKey {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl SealedPrivateKey {
    /// Placeholder for records that never carry key material
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

impl fmt::Debug for SealedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedPrivateKey")
            .field("ciphertext", &"<redacted>")
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; MASTER_KEY_SIZE]);

/// Encrypts and decrypts private keys with a master key derived at start-up
pub struct KeyVault {
    master_key: MasterKey,
}

impl KeyVault {
    /// Derive the master key from a secret with PBKDF2-HMAC-SHA256
    pub fn from_secret(secret: &str, salt: &[u8], iterations: u32) -> FirmaResult<Self> {
        if secret.is_empty() {
            return Err(FirmaError::Validation(
                "key encryption secret must not be empty".to_string(),
            ));
        }

        let mut key = [0u8; MASTER_KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut key);
        let vault = Self {
            master_key: MasterKey(key),
        };
        key.zeroize();
        Ok(vault)
    }

    /// Seal a freshly generated or imported private key
    pub fn seal(&self, private_key: &RsaPrivateKey) -> FirmaResult<SealedPrivateKey> {
        let der = private_key
            .to_pkcs8_der()
            .map_err(|e| FirmaError::Crypto(format!("Failed to encode private key: {}", e)))?;
        self.seal_pkcs8_der(der.as_bytes())
    }

    pub fn seal_pkcs8_der(&self, der: &[u8]) -> FirmaResult<SealedPrivateKey> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), der)
            .map_err(|_| FirmaError::Crypto("Failed to seal private key".to_string()))?;

        Ok(SealedPrivateKey {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt a sealed key, run `f` with it and drop the plaintext before returning.
    ///
    /// The decrypted DER buffer and the parsed key are zeroized on every exit path,
    /// including when `f` returns an error.
    pub fn with_private_key<T>(
        &self,
        sealed: &SealedPrivateKey,
        f: impl FnOnce(&RsaPrivateKey) -> FirmaResult<T>,
    ) -> FirmaResult<T> {
        if sealed.is_empty() || sealed.nonce.len() != NONCE_SIZE {
            return Err(FirmaError::Crypto(
                "Certificate has no usable private key".to_string(),
            ));
        }

        let der = Zeroizing::new(
            self.cipher()
                .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
                .map_err(|_| FirmaError::Crypto("Failed to unseal private key".to_string()))?,
        );

        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| FirmaError::Crypto(format!("Invalid sealed private key: {}", e)))?;
        debug!("Private key unsealed for scoped use");

        // RsaPrivateKey zeroizes its limbs on drop
        f(&private_key)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.master_key.0))
    }
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyVault { .. }")
    }
}

/// Generate an RSA key pair of the given modulus size
pub fn generate_rsa_key(bits: usize) -> FirmaResult<RsaPrivateKey> {
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| FirmaError::Crypto(format!("Failed to generate RSA key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use std::sync::OnceLock;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| generate_rsa_key(2048).unwrap())
    }

    fn vault(secret: &str) -> KeyVault {
        KeyVault::from_secret(secret, b"test-salt", 1_000).unwrap()
    }

    #[test]
    fn test_seal_and_unseal() {
        let vault = vault("secret");
        let sealed = vault.seal(test_key()).unwrap();

        let modulus = vault
            .with_private_key(&sealed, |key| Ok(key.n().clone()))
            .unwrap();
        assert_eq!(&modulus, test_key().n());
    }

    #[test]
    fn test_wrong_secret_cannot_unseal() {
        let sealed = vault("secret").seal(test_key()).unwrap();
        let result = vault("other").with_private_key(&sealed, |_| Ok(()));
        assert!(matches!(result, Err(FirmaError::Crypto(_))));
    }

    #[test]
    fn test_error_inside_scope_is_propagated() {
        let vault = vault("secret");
        let sealed = vault.seal(test_key()).unwrap();
        let result: FirmaResult<()> =
            vault.with_private_key(&sealed, |_| Err(FirmaError::Crypto("boom".to_string())));
        assert!(matches!(result, Err(FirmaError::Crypto(msg)) if msg == "boom"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(KeyVault::from_secret("", b"salt", 1).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let sealed = vault("secret").seal(test_key()).unwrap();
        let rendered = format!("{:?}", sealed);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(&sealed.ciphertext[..8])));
    }

    #[test]
    fn test_empty_sealed_key_is_unusable() {
        let result = vault("secret").with_private_key(&SealedPrivateKey::empty(), |_| Ok(()));
        assert!(result.is_err());
    }
}
