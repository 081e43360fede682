use crate::application_port::*;
use crate::domain_model::*;
use argon2::Argon2;
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;

const SECRET_LEN: usize = SECRET_HEX_LEN / 2;
const ARGON2_SALT_LEN: usize = 16;

fn derivation_input(subject: &Subject, nonce: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(subject.as_str().len() + 1 + nonce.len());
    input.extend_from_slice(subject.as_str().as_bytes());
    input.push(0);
    input.extend_from_slice(nonce);
    input
}

/// HMAC-SHA256 keyed with the refresh key.
pub struct HmacSecretDeriver {
    key: Vec<u8>,
}

impl HmacSecretDeriver {
    pub fn try_new(key: Vec<u8>) -> Result<Self, GenerationError> {
        if key.is_empty() {
            return Err(GenerationError::Derivation(
                "refresh key is empty".to_string(),
            ));
        }
        Ok(HmacSecretDeriver { key })
    }
}

#[async_trait::async_trait]
impl SecretDeriver for HmacSecretDeriver {
    async fn derive(&self, subject: &Subject, nonce: &[u8]) -> Result<String, GenerationError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| GenerationError::Derivation(e.to_string()))?;
        mac.update(&derivation_input(subject, nonce));
        let out = mac.finalize().into_bytes();
        Ok(hex::encode(out))
    }
}

/// Deliberately slow Argon2id derivation, salted from the nonce. Runs on the
/// blocking pool.
#[derive(Debug, Default)]
pub struct Argon2SecretDeriver;

#[async_trait::async_trait]
impl SecretDeriver for Argon2SecretDeriver {
    async fn derive(&self, subject: &Subject, nonce: &[u8]) -> Result<String, GenerationError> {
        if nonce.len() < ARGON2_SALT_LEN {
            return Err(GenerationError::Derivation(format!(
                "nonce shorter than {ARGON2_SALT_LEN} bytes"
            )));
        }
        let input = derivation_input(subject, nonce);
        let salt = nonce[..ARGON2_SALT_LEN].to_vec();

        let out = tokio::task::spawn_blocking(move || {
            let mut out = [0u8; SECRET_LEN];
            Argon2::default()
                .hash_password_into(&input, &salt, &mut out)
                .map(|_| out)
        })
        .await
        .map_err(|e| GenerationError::Derivation(e.to_string()))?
        .map_err(|e| GenerationError::Derivation(e.to_string()))?;

        Ok(hex::encode(out))
    }
}
