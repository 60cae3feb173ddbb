//! Ed25519-backed job step credential signer (C7).

use super::CredentialSigner;
use crate::error::{ControllerError, ControllerResult};
use crate::model::{CredentialClaims, SignedCredential};
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;

struct KeyRing {
    current_id: u32,
    current: SigningKey,
    /// Previously active keys, kept until every credential they signed has
    /// expired, so verification still succeeds after a rotation.
    retired: Vec<(u32, VerifyingKey)>,
}

pub struct Ed25519CredentialSigner {
    keys: RwLock<KeyRing>,
}

impl Ed25519CredentialSigner {
    pub fn new() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            keys: RwLock::new(KeyRing {
                current_id: 1,
                current: signing_key,
                retired: Vec::new(),
            }),
        }
    }

    fn message_bytes(claims: &CredentialClaims) -> ControllerResult<Vec<u8>> {
        bincode::serialize(claims)
            .map_err(|e| ControllerError::Internal(format!("credential encode error: {e}")))
    }
}

impl Default for Ed25519CredentialSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSigner for Ed25519CredentialSigner {
    async fn sign(&self, claims: CredentialClaims) -> ControllerResult<SignedCredential> {
        let message = Self::message_bytes(&claims)?;
        let keys = self.keys.read();
        let signature: Signature = keys.current.sign(&message);
        Ok(SignedCredential {
            claims,
            signature: signature.to_bytes().to_vec(),
            signer_key_id: keys.current_id,
        })
    }

    async fn verify(&self, credential: &SignedCredential) -> ControllerResult<()> {
        let message = Self::message_bytes(&credential.claims)?;
        let signature = Signature::from_slice(&credential.signature)
            .map_err(|_| ControllerError::CredentialInvalid)?;

        let keys = self.keys.read();
        let verifying_key = if credential.signer_key_id == keys.current_id {
            keys.current.verifying_key()
        } else {
            keys.retired
                .iter()
                .find(|(id, _)| *id == credential.signer_key_id)
                .map(|(_, key)| *key)
                .ok_or(ControllerError::CredentialInvalid)?
        };

        verifying_key
            .verify(&message, &signature)
            .map_err(|_| ControllerError::CredentialInvalid)
    }

    async fn rotate_key(&self) -> ControllerResult<()> {
        let mut keys = self.keys.write();
        let retired_id = keys.current_id;
        let retired_verifying = keys.current.verifying_key();
        keys.retired.push((retired_id, retired_verifying));
        keys.current = SigningKey::generate(&mut OsRng);
        keys.current_id = retired_id + 1;
        tracing::info!(new_key_id = keys.current_id, "credential signing key rotated");
        Ok(())
    }
}
