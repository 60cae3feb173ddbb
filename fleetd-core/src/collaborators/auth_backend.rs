//! Reference [`Authentication`] backend: tokens are `uid:gid:tier` triples
//! signed by a shared secret. Production deployments are expected to supply
//! their own implementation (munge, PAM, mTLS) behind the same trait.

use super::Authentication;
use crate::dispatch::{AuthTier, Identity};
use crate::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub struct SharedSecretAuth {
    secret: Vec<u8>,
}

impl SharedSecretAuth {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    fn mac(&self, body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(body.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl Authentication for SharedSecretAuth {
    async fn authenticate(&self, token: &[u8]) -> ControllerResult<Identity> {
        let token = std::str::from_utf8(token).map_err(|_| ControllerError::AccessDenied)?;
        let (body, mac) = token.rsplit_once('.').ok_or(ControllerError::AccessDenied)?;
        if self.mac(body) != mac {
            return Err(ControllerError::AccessDenied);
        }

        let mut parts = body.split(':');
        let uid: u32 = parts.next().and_then(|s| s.parse().ok()).ok_or(ControllerError::AccessDenied)?;
        let gid: u32 = parts.next().and_then(|s| s.parse().ok()).ok_or(ControllerError::AccessDenied)?;
        let tier = match parts.next() {
            Some("operator") => AuthTier::Operator,
            Some("super_user") => AuthTier::SuperUser,
            Some("user") | None => AuthTier::User,
            _ => return Err(ControllerError::AccessDenied),
        };

        Ok(Identity { uid, gid, tier, is_node_agent: false })
    }
}
