//! Job step credential: the signed token a node uses to verify that a launch
//! request for a given job/step is authentic (C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields bound into the signature. Anything not listed here is not
/// authenticated and must not be trusted by a node verifying the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub job_id: u32,
    pub step_id: u32,
    pub uid: u32,
    pub gid: u32,
    pub node_list: Vec<String>,
    /// Per-node core bitmap, same order as `node_list`.
    pub core_bitmap: Vec<Vec<bool>>,
    pub mem_limit_mb: Option<u64>,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCredential {
    pub claims: CredentialClaims,
    pub signature: Vec<u8>,
    pub signer_key_id: u32,
}

impl SignedCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.claims.expiration
    }

    pub fn covers_node(&self, node: &str) -> bool {
        self.claims.node_list.iter().any(|n| n == node)
    }
}
