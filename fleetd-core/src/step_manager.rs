//! Job step manager (C7): step creation and credential issuance.

use crate::collaborators::CredentialSigner;
use crate::error::{ControllerError, ControllerResult};
use crate::model::{CredentialClaims, Job, JobState, SignedCredential, Step};
use crate::store::Store;
use crate::time::StepIdAllocator;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sentinel step id stamped on a batch-launch credential, distinct from any
/// id `StepIdAllocator` hands out (which starts at 0).
const BATCH_STEP_ID: u32 = u32::MAX;

pub struct StepManager<S: CredentialSigner> {
    store: Arc<Store>,
    step_ids: Arc<StepIdAllocator>,
    signer: Arc<S>,
    credential_ttl_secs: i64,
}

impl<S: CredentialSigner> StepManager<S> {
    pub fn new(store: Arc<Store>, step_ids: Arc<StepIdAllocator>, signer: Arc<S>, credential_ttl_secs: i64) -> Self {
        Self {
            store,
            step_ids,
            signer,
            credential_ttl_secs,
        }
    }

    /// Create a step against a subset of a running job's granted nodes,
    /// and return the signed credential its launcher hands to each node.
    pub async fn create_step(
        &self,
        job_id: u32,
        node_subset: Vec<String>,
        cores_per_node: u32,
        mem_limit_mb: Option<u64>,
    ) -> ControllerResult<(u32, SignedCredential)> {
        let (uid, gid) = {
            let job_table = self.store.job_read().await;
            let job = job_table.get(job_id)?;
            if job.state != JobState::Running {
                return Err(ControllerError::Disabled("job not running".to_string()));
            }
            if job.is_configuring() {
                return Err(ControllerError::PrologRunning);
            }
            for node in &node_subset {
                if !job.node_bitmap.contains(node) {
                    return Err(ControllerError::InvalidNodeName(node.clone()));
                }
            }
            (job.user_id, job.group_id)
        };

        let step_id = self.step_ids.alloc(job_id);
        let mut core_bitmap_by_node = BTreeMap::new();
        let mut core_bitmap_claims = Vec::new();
        for node in &node_subset {
            let bitmap = vec![true; cores_per_node as usize];
            core_bitmap_by_node.insert(node.clone(), bitmap.clone());
            core_bitmap_claims.push(bitmap);
        }

        let step = Step::new(job_id, step_id, core_bitmap_by_node, crate::time::now());
        {
            let mut job_table = self.store.job_write().await;
            job_table.insert_step(step)?;
            let job = job_table.get_mut(job_id)?;
            job.step_ids.push(step_id);
        }

        let credential = self.issue_credential(job_id, step_id, uid, gid, node_subset, core_bitmap_claims, mem_limit_mb).await?;
        Ok((step_id, credential))
    }

    async fn issue_credential(
        &self,
        job_id: u32,
        step_id: u32,
        uid: u32,
        gid: u32,
        node_list: Vec<String>,
        core_bitmap: Vec<Vec<bool>>,
        mem_limit_mb: Option<u64>,
    ) -> ControllerResult<SignedCredential> {
        let claims = CredentialClaims {
            job_id,
            step_id,
            uid,
            gid,
            node_list,
            core_bitmap,
            mem_limit_mb,
            expiration: crate::time::now() + chrono::Duration::seconds(self.credential_ttl_secs),
        };
        self.signer.sign(claims).await
    }

    /// Mint the credential handed to the batch script launcher at job
    /// dispatch, covering the job's full allocation rather than a step's
    /// subset (spec.md §4.7 `batch_step_credential`).
    pub async fn batch_step_credential(&self, job_id: u32) -> ControllerResult<SignedCredential> {
        let (node_list, uid, gid, cpus_per_task) = {
            let job_table = self.store.job_read().await;
            let job = job_table.get(job_id)?;
            let resources = job
                .job_resources
                .as_ref()
                .ok_or_else(|| ControllerError::Internal(format!("job {job_id} has no granted allocation")))?;
            let node_list: Vec<String> = resources.cpus_by_node.keys().cloned().collect();
            (node_list, job.user_id, job.group_id, job.request.cpus_per_task)
        };

        let core_bitmap: Vec<Vec<bool>> = node_list
            .iter()
            .map(|_| vec![true; cpus_per_task as usize])
            .collect();

        let claims = CredentialClaims {
            job_id,
            step_id: BATCH_STEP_ID,
            uid,
            gid,
            node_list,
            core_bitmap,
            mem_limit_mb: None,
            expiration: crate::time::now() + chrono::Duration::seconds(self.credential_ttl_secs),
        };
        self.signer.sign(claims).await
    }

    /// Re-issue the credential for an sbcast (file broadcast) operation
    /// against an already-running step, with a short, independent TTL.
    pub async fn sbcast_credential(&self, job_id: u32, step_id: u32, ttl_secs: i64) -> ControllerResult<SignedCredential> {
        let (node_list, core_bitmap, uid, gid, mem_limit_mb) = {
            let job_table = self.store.job_read().await;
            let job: &Job = job_table.get(job_id)?;
            let step = job_table
                .get_step(job_id, step_id)
                .ok_or_else(|| ControllerError::Internal(format!("unknown step {job_id}.{step_id}")))?;
            let node_list: Vec<String> = step.core_bitmap_by_node.keys().cloned().collect();
            let core_bitmap: Vec<Vec<bool>> = step.core_bitmap_by_node.values().cloned().collect();
            (node_list, core_bitmap, job.user_id, job.group_id, step.mem_limit_mb)
        };

        let claims = CredentialClaims {
            job_id,
            step_id,
            uid,
            gid,
            node_list,
            core_bitmap,
            mem_limit_mb,
            expiration: crate::time::now() + chrono::Duration::seconds(ttl_secs),
        };
        self.signer.sign(claims).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Ed25519CredentialSigner;
    use crate::model::{JobRequest, Node, NodeState, Partition};
    use crate::store::new_store;

    async fn fixture() -> Arc<Store> {
        let store = Arc::new(new_store(fleetd_config::ControllerConfig::default()));
        {
            let mut nodes = store.node_write().await;
            let mut n = Node::new("n1".to_string(), 4, 4096, 1);
            n.partitions.push("debug".to_string());
            n.state = NodeState::Allocated;
            nodes.insert(n);
        }
        {
            let mut partitions = store.partition_write().await;
            partitions.insert(Partition::new("debug".to_string(), vec!["n1".to_string()]));
        }
        {
            let mut jobs = store.job_write().await;
            let mut job = Job::new(
                1,
                1000,
                1000,
                JobRequest {
                    min_nodes: 1,
                    max_nodes: 1,
                    cpus_per_task: 4,
                    mem_per_cpu_mb: None,
                    mem_per_node_mb: None,
                    features: vec![],
                    gres: vec![],
                    partition: "debug".to_string(),
                    reservation: None,
                    time_limit_secs: None,
                },
                crate::time::now(),
            );
            job.state = JobState::Running;
            job.node_bitmap.insert("n1".to_string());
            jobs.insert(job).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn create_step_issues_credential_bound_to_nodes() {
        let store = fixture().await;
        let signer = Arc::new(Ed25519CredentialSigner::new());
        let manager = StepManager::new(store.clone(), Arc::new(StepIdAllocator::new()), signer.clone(), 3600);

        let (step_id, credential) = manager
            .create_step(1, vec!["n1".to_string()], 2, None)
            .await
            .unwrap();

        assert_eq!(step_id, 0);
        assert!(credential.covers_node("n1"));
        signer.verify(&credential).await.unwrap();
    }

    #[tokio::test]
    async fn batch_step_credential_covers_full_job_allocation() {
        let store = fixture().await;
        {
            let mut jobs = store.job_write().await;
            let job = jobs.get_mut(1).unwrap();
            job.job_resources = Some(crate::model::JobResources {
                cpus_by_node: [("n1".to_string(), 4)].into_iter().collect(),
            });
        }
        let signer = Arc::new(Ed25519CredentialSigner::new());
        let manager = StepManager::new(store, Arc::new(StepIdAllocator::new()), signer.clone(), 3600);

        let credential = manager.batch_step_credential(1).await.unwrap();
        assert!(credential.covers_node("n1"));
        signer.verify(&credential).await.unwrap();
    }

    #[tokio::test]
    async fn step_on_node_outside_job_allocation_rejected() {
        let store = fixture().await;
        let signer = Arc::new(Ed25519CredentialSigner::new());
        let manager = StepManager::new(store, Arc::new(StepIdAllocator::new()), signer, 3600);

        let result = manager.create_step(1, vec!["n2".to_string()], 1, None).await;
        assert!(matches!(result, Err(ControllerError::InvalidNodeName(_))));
    }

    #[tokio::test]
    async fn step_create_rejected_while_prolog_is_still_running() {
        let store = fixture().await;
        {
            let mut jobs = store.job_write().await;
            let job = jobs.get_mut(1).unwrap();
            job.flags.insert(crate::model::JobFlags::CONFIGURING);
        }
        let signer = Arc::new(Ed25519CredentialSigner::new());
        let manager = StepManager::new(store, Arc::new(StepIdAllocator::new()), signer, 3600);

        let result = manager.create_step(1, vec!["n1".to_string()], 1, None).await;
        assert!(matches!(result, Err(ControllerError::PrologRunning)));
    }
}
