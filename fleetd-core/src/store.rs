//! Entity Store (C3).
//!
//! In-memory tables guarded by the four [`lock::LockDomain`](crate::lock)
//! axes, plus secondary indices (by user, by partition) kept consistent on
//! every insert/remove the way the teacher's `ReflexCache` keeps its
//! DashMap indices in step with the sled-backed store.

use crate::error::{ControllerError, ControllerResult};
use crate::lock::LockDomain;
use crate::model::{FrontEnd, Job, Node, Partition, Reservation, Step};
use fleetd_config::ControllerConfig;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Snapshot of the live cluster configuration, held under the config lock
/// axis so reconfigure handlers serialize against readers.
#[derive(Debug, Clone)]
pub struct ConfigState {
    pub controller: ControllerConfig,
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<u32, Job>,
    steps: HashMap<(u32, u32), Step>,
    by_user: HashMap<u32, HashSet<u32>>,
}

impl JobTable {
    pub fn insert(&mut self, job: Job) -> ControllerResult<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(ControllerError::DuplicateJobId(job.id));
        }
        self.by_user.entry(job.user_id).or_default().insert(job.id);
        self.jobs.insert(job.id, job);
        Ok(())
    }

    pub fn get(&self, id: u32) -> ControllerResult<&Job> {
        self.jobs.get(&id).ok_or(ControllerError::InvalidJobId(id))
    }

    pub fn get_mut(&mut self, id: u32) -> ControllerResult<&mut Job> {
        self.jobs.get_mut(&id).ok_or(ControllerError::InvalidJobId(id))
    }

    pub fn remove(&mut self, id: u32) -> ControllerResult<Job> {
        let job = self.jobs.remove(&id).ok_or(ControllerError::InvalidJobId(id))?;
        if let Some(set) = self.by_user.get_mut(&job.user_id) {
            set.remove(&id);
        }
        self.steps.retain(|(jid, _), _| *jid != id);
        Ok(job)
    }

    pub fn for_user(&self, user_id: u32) -> impl Iterator<Item = &Job> {
        self.by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.jobs.get(id))
    }

    pub fn is_live(&self, id: u32) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn insert_step(&mut self, step: Step) -> ControllerResult<()> {
        if !self.jobs.contains_key(&step.job_id) {
            return Err(ControllerError::InvalidJobId(step.job_id));
        }
        self.steps.insert((step.job_id, step.step_id), step);
        Ok(())
    }

    pub fn get_step(&self, job_id: u32, step_id: u32) -> Option<&Step> {
        self.steps.get(&(job_id, step_id))
    }

    pub fn get_step_mut(&mut self, job_id: u32, step_id: u32) -> Option<&mut Step> {
        self.steps.get_mut(&(job_id, step_id))
    }

    pub fn steps_for_job(&self, job_id: u32) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |((jid, _), _)| *jid == job_id).map(|(_, s)| s)
    }
}

#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: BTreeMap<String, Node>,
    frontends: HashMap<String, FrontEnd>,
}

impl NodeTable {
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn get(&self, name: &str) -> ControllerResult<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| ControllerError::InvalidNodeName(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> ControllerResult<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| ControllerError::InvalidNodeName(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn insert_frontend(&mut self, fe: FrontEnd) {
        self.frontends.insert(fe.name.clone(), fe);
    }

    pub fn get_frontend(&self, name: &str) -> Option<&FrontEnd> {
        self.frontends.get(name)
    }

    pub fn frontends_mut(&mut self) -> impl Iterator<Item = &mut FrontEnd> {
        self.frontends.values_mut()
    }
}

#[derive(Debug, Default)]
pub struct PartitionTable {
    partitions: HashMap<String, Partition>,
    reservations: HashMap<String, Reservation>,
}

impl PartitionTable {
    pub fn insert(&mut self, partition: Partition) {
        self.partitions.insert(partition.name.clone(), partition);
    }

    pub fn get(&self, name: &str) -> ControllerResult<&Partition> {
        self.partitions
            .get(name)
            .ok_or_else(|| ControllerError::Internal(format!("unknown partition {name}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn insert_reservation(&mut self, reservation: Reservation) -> ControllerResult<()> {
        if self
            .reservations
            .values()
            .any(|existing| existing.conflicts_with(&reservation))
        {
            return Err(ControllerError::ReservationBusy);
        }
        self.reservations.insert(reservation.name.clone(), reservation);
        Ok(())
    }

    pub fn remove_reservation(&mut self, name: &str) -> Option<Reservation> {
        self.reservations.remove(name)
    }

    pub fn get_reservation(&self, name: &str) -> Option<&Reservation> {
        self.reservations.get(name)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }
}

pub type Store = LockDomain<ConfigState, JobTable, NodeTable, PartitionTable>;

pub fn new_store(config: ControllerConfig) -> Store {
    LockDomain::new(
        ConfigState { controller: config },
        JobTable::default(),
        NodeTable::default(),
        PartitionTable::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Job, JobRequest};
    use chrono::Utc;

    fn sample_job(id: u32) -> Job {
        Job::new(
            id,
            1000,
            1000,
            JobRequest {
                min_nodes: 1,
                max_nodes: 1,
                cpus_per_task: 1,
                mem_per_cpu_mb: None,
                mem_per_node_mb: None,
                features: vec![],
                gres: vec![],
                partition: "debug".to_string(),
                reservation: None,
                time_limit_secs: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut table = JobTable::default();
        table.insert(sample_job(1)).unwrap();
        assert!(matches!(
            table.insert(sample_job(1)),
            Err(ControllerError::DuplicateJobId(1))
        ));
    }

    #[test]
    fn remove_clears_user_index_and_steps() {
        let mut table = JobTable::default();
        table.insert(sample_job(1)).unwrap();
        assert_eq!(table.for_user(1000).count(), 1);
        table.remove(1).unwrap();
        assert_eq!(table.for_user(1000).count(), 0);
    }

    #[test]
    fn reservation_conflict_detected_on_insert() {
        let mut table = PartitionTable::default();
        let now = Utc::now();
        let r1 = Reservation {
            name: "r1".to_string(),
            nodes: ["n1".to_string()].into_iter().collect(),
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            users: vec![],
            accounts: vec![],
            flags_maint: false,
            flags_overlap: false,
        };
        let mut r2 = r1.clone();
        r2.name = "r2".to_string();
        table.insert_reservation(r1).unwrap();
        assert!(matches!(
            table.insert_reservation(r2),
            Err(ControllerError::ReservationBusy)
        ));
    }
}
