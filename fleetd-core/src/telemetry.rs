//! RPC telemetry (C12): two fixed-capacity linear-probe tables — one keyed
//! by message type, one by user id — recording call counts and total
//! latency. Both tables live under a single mutex since they are always
//! updated together on the hot path; a full table drops new keys rather
//! than evicting or growing (spec.md §3 RPC telemetry rule).

use crate::dispatch::MsgType;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcStat {
    pub count: u64,
    pub total_latency_micros: u64,
}

impl RpcStat {
    fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.total_latency_micros += latency.as_micros() as u64;
    }
}

struct LinearProbeTable<K: Copy + Eq> {
    slots: Vec<Option<(K, RpcStat)>>,
    len: usize,
    dropped: u64,
}

impl<K: Copy + Eq> LinearProbeTable<K> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            len: 0,
            dropped: 0,
        }
    }

    fn hash_index(&self, key: K) -> usize
    where
        K: std::hash::Hash,
    {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.slots.len().max(1)
    }

    fn record(&mut self, key: K, latency: Duration)
    where
        K: std::hash::Hash,
    {
        if self.slots.is_empty() {
            return;
        }
        let start = self.hash_index(key);
        for offset in 0..self.slots.len() {
            let idx = (start + offset) % self.slots.len();
            match &mut self.slots[idx] {
                Some((existing_key, stat)) if *existing_key == key => {
                    stat.record(latency);
                    return;
                }
                None => {
                    let mut stat = RpcStat::default();
                    stat.record(latency);
                    self.slots[idx] = Some((key, stat));
                    self.len += 1;
                    return;
                }
                _ => continue, // occupied by a different key, keep probing
            }
        }
        // Table full and key not already present: drop (spec.md rule).
        self.dropped += 1;
    }

    fn dump(&self) -> Vec<(K, RpcStat)> {
        self.slots.iter().flatten().copied().collect()
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
        self.dropped = 0;
    }
}

impl std::hash::Hash for MsgType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u32).hash(state);
    }
}

struct Tables {
    by_type: LinearProbeTable<MsgType>,
    by_user: LinearProbeTable<u32>,
}

pub struct RpcTelemetry {
    tables: Mutex<Tables>,
}

impl RpcTelemetry {
    pub fn new(type_table_capacity: usize, user_table_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables {
                by_type: LinearProbeTable::new(type_table_capacity),
                by_user: LinearProbeTable::new(user_table_capacity),
            }),
        }
    }

    pub fn record(&self, msg_type: MsgType, uid: u32, latency: Duration) {
        let mut tables = self.tables.lock();
        tables.by_type.record(msg_type, latency);
        tables.by_user.record(uid, latency);
    }

    pub fn dump_by_type(&self) -> Vec<(MsgType, RpcStat)> {
        self.tables.lock().by_type.dump()
    }

    pub fn dump_by_user(&self) -> Vec<(u32, RpcStat)> {
        self.tables.lock().by_user.dump()
    }

    pub fn dropped_counts(&self) -> (u64, u64) {
        let tables = self.tables.lock();
        (tables.by_type.dropped, tables.by_user.dropped)
    }

    pub fn reset(&self) {
        let mut tables = self.tables.lock();
        tables.by_type.reset();
        tables.by_user.reset();
    }
}
