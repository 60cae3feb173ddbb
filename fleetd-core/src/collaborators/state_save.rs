//! Durable controller state (C11), grounded on the teacher's sled-backed
//! `StateStore` (`state/store.rs`). Sled's own write-ahead log gives us the
//! same write-then-atomically-publish guarantee the classic shadow-file-
//! plus-rename technique provides for flat files, so a tree per entity
//! family stands in for the rename step.

use super::StateSave;
use crate::error::ControllerResult;
use crate::model::{Job, Node};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;

pub struct SledStateSave {
    db: Db,
}

impl SledStateSave {
    pub fn open<P: AsRef<Path>>(path: P) -> ControllerResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn replace_tree<T: serde::Serialize>(&self, tree_name: &str, items: &[T]) -> ControllerResult<()> {
        let tree = self.db.open_tree(tree_name)?;
        tree.clear()?;
        for (idx, item) in items.iter().enumerate() {
            let key = (idx as u64).to_be_bytes();
            let value = serde_json::to_vec(item)?;
            tree.insert(key, value)?;
        }
        tree.flush()?;
        Ok(())
    }

    fn load_tree<T: serde::de::DeserializeOwned>(&self, tree_name: &str) -> ControllerResult<Vec<T>> {
        let tree = self.db.open_tree(tree_name)?;
        let mut items = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl StateSave for SledStateSave {
    async fn save_jobs(&self, jobs: &[Job]) -> ControllerResult<()> {
        self.replace_tree("jobs", jobs)
    }

    async fn load_jobs(&self) -> ControllerResult<Vec<Job>> {
        self.load_tree("jobs")
    }

    async fn save_nodes(&self, nodes: &[Node]) -> ControllerResult<()> {
        self.replace_tree("nodes", nodes)
    }

    async fn load_nodes(&self) -> ControllerResult<Vec<Node>> {
        self.load_tree("nodes")
    }
}
