//! Reservation manager (C10): create/update/delete/list over node-time
//! rectangles, enforcing the overlap rule from [`Reservation::conflicts_with`].

use crate::error::{ControllerError, ControllerResult};
use crate::model::Reservation;
use crate::store::Store;
use std::sync::Arc;

pub struct ReservationManager {
    store: Arc<Store>,
}

impl ReservationManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, reservation: Reservation) -> ControllerResult<()> {
        reservation.validate_window(crate::time::now())?;

        let node_table = self.store.node_read().await;
        for name in &reservation.nodes {
            node_table.get(name)?;
        }
        drop(node_table);

        let mut partition_table = self.store.partition_write().await;
        partition_table.insert_reservation(reservation)
    }

    pub async fn delete(&self, name: &str) -> ControllerResult<()> {
        let mut partition_table = self.store.partition_write().await;
        partition_table
            .remove_reservation(name)
            .map(|_| ())
            .ok_or_else(|| ControllerError::Internal(format!("unknown reservation {name}")))
    }

    /// Replace a reservation in place: removed then re-inserted so the
    /// conflict check runs against every *other* live reservation.
    pub async fn update(&self, updated: Reservation) -> ControllerResult<()> {
        updated.validate_window(crate::time::now())?;

        let mut partition_table = self.store.partition_write().await;
        let previous = partition_table.remove_reservation(&updated.name);
        match partition_table.insert_reservation(updated) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(previous) = previous {
                    let _ = partition_table.insert_reservation(previous);
                }
                Err(e)
            }
        }
    }

    pub async fn list(&self) -> Vec<Reservation> {
        let partition_table = self.store.partition_read().await;
        partition_table.reservations().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Reservation> {
        let partition_table = self.store.partition_read().await;
        partition_table.get_reservation(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::store::new_store;
    use chrono::{Duration, Utc};

    fn reservation(name: &str, nodes: &[&str]) -> Reservation {
        let now = Utc::now();
        Reservation {
            name: name.to_string(),
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            start_time: now,
            end_time: now + Duration::hours(1),
            users: vec![],
            accounts: vec![],
            flags_maint: false,
            flags_overlap: false,
        }
    }

    async fn fixture() -> Arc<Store> {
        let store = Arc::new(new_store(fleetd_config::ControllerConfig::default()));
        let mut nodes = store.node_write().await;
        nodes.insert(Node::new("n1".to_string(), 4, 4096, 1));
        drop(nodes);
        store
    }

    #[tokio::test]
    async fn create_rejects_unknown_node() {
        let store = fixture().await;
        let manager = ReservationManager::new(store);
        let result = manager.create(reservation("r1", &["ghost"])).await;
        assert!(matches!(result, Err(ControllerError::InvalidNodeName(_))));
    }

    #[tokio::test]
    async fn update_restores_previous_on_conflict() {
        let store = fixture().await;
        let manager = ReservationManager::new(store.clone());
        manager.create(reservation("r1", &["n1"])).await.unwrap();
        manager.create(reservation("r2", &[])).await.unwrap();

        let mut conflicting = reservation("r2", &["n1"]);
        conflicting.name = "r2".to_string();
        // r2 updated to also hold n1 while r1 already holds it in the same window.
        let result = manager.update(conflicting).await;
        assert!(result.is_err());

        let still_there = manager.get("r2").await;
        assert!(still_there.is_some());
    }

    #[tokio::test]
    async fn delete_removes_reservation() {
        let store = fixture().await;
        let manager = ReservationManager::new(store);
        manager.create(reservation("r1", &["n1"])).await.unwrap();
        manager.delete("r1").await.unwrap();
        assert!(manager.get("r1").await.is_none());
    }

    #[tokio::test]
    async fn create_rejects_reservation_entirely_in_the_past() {
        let store = fixture().await;
        let manager = ReservationManager::new(store);
        let mut r = reservation("r1", &["n1"]);
        r.start_time = Utc::now() - Duration::hours(2);
        r.end_time = Utc::now() - Duration::hours(1);
        let result = manager.create(r).await;
        assert!(matches!(result, Err(ControllerError::InvalidReservationWindow(_))));
    }

    #[tokio::test]
    async fn create_allows_past_reservation_with_maint_flag() {
        let store = fixture().await;
        let manager = ReservationManager::new(store);
        let mut r = reservation("r1", &["n1"]);
        r.start_time = Utc::now() - Duration::hours(2);
        r.end_time = Utc::now() - Duration::hours(1);
        r.flags_maint = true;
        manager.create(r).await.unwrap();
        assert!(manager.get("r1").await.is_some());
    }
}
