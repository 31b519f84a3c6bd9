// In-memory reservation store for single-process deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Reservation, ReservationStore};
use crate::error::CoreError;

#[derive(Debug, Default)]
struct Tables {
    // device_sn -> router_id
    by_device: HashMap<String, String>,
    // router_id -> device_sn
    by_router: HashMap<String, String>,
}

/// [`ReservationStore`] backed by two maps under one lock, so both
/// uniqueness checks and the insert happen atomically.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    tables: RwLock<Tables>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn reserve(&self, router_id: &str, device_sn: &str) -> Result<Reservation, CoreError> {
        let mut tables = self.tables.write().await;

        if let Some(holder) = tables.by_device.get(device_sn) {
            return Err(CoreError::ReservationConflict {
                router_id: holder.clone(),
                device_sn: device_sn.to_owned(),
            });
        }
        if let Some(held) = tables.by_router.get(router_id) {
            return Err(CoreError::ReservationConflict {
                router_id: router_id.to_owned(),
                device_sn: held.clone(),
            });
        }

        tables
            .by_device
            .insert(device_sn.to_owned(), router_id.to_owned());
        tables
            .by_router
            .insert(router_id.to_owned(), device_sn.to_owned());
        debug!(router_id, device_sn, "device reserved");

        Ok(Reservation {
            router_id: router_id.to_owned(),
            device_sn: device_sn.to_owned(),
        })
    }

    async fn release(&self, router_id: &str) -> Result<Reservation, CoreError> {
        let mut tables = self.tables.write().await;
        let device_sn =
            tables
                .by_router
                .remove(router_id)
                .ok_or_else(|| CoreError::ReservationNotFound {
                    router_id: router_id.to_owned(),
                })?;
        tables.by_device.remove(&device_sn);
        debug!(router_id, device_sn = %device_sn, "device released");

        Ok(Reservation {
            router_id: router_id.to_owned(),
            device_sn,
        })
    }

    async fn get(&self, router_id: &str) -> Result<Reservation, CoreError> {
        let tables = self.tables.read().await;
        tables
            .by_router
            .get(router_id)
            .map(|device_sn| Reservation {
                router_id: router_id.to_owned(),
                device_sn: device_sn.clone(),
            })
            .ok_or_else(|| CoreError::ReservationNotFound {
                router_id: router_id.to_owned(),
            })
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, CoreError> {
        let tables = self.tables.read().await;
        let mut all: Vec<Reservation> = tables
            .by_device
            .iter()
            .map(|(device_sn, router_id)| Reservation {
                router_id: router_id.clone(),
                device_sn: device_sn.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.device_sn.cmp(&b.device_sn));
        Ok(all)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_get_release() {
        let store = InMemoryReservationStore::new();
        store.reserve("r1", "S1").await.unwrap();
        assert_eq!(store.get("r1").await.unwrap().device_sn, "S1");

        let released = store.release("r1").await.unwrap();
        assert_eq!(released.device_sn, "S1");
        assert!(matches!(
            store.get("r1").await,
            Err(CoreError::ReservationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn serial_is_exclusive() {
        let store = InMemoryReservationStore::new();
        store.reserve("r1", "S1").await.unwrap();
        let err = store.reserve("r2", "S1").await.unwrap_err();
        assert!(
            matches!(err, CoreError::ReservationConflict { ref router_id, .. } if router_id == "r1")
        );
    }

    #[tokio::test]
    async fn router_holds_one_device() {
        let store = InMemoryReservationStore::new();
        store.reserve("r1", "S1").await.unwrap();
        assert!(store.reserve("r1", "S2").await.is_err());
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_unknown_router() {
        let store = InMemoryReservationStore::new();
        let err = store.release("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn released_device_can_be_reserved_again() {
        let store = InMemoryReservationStore::new();
        store.reserve("r1", "S1").await.unwrap();
        store.release("r1").await.unwrap();
        store.reserve("r2", "S1").await.unwrap();
        assert_eq!(
            store.list_all().await.unwrap(),
            vec![Reservation {
                router_id: "r2".into(),
                device_sn: "S1".into()
            }]
        );
    }
}
