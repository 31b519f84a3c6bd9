// ── Device reservations ──
//
// Exclusive router → device mapping. One row per reservation; the device
// serial is the primary key and a router holds at most one device.
// Check-then-reserve sequences must run under the caller's transaction.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub use memory::InMemoryReservationStore;

/// A device reserved for a router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    pub router_id: String,
    pub device_sn: String,
}

/// Persistence for [`Reservation`] rows.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Reserve `device_sn` for `router_id`.
    ///
    /// Fails with [`CoreError::ReservationConflict`] if the device is
    /// already reserved or the router already holds a device.
    async fn reserve(&self, router_id: &str, device_sn: &str) -> Result<Reservation, CoreError>;

    /// Delete the router's reservation, returning it.
    ///
    /// Fails with [`CoreError::ReservationNotFound`] if there is none.
    async fn release(&self, router_id: &str) -> Result<Reservation, CoreError>;

    /// The router's reservation, or [`CoreError::ReservationNotFound`].
    async fn get(&self, router_id: &str) -> Result<Reservation, CoreError>;

    async fn list_all(&self) -> Result<Vec<Reservation>, CoreError>;
}
