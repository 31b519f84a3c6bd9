// panos-core: Device operations, device reservations and router lifecycle
// on top of panos-api.

pub mod config;
pub mod connector;
pub mod driver;
pub mod error;
pub mod reservation;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConnectorSettings, DriverKind, InterfaceAddress};
pub use connector::{ExternalStep, PanoramaConnector, VlanInterface};
pub use driver::{
    CommitTarget, DeviceRouterDriver, GatewayChange, PendingCommit, RouterDriver, RouterInfo,
    RouterInterface,
};
pub use error::CoreError;
pub use reservation::{InMemoryReservationStore, Reservation, ReservationStore};
