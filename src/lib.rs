//! Core runtime of a Zigbee-to-IP gateway.
//!
//! Bridges a local Zigbee mesh onto an IP network: an authoritative,
//! persisted registry of joined end-devices, an in-RAM gateway state
//! store, a schema-versioned key-value persistence layer, a bounded
//! single-flight job queue, a STA-first/AP-fallback Wi-Fi manager, an
//! event-driven Zigbee runtime adapter, and a local HTTP/WebSocket API
//! built on [axum](https://docs.rs/axum/0.7) and the
//! [tokio](https://docs.rs/tokio/1) async runtime.
//!
//! Platform pieces (the Wi-Fi driver, the Zigbee stack, reboot, raw
//! telemetry) are trait ports, so the whole core runs against stubs on a
//! development host and the same wiring runs against vendor glue on the
//! target.
//!
//! # Basic usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use zgw::clock::SteadyClock;
//! use zgw::platform::{StubWifiDriver, StubZigbeeStack};
//! use zgw::runtime::{GatewayPorts, GatewayRuntime};
//! use zgw::service::{NoopReboot, WifiSettings};
//! use zgw::store::KvStore;
//!
//! # fn main() -> Result<(), zgw::error::GatewayError> {
//! let runtime = GatewayRuntime::new(GatewayPorts {
//!     kv: KvStore::in_memory(),
//!     wifi_driver: StubWifiDriver::new(),
//!     zigbee_stack: StubZigbeeStack::new(),
//!     reboot_hook: Arc::new(NoopReboot),
//!     rcp_tool: None,
//!     clock: Arc::new(SteadyClock::new()),
//!     wifi_settings: WifiSettings::default(),
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod platform;
pub mod runtime;
pub mod service;
pub mod store;

pub mod prelude {
    pub use crate::error::{GatewayError, GatewayResult};
    pub use crate::runtime::{GatewayPorts, GatewayRuntime};
    pub use crate::service::{WifiOutcome, WifiSettings, ZigbeeSignal};
}
