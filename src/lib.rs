//! Rust library for controlling Yeelight smart bulbs over the local network
//!
//! Bulbs are controlled through their LAN control protocol: newline-delimited
//! JSON-RPC over a persistent TCP connection, with no cloud dependency. The
//! library supports:
//!
//! - Discovery via multicast search
//! - A persistent, self-reconnecting control session per bulb
//! - Power, brightness, hue/saturation and color temperature control
//! - A canonical, unit-normalized bulb state kept current from replies and
//!   property pushes
//! - Transparent recovery when a bulb rejects a command because it is off
//! - Real-time state event subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use yeelight_lan::{discover, Bulb, DISCOVERY_WINDOW};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let found = discover(DISCOVERY_WINDOW).await?;
//!
//!     if let Some(discovered) = found.values().next() {
//!         let bulb = Bulb::new(discovered.endpoint());
//!         bulb.initialize().await?;
//!
//!         // Commands return immediately with the state updated optimistically
//!         bulb.on();
//!         bulb.set_level(60, Some(1.0));
//!
//!         let mut events = bulb.subscribe();
//!         if let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: multicast search on `239.255.255.250:1982`
//! - **Manager**: inventory of sessions with bulk operations
//! - **Bulb**: connection lifecycle, inbound dispatch and the capability commands
//! - **Correlator**: request ids and the pending-request table
//! - **Recovery**: power-on compensation for commands rejected while off
//! - **Projection**: device property values to canonical state
//! - **Connection**: low-level TCP line I/O
//! - **Protocol**: JSON message structures

mod bulb;
mod commands;
mod connection;
mod correlator;
mod discovery;
mod error;
mod manager;
mod projection;
mod protocol;
mod recovery;
mod subscription;
mod types;

// Public exports
pub use bulb::{Bulb, RECONNECT_DELAY};
pub use commands::{resolve_transition, ColorRequest};
pub use correlator::STALE_AFTER;
pub use discovery::{discover, DiscoveredBulb, DISCOVERY_WINDOW};
pub use error::{BulbError, Result};
pub use manager::{BulbManager, ManagedBulb};
pub use projection::{project, rgb_to_hue_saturation};
pub use protocol::{Method, DEVICE_OFF_CODE};
pub use recovery::RetryGuard;
pub use subscription::{BulbEvent, StateReceiver};
pub use types::{
    hue_name, kelvin_name, BulbState, Change, ColorMode, Connectivity, DeviceId, Endpoint,
    LinkState, Switch, UpdateSource, DEFAULT_PORT, MAX_KELVIN, MIN_KELVIN,
};
