//! # atlib -- AT-command sessions for serial-attached radio modules
//!
//! `atlib` is an asynchronous Rust library for talking to Wi-Fi, BLE,
//! LoRaWAN and cellular modules that speak a textual AT-command protocol
//! over a UART. It handles the part every driver for such a module has to
//! get right: splitting the byte stream into lines, telling a command's
//! confirmation apart from its reply body and from unsolicited events, and
//! delivering those events to the application.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! atlib = { version = "0.1", features = ["wifi"] }
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ```no_run
//! use atlib::ConfirmationStatus;
//! use atlib::families::Family;
//! use atlib::wifi::{WifiEvent, WifiModule};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = WifiModule::session_builder()?
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     session.register_event_callback(|event, args| {
//!         if event == WifiEvent::GotIp {
//!             println!("got an address {args}");
//!         }
//!     });
//!
//!     let version = session.request("AT+GMR\r\n", ConfirmationStatus::Success).await?;
//!     println!("{version}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                              |
//! |-----------------------|------------------------------------------------------|
//! | `atlib-core`          | Errors, configuration, status types, [`Transport`]   |
//! | `atlib-session`       | Line framer, classifier, event matcher, [`Session`]  |
//! | `atlib-transport`     | [`SerialTransport`] over `tokio-serial`              |
//! | `atlib-families`      | Per-firmware configuration and event tables          |
//! | **`atlib`**           | This facade crate -- re-exports everything           |
//!
//! ## Feature Flags
//!
//! | Feature    | Enables                              | Default |
//! |------------|--------------------------------------|---------|
//! | `wifi`     | [`wifi`] module (ESP-AT style)       | yes     |
//! | `ble`      | [`ble`] module (single-CR framing)   | yes     |
//! | `lora`     | [`lora`] module (`+EVT:` events)     | yes     |
//! | `cellular` | [`cellular`] module (3GPP 27.007)    | yes     |
//! | `full`     | All families                         | no      |
//!
//! Custom firmware needs no feature: build an [`EventTable`] and an
//! [`EngineConfig`] by hand and pass them to [`SessionBuilder`].

pub use atlib_core::*;
pub use atlib_session::{
    command_name, CoreOutput, EventCallback, EventMatch, EventTable, EventTableBuilder,
    LevelBuilder, Session, SessionBuilder, SessionCore, SessionStats,
};
pub use atlib_transport::{available_ports, SerialConfig, SerialTransport};

/// The session engine's building blocks, for drivers that need more than
/// the [`Session`] handle.
pub mod session {
    pub use atlib_session::*;
}

/// The family trait and table listings.
pub mod families {
    pub use atlib_families::{all_families, event_listing, find_family, EventEntry, Family, FamilyInfo};
}

/// ESP-AT style Wi-Fi modules.
#[cfg(feature = "wifi")]
pub mod wifi {
    pub use atlib_families::wifi::*;
}

/// BLE modules with single-CR framing and `%` status lines.
#[cfg(feature = "ble")]
pub mod ble {
    pub use atlib_families::ble::*;
}

/// LoRaWAN modems reporting network activity as `+EVT:` lines.
#[cfg(feature = "lora")]
pub mod lora {
    pub use atlib_families::lora::*;
}

/// 3GPP cellular modems.
#[cfg(feature = "cellular")]
pub mod cellular {
    pub use atlib_families::cellular::*;
}

/// Every chip family compiled into this build.
///
/// Only families whose feature flag is enabled are listed.
///
/// # Example
///
/// ```
/// for family in atlib::supported_families() {
///     println!("{:<10} {}", family.id, family.name);
/// }
/// ```
pub fn supported_families() -> Vec<families::FamilyInfo> {
    atlib_families::all_families()
}
