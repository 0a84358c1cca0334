//! Chip families for the atlib session engine.
//!
//! A family is pure data: the [`EngineConfig`] describing how a firmware
//! frames and confirms its replies, and the [`EventTable`] of unsolicited
//! lines it emits. Nothing here talks to hardware; the session engine does
//! that. Command encoders and reply decoders for a particular module are
//! left to drivers built on top.
//!
//! | Family                        | Terminator | Sentinels | Confirmations                  |
//! |-------------------------------|------------|-----------|--------------------------------|
//! | [`wifi::WifiModule`]          | CR LF      | `+`       | `OK`, `ERROR`, `FAIL`, `>`, `SEND OK` |
//! | [`ble::BleModule`]            | CR         | `%` `+`   | `AOK`, `ERR`                   |
//! | [`lora::LoraModule`]          | CR LF      | `+`       | `OK`, `AT_*_ERROR`             |
//! | [`cellular::CellularModem`]   | CR LF      | `+`       | `OK`, `ERROR`, `+CME ERROR`, `+CMS ERROR`, `>` |
//!
//! Each family sits behind a feature flag of the same name; all are on by
//! default.

use std::fmt;

use atlib_core::config::EngineConfig;
use atlib_core::error::Result;
use atlib_core::types::Terminators;
use atlib_session::builder::SessionBuilder;
use atlib_session::matcher::EventTable;

#[cfg(feature = "ble")]
pub mod ble;
#[cfg(feature = "cellular")]
pub mod cellular;
#[cfg(feature = "lora")]
pub mod lora;
#[cfg(feature = "wifi")]
pub mod wifi;

/// Static description of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Short identifier used on the command line (e.g. `wifi`).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Baud rate the firmware uses out of reset.
    pub default_baud_rate: u32,
    pub terminators: Terminators,
}

/// A chip family: configuration and event table for one AT dialect.
pub trait Family {
    /// The family's event identifier.
    type Event: Copy + fmt::Debug + Send + Sync + 'static;

    fn info() -> FamilyInfo;

    /// Engine configuration matching the firmware's reply format.
    fn engine_config() -> EngineConfig;

    /// The family's unsolicited-event table.
    fn event_table() -> Result<EventTable<Self::Event>>;

    /// A session builder preloaded with this family's configuration, table
    /// and default baud rate.
    fn session_builder() -> Result<SessionBuilder<Self::Event>> {
        Ok(SessionBuilder::new(Self::event_table()?)
            .config(Self::engine_config())
            .baud_rate(Self::info().default_baud_rate))
    }
}

/// One row of an event table listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    /// Token path, `:`-joined; `*` marks a catch-all.
    pub path: String,
    /// The event identifier, rendered with `Debug`.
    pub event: String,
    /// Lines captured verbatim after the event line.
    pub trailing_lines: usize,
}

/// List a family's event table in match order.
pub fn event_listing<F: Family>() -> Result<Vec<EventEntry>> {
    Ok(F::event_table()?
        .entries()
        .into_iter()
        .map(|(path, event, trailing_lines)| EventEntry {
            path,
            event: format!("{event:?}"),
            trailing_lines,
        })
        .collect())
}

/// Every family compiled into this build.
pub fn all_families() -> Vec<FamilyInfo> {
    let mut families = Vec::new();

    #[cfg(feature = "wifi")]
    families.push(wifi::WifiModule::info());
    #[cfg(feature = "ble")]
    families.push(ble::BleModule::info());
    #[cfg(feature = "lora")]
    families.push(lora::LoraModule::info());
    #[cfg(feature = "cellular")]
    families.push(cellular::CellularModem::info());

    families
}

/// Look a family up by its identifier.
pub fn find_family(id: &str) -> Option<FamilyInfo> {
    all_families()
        .into_iter()
        .find(|f| f.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_ids_are_unique() {
        let families = all_families();
        let mut ids: Vec<&str> = families.iter().map(|f| f.id).collect();
        let count_before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count_before, "duplicate family ids found");
    }

    #[cfg(all(feature = "wifi", feature = "ble", feature = "lora", feature = "cellular"))]
    #[test]
    fn all_default_families_listed() {
        let ids: Vec<&str> = all_families().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["wifi", "ble", "lora", "cellular"]);
    }

    #[cfg(feature = "wifi")]
    #[test]
    fn find_family_ignores_case() {
        assert_eq!(find_family("WiFi").map(|f| f.id), Some("wifi"));
        assert!(find_family("zigbee").is_none());
    }

    #[cfg(feature = "cellular")]
    #[test]
    fn listing_renders_events() {
        let listing = event_listing::<cellular::CellularModem>().unwrap();
        let cmt = listing.iter().find(|e| e.path == "CMT").unwrap();
        assert_eq!(cmt.event, "SmsReceived");
        assert_eq!(cmt.trailing_lines, 1);
    }
}
