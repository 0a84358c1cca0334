//! Wi-Fi modules running ESP-AT style firmware.
//!
//! Replies end in CR LF. Data transmission (`AT+CIPSEND`) is a two-step
//! exchange: the module answers the command with `OK` followed by a bare
//! `>` prompt, the payload is written raw, and the module closes the
//! exchange with `SEND OK` or `SEND FAIL`. `AT+CWJAP` reports a failed join as `FAIL`
//! after a `+CWJAP:<code>` body line.
//!
//! Station and link state changes arrive without a sentinel
//! (`WIFI CONNECTED`, `WIFI GOT IP`); socket data and soft-AP client
//! changes are `+` lines.

use atlib_core::config::{EngineConfig, FramingConfig, Timeouts, Vocabulary};
use atlib_core::error::Result;
use atlib_core::types::{ConfirmationStatus, Terminators};
use atlib_session::matcher::EventTable;
use std::time::Duration;

use crate::{Family, FamilyInfo};

/// Unsolicited events of the Wi-Fi family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WifiEvent {
    /// Firmware finished booting (`ready`).
    Ready,
    /// Associated with an access point.
    WifiConnected,
    /// DHCP lease obtained.
    GotIp,
    WifiDisconnected,
    /// A command arrived while the previous one was still executing.
    BusyProcessing,
    /// Socket data: `+IPD,<len>:<data>` or `+IPD,<link>,<len>:<data>`.
    Received,
    /// A station joined the soft AP.
    StationConnected,
    StationDisconnected,
    /// The soft AP assigned an address to a station.
    StationIp,
    /// Detailed link report when connection notices are enabled.
    LinkConnected,
    LinkClosed,
    /// Result of a scan started with `AT+CWLAP` after the command completed.
    ScanResult,
}

/// Family marker for ESP-AT style Wi-Fi modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct WifiModule;

impl Family for WifiModule {
    type Event = WifiEvent;

    fn info() -> FamilyInfo {
        FamilyInfo {
            id: "wifi",
            name: "Wi-Fi module (ESP-AT style)",
            default_baud_rate: 115_200,
            terminators: Terminators::CRLF,
        }
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            framing: FramingConfig {
                terminators: Terminators::CRLF,
                // Scan results can be long.
                max_line_len: 512,
                prompt_byte: Some(b'>'),
            },
            vocabulary: Vocabulary {
                success: "OK".into(),
                failures: vec!["ERROR".into(), "FAIL".into()],
                extra_confirmations: vec![
                    (">".into(), ConfirmationStatus::ReadyForData),
                    ("SEND OK".into(), ConfirmationStatus::Success),
                    ("SEND FAIL".into(), ConfirmationStatus::Failure),
                ],
                reply_capacity: 4096,
                ..Vocabulary::default()
            },
            timeouts: Timeouts {
                short: Duration::from_millis(500),
                standard: Duration::from_secs(2),
                // Joining an access point routinely takes 5-15 s.
                long: Duration::from_secs(20),
            },
            ..EngineConfig::default()
        }
    }

    fn event_table() -> Result<EventTable<WifiEvent>> {
        EventTable::builder()
            .event("IPD", WifiEvent::Received)
            .event("STA_CONNECTED", WifiEvent::StationConnected)
            .event("STA_DISCONNECTED", WifiEvent::StationDisconnected)
            .event("DIST_STA_IP", WifiEvent::StationIp)
            .event("LINK_CONN", WifiEvent::LinkConnected)
            .event("CWLAP", WifiEvent::ScanResult)
            .bare("ready", WifiEvent::Ready)
            .bare("WIFI CONNECTED", WifiEvent::WifiConnected)
            .bare("WIFI GOT IP", WifiEvent::GotIp)
            .bare("WIFI DISCONNECT", WifiEvent::WifiDisconnected)
            .bare("busy p...", WifiEvent::BusyProcessing)
            .bare("CLOSED", WifiEvent::LinkClosed)
            .build()
    }
}
