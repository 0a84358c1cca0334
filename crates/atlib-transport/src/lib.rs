//! Transport implementations for atlib.
//!
//! This crate provides [`SerialTransport`], the implementation of the
//! [`Transport`](atlib_core::Transport) trait from `atlib-core` for modules
//! attached over a UART: USB-serial bridges on development boards and host
//! serial ports wired straight to a module.
//!
//! # Example
//!
//! ```no_run
//! use atlib_transport::SerialTransport;
//! use atlib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> atlib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//!
//! transport.send(b"AT\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{
    available_ports, DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits,
    DEFAULT_BAUD_RATE,
};
