//! Serial port transport for AT-command modules.
//!
//! Wi-Fi, BLE, LoRaWAN and cellular modules almost all speak AT commands
//! over a plain UART, 8N1, usually at 115200 baud out of reset:
//! - ESP8266/ESP32 AT firmware: 115200
//! - LoRaWAN modems: 9600 or 115200
//! - cellular modems: 115200, auto-bauding on many parts
//!
//! On development boards the USB-serial bridge often drives the module's
//! reset and boot-mode pins from DTR and RTS, so both lines are released
//! after opening unless [`SerialConfig::release_control_lines`] is cleared.

use async_trait::async_trait;
use atlib_core::error::{Error, Result};
use atlib_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// Baud rate most AT firmwares use out of reset.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// Hardware flow control is needed by some cellular modems at high
    /// baud rates.
    pub flow_control: FlowControl,
    /// De-assert DTR and RTS right after opening.
    pub release_control_lines: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            release_control_lines: true,
        }
    }
}

/// Names of the serial ports present on this host.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Serial port transport to an AT-command module.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at `baud_rate`, 8N1, no flow control.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    ///
    /// ```no_run
    /// # use atlib_transport::{SerialTransport, SerialConfig, FlowControl};
    /// # async fn example() -> atlib_core::Result<()> {
    /// let config = SerialConfig {
    ///     baud_rate: 921_600,
    ///     flow_control: FlowControl::Hardware,
    ///     ..SerialConfig::default()
    /// };
    /// let transport = SerialTransport::open_with_config("/dev/ttyACM0", config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(port = %port, ?config, "opening serial port");

        let mut stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .open_native_async()
            .map_err(|e| Error::Transport(format!("failed to open serial port {port}: {e}")))?;

        if config.release_control_lines {
            release_control_lines(&mut stream, port);
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "serial port opened");
        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// DTR and RTS often drive a module's reset and boot pins through the
/// USB bridge; leaving them asserted can hold the module in reset.
fn release_control_lines(stream: &mut SerialStream, port: &str) {
    if let Err(e) = stream.write_data_terminal_ready(false) {
        tracing::warn!(port = %port, error = %e, "failed to de-assert DTR");
    }
    if let Err(e) = stream.write_request_to_send(false) {
        tracing::warn!(port = %port, error = %e, "failed to de-assert RTS");
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let name = &self.port_name;
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(port = %name, data = %String::from_utf8_lossy(data).escape_debug(), "tx");

        let written = async {
            port.write_all(data).await?;
            port.flush().await
        }
        .await;
        written.map_err(|e| {
            tracing::error!(port = %name, error = %e, "serial write failed");
            map_io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let name = &self.port_name;
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        let n = tokio::time::timeout(timeout, port.read(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                tracing::error!(port = %name, error = %e, "serial read failed");
                map_io_error(e)
            })?;
        if n == 0 {
            // A USB bridge that was unplugged reads as end of stream.
            tracing::warn!(port = %name, "serial port reported end of stream");
            return Err(Error::ConnectionLost);
        }
        tracing::trace!(port = %name, data = %String::from_utf8_lossy(&buf[..n]).escape_debug(), "rx");
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        if let Err(e) = port.flush().await {
            tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
        }
        tracing::info!(port = %self.port_name, "serial port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_115200_8n1() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
        assert!(config.release_control_lines);
    }

    #[test]
    fn io_errors_map_to_connection_lost() {
        let e = map_io_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(e, Error::ConnectionLost));
        let e = map_io_error(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(e, Error::Io(_)));
    }

    #[tokio::test]
    async fn opening_missing_port_fails() {
        let r = SerialTransport::open("/dev/atlib-no-such-port", DEFAULT_BAUD_RATE).await;
        assert!(matches!(r, Err(Error::Transport(_))));
    }
}
