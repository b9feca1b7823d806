// src/io/eid/link.rs
//
// Transport seam for the reader connection.
//
// The EID reader pairs as a classic-Bluetooth serial device; once the OS has
// bound its RFCOMM channel the reader is an ordinary serial port
// (/dev/rfcomm0 or /dev/cu.* on Unix, COMn on Windows). The production link
// opens that port with the platform serial stack; tests substitute scripted
// links behind the same trait.

use std::io::Read;
use std::time::Duration;

use serde::Serialize;

use crate::io::ReaderError;

use super::reader::EidReaderConfig;

// ============================================================================
// Link Traits
// ============================================================================

/// Byte-stream channel to the peripheral.
///
/// Exactly one link exists per connection attempt; links are never pooled or
/// handed to a second reader. Dropping the link closes the channel and its
/// streams.
pub trait ReaderLink: Send {
    /// Bounded read into `buf`.
    ///
    /// `Ok(0)` means the stream closed. `ErrorKind::TimedOut` and
    /// `ErrorKind::WouldBlock` mean a quiet poll, not a failure; any other
    /// error is terminal for the read loop.
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Whether the channel still reports itself connected. Serial-backed
    /// links learn of disconnection through read results and report `true`
    /// here; scripted links use it to simulate a dropped peer.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Establishes a link, called once per connection attempt after the
/// adapter precondition passes.
pub trait LinkConnector: Send + Sync {
    fn connect(&self, config: &EidReaderConfig) -> Result<Box<dyn ReaderLink>, ReaderError>;
}

// ============================================================================
// Serial Link (production)
// ============================================================================

/// Serial-port link over the reader's bound RFCOMM channel.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl ReaderLink for SerialLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

/// Opens a [`SerialLink`] for the configured port.
pub struct SerialConnector;

impl LinkConnector for SerialConnector {
    fn connect(&self, config: &EidReaderConfig) -> Result<Box<dyn ReaderLink>, ReaderError> {
        // Adapter precondition: the serial stack must be usable and the
        // reader's channel present. A powered-off radio removes the bound
        // device node, so this is where "Bluetooth not available" surfaces.
        if !channel_present(&config.port) {
            return Err(ReaderError::adapter());
        }

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| ReaderError::connect(e.to_string()))?;

        Ok(Box::new(SerialLink { port }))
    }
}

/// True when the configured channel is enumerated by the serial stack or
/// exists as a device node (bound RFCOMM channels on Linux are not always
/// enumerated).
fn channel_present(port: &str) -> bool {
    match serialport::available_ports() {
        Ok(ports) => {
            ports.iter().any(|p| p.port_name == port) || std::path::Path::new(port).exists()
        }
        Err(_) => false,
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// A serial port a reader may be bound to.
#[derive(Clone, Debug, Serialize)]
pub struct ReaderPortInfo {
    pub port_name: String,
    /// "Bluetooth", "USB", "PCI", or "Unknown".
    pub port_type: String,
    /// Whether the OS classifies this as a Bluetooth serial channel.
    pub bluetooth: bool,
}

/// List serial ports the reader could be reached through.
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing
/// connections; the tty devices block on open waiting for carrier detect.
pub fn list_reader_ports() -> Result<Vec<ReaderPortInfo>, ReaderError> {
    let ports = serialport::available_ports()
        .map_err(|e| ReaderError::connect(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, bluetooth) = match p.port_type {
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), true),
                serialport::SerialPortType::UsbPort(_) => ("USB".to_string(), false),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), false),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), false),
            };
            ReaderPortInfo {
                port_name: p.port_name,
                port_type,
                bluetooth,
            }
        })
        .collect())
}
