use std::io::{self, Read, Write};

use log::{debug, info, warn};
use panel_core::{FrameSource, PanelError, SerialConfig, SourceError};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

/// Consecutive failed reads after which the port is considered gone.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Serial link to the panel's master board.
///
/// Reads block for at most the configured read timeout; a timeout is
/// reported as an empty read rather than an error, so the poller can keep
/// servicing queued commands while the board is quiet.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    connected: bool,
    errors: u32,
}

impl SerialTransport {
    /// Open the first port whose description contains `config.port_filter`.
    pub fn discover(config: &SerialConfig) -> Result<Self, PanelError> {
        let ports = serialport::available_ports().map_err(|e| PanelError::Io(e.into()))?;
        debug!("{} serial ports available", ports.len());

        for port in ports.iter().filter(|p| matches_filter(p, &config.port_filter)) {
            match Self::open(&port.port_name, config) {
                Ok(transport) => return Ok(transport),
                Err(e) => warn!("could not open {}: {e}", port.port_name),
            }
        }
        Err(PanelError::TransportNotFound {
            filter: config.port_filter.clone(),
        })
    }

    /// Open a port by path, skipping discovery.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, PanelError> {
        let port = serialport::new(path, config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| PanelError::Io(e.into()))?;
        info!("opened {path} at {} baud", config.baud_rate);
        Ok(Self {
            port,
            name: path.to_owned(),
            connected: true,
            errors: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn fail(&mut self, e: io::Error) -> SourceError {
        if is_disconnect(&e) {
            self.connected = false;
            return SourceError::Disconnected;
        }
        self.errors += 1;
        if self.errors >= MAX_CONSECUTIVE_ERRORS {
            warn!("{}: giving up after {} errors", self.name, self.errors);
            self.connected = false;
            return SourceError::Disconnected;
        }
        SourceError::Io(e)
    }
}

impl FrameSource for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        match self.port.read(buf) {
            Ok(n) => {
                self.errors = 0;
                Ok(n)
            }
            Err(e) if is_quiet(&e) => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.port
            .write_all(bytes)
            .and_then(|()| self.port.flush())
            .map_err(|e| self.fail(e))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Nothing arrived within the read timeout.
fn is_quiet(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Human readable names of a port, most specific first.
fn descriptions(port: &SerialPortInfo) -> Vec<&str> {
    let mut names = Vec::new();
    if let SerialPortType::UsbPort(usb) = &port.port_type {
        names.extend(usb.product.as_deref());
        names.extend(usb.manufacturer.as_deref());
    }
    names.push(port.port_name.as_str());
    names
}

fn matches_filter(port: &SerialPortInfo, filter: &str) -> bool {
    description_matches(&descriptions(port), filter)
}

/// Case-sensitive substring match against any description.
fn description_matches(descriptions: &[&str], filter: &str) -> bool {
    descriptions.iter().any(|d| d.contains(filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_is_case_sensitive_substring() {
        let names = ["Arduino Uno", "Arduino (www.arduino.cc)", "/dev/ttyACM0"];
        assert!(description_matches(&names, "Arduino Uno"));
        assert!(description_matches(&names, "ttyACM"));
        assert!(!description_matches(&names, "arduino uno"));
        assert!(!description_matches(&names, "Mega"));
    }

    #[test]
    fn test_quiet_and_disconnect_kinds() {
        assert!(is_quiet(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_quiet(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::Other)));
    }

    #[test]
    fn test_non_usb_port_matches_by_name() {
        let port = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        };
        assert!(matches_filter(&port, "ttyS"));
        assert!(!matches_filter(&port, "Arduino Uno"));
    }
}
