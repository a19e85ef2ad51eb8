//! [`DynamixelLink`] – Protocol 1.0 servo bus over a serial port.
//!
//! Every instruction is answered by a status packet (status return level 2),
//! so each call is one request/response transaction.  Stale bytes left over
//! from a timed-out transaction are discarded before the next request.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use teleop_types::TeleopError;
use tracing::{debug, info};

use crate::actuator::{ActuatorLink, register_value};
use crate::protocol::{self, StatusPacket, address};

/// Byte transport underneath a [`DynamixelLink`].
pub trait BusPort: Read + Write + Send {
    /// Drop any bytes waiting in the receive buffer.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl BusPort for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// A Dynamixel Protocol 1.0 bus.
pub struct DynamixelLink<P: BusPort = Box<dyn SerialPort>> {
    device: String,
    port: Option<P>,
}

impl DynamixelLink {
    /// Open `device` at `baud_rate`.
    ///
    /// `timeout` bounds every read, and therefore every transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::FatalSetup`] when the port cannot be opened or
    /// the baud rate cannot be applied.
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TeleopError> {
        let mut port = serialport::new(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| TeleopError::FatalSetup {
                device: device.to_string(),
                details: format!("failed to open the port: {e}"),
            })?;
        info!(device, "Opened serial port");

        port.set_baud_rate(baud_rate)
            .map_err(|e| TeleopError::FatalSetup {
                device: device.to_string(),
                details: format!("failed to change the baud rate to {baud_rate}: {e}"),
            })?;
        info!(device, baud_rate, "Baud rate configured");

        Ok(Self::with_port(device, port))
    }
}

impl<P: BusPort> DynamixelLink<P> {
    /// Wrap an already-configured transport.
    pub fn with_port(device: &str, port: P) -> Self {
        Self {
            device: device.to_string(),
            port: Some(port),
        }
    }

    fn transact(&mut self, id: u8, packet: &[u8]) -> Result<StatusPacket, TeleopError> {
        let comm = |details: String| TeleopError::Comm { id, details };
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| comm("link is closed".to_string()))?;

        port.discard_input()
            .map_err(|e| comm(format!("failed to clear input buffer: {e}")))?;
        port.write_all(packet)
            .map_err(|e| comm(format!("tx failed: {e}")))?;
        port.flush().map_err(|e| comm(format!("tx failed: {e}")))?;

        let mut prefix = [0u8; 4];
        port.read_exact(&mut prefix).map_err(|e| comm(rx_failure(&e)))?;
        let rest_len = protocol::remaining_len(&prefix).map_err(|e| comm(e.to_string()))?;
        let mut frame = Vec::with_capacity(4 + rest_len);
        frame.extend_from_slice(&prefix);
        frame.resize(4 + rest_len, 0);
        port.read_exact(&mut frame[4..])
            .map_err(|e| comm(rx_failure(&e)))?;

        let status = protocol::parse_status(&frame).map_err(|e| comm(e.to_string()))?;
        if status.id != id {
            return Err(comm(
                protocol::ProtocolError::IdMismatch {
                    expected: id,
                    found: status.id,
                }
                .to_string(),
            ));
        }
        if !status.flags.is_empty() {
            return Err(TeleopError::ServoStatus {
                id,
                flags: status.flags.to_string(),
            });
        }
        debug!(id, params = ?status.params, "status ok");
        Ok(status)
    }

    fn write_word(&mut self, id: u8, addr: u8, value: u16) -> Result<(), TeleopError> {
        let packet = protocol::write_packet(id, addr, &value.to_le_bytes());
        self.transact(id, &packet).map(|_| ())
    }
}

fn rx_failure(e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::TimedOut => "rx timeout: no status packet".to_string(),
        io::ErrorKind::UnexpectedEof => "rx corrupt: incomplete status packet".to_string(),
        _ => format!("rx failed: {e}"),
    }
}

impl<P: BusPort> ActuatorLink for DynamixelLink<P> {
    fn device(&self) -> &str {
        &self.device
    }

    fn enable_torque(&mut self, id: u8, enable: bool) -> Result<(), TeleopError> {
        let packet = protocol::write_packet(id, address::TORQUE_ENABLE, &[u8::from(enable)]);
        self.transact(id, &packet).map(|_| ())
    }

    fn set_velocity(&mut self, id: u8, velocity: u16) -> Result<(), TeleopError> {
        let value = register_value(id, i32::from(velocity))?;
        self.write_word(id, address::MOVING_SPEED, value)
    }

    fn write_goal_position(&mut self, id: u8, position: i32) -> Result<(), TeleopError> {
        let value = register_value(id, position)?;
        self.write_word(id, address::GOAL_POSITION, value)
    }

    fn read_present_position(&mut self, id: u8) -> Result<i32, TeleopError> {
        let packet = protocol::read_packet(id, address::PRESENT_POSITION, 2);
        let status = self.transact(id, &packet)?;
        let word = status.word().map_err(|e| TeleopError::Comm {
            id,
            details: e.to_string(),
        })?;
        Ok(i32::from(word))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!(device = %self.device, "Closed serial port");
        }
    }
}
