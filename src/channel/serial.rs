use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;

use super::{ActuatorCommand, ChannelError, CommandChannel};
use crate::common::config::ChannelConfig;

/// Serial link to the actuator controller.
pub struct SerialChannel {
    port_name: String,
    baud_rate: u32,
    write_timeout: Duration,
    settle_delay: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Opens the port and waits for the controller to settle.
    pub fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let mut channel = Self {
            port_name: config.port.clone(),
            baud_rate: config.baud_rate,
            write_timeout: config.send_timeout(),
            settle_delay: config.settle_delay(),
            port: None,
        };
        channel.connect()?;
        Ok(channel)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn connect(&mut self) -> Result<(), ChannelError> {
        // Release the old handle first; some adapters refuse a second open
        self.port = None;

        tracing::info!("Opening serial port {} at {} baud", self.port_name, self.baud_rate);
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.write_timeout)
            .open()
            .map_err(|e| {
                log_available_ports();
                ChannelError::Port(format!("{}: {}", self.port_name, e))
            })?;

        // Boards that reset on open need a moment before they accept input
        thread::sleep(self.settle_delay);
        self.port = Some(port);
        Ok(())
    }
}

impl CommandChannel for SerialChannel {
    fn send(&mut self, command: ActuatorCommand) -> Result<(), ChannelError> {
        let port = self.port.as_mut().ok_or(ChannelError::Closed)?;

        port.write_all(command.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => ChannelError::Timeout(self.write_timeout),
                io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => {
                    ChannelError::Disconnected(e.to_string())
                }
                _ => ChannelError::Io(e),
            })
    }

    fn probe(&mut self) -> Result<(), ChannelError> {
        self.connect()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        match self.port.take() {
            Some(mut port) => {
                let flushed = port.flush();
                tracing::info!("Closed serial port {}", self.port_name);
                flushed.map_err(ChannelError::Io)
            }
            None => Ok(()),
        }
    }
}

fn log_available_ports() {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => tracing::warn!("No serial ports found"),
        Ok(ports) => {
            let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
            tracing::warn!("Available serial ports: {}", names.join(", "));
        }
        Err(e) => tracing::debug!("Could not enumerate serial ports: {}", e),
    }
}
