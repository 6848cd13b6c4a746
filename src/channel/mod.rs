//! Transport to the door actuator controller.

pub mod serial;
pub mod timed;

pub use serial::SerialChannel;
pub use timed::TimedChannel;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Wire-level intent for the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorCommand {
    Open,
    Close,
}

impl ActuatorCommand {
    /// Literal bytes written to the controller, no terminator.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            ActuatorCommand::Open => b"OPEN",
            ActuatorCommand::Close => b"CLOSE",
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorCommand::Open => f.write_str("OPEN"),
            ActuatorCommand::Close => f.write_str("CLOSE"),
        }
    }
}

impl std::str::FromStr for ActuatorCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(ActuatorCommand::Open),
            "close" => Ok(ActuatorCommand::Close),
            other => Err(format!("unknown command '{}', expected open or close", other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("previous operation still in flight")]
    Busy,

    #[error("channel is closed")]
    Closed,

    #[error("channel disconnected: {0}")]
    Disconnected(String),

    #[error("serial port error: {0}")]
    Port(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte transport to the actuator controller.
///
/// `send` may block; callers that need a bound wrap the channel in a
/// [`TimedChannel`].
pub trait CommandChannel {
    fn send(&mut self, command: ActuatorCommand) -> Result<(), ChannelError>;

    /// Re-establishes the link after failures.
    fn probe(&mut self) -> Result<(), ChannelError>;

    fn close(&mut self) -> Result<(), ChannelError>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn send(&mut self, command: ActuatorCommand) -> Result<(), ChannelError> {
        (**self).send(command)
    }

    fn probe(&mut self) -> Result<(), ChannelError> {
        (**self).probe()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_are_literal() {
        assert_eq!(ActuatorCommand::Open.as_bytes(), b"OPEN");
        assert_eq!(ActuatorCommand::Close.as_bytes(), b"CLOSE");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Open".parse::<ActuatorCommand>().unwrap(), ActuatorCommand::Open);
        assert_eq!("CLOSE".parse::<ActuatorCommand>().unwrap(), ActuatorCommand::Close);
        assert!("toggle".parse::<ActuatorCommand>().is_err());
    }
}
