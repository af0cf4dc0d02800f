//! Remote power switch abstraction.
//!
//! The control loop only needs to switch on and off; everything else about the
//! device (transport, discovery, retries) lives behind the `Switch` trait.
//! Commands are assumed idempotent, so repeating one is harmless.

pub mod discovery;
pub mod wemo;

use thiserror::Error;

use crate::core::hysteresis::SwitchCommand;

pub use discovery::{DiscoveredSwitch, discover, resolve_switch};
pub use wemo::WemoSwitch;

/// Failure reported by a switch command.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("request to '{name}' failed: {source}")]
    Http {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("'{name}' answered with HTTP {status}")]
    Status { name: String, status: u16 },
    #[error("'{name}' rejected the command: {detail}")]
    Fault { name: String, detail: String },
    #[error("no switch named '{0}' was found")]
    NotFound(String),
}

/// A remotely controlled power switch.
#[cfg_attr(test, mockall::automock)]
pub trait Switch: Send {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    fn turn_on(&mut self) -> Result<(), SwitchError>;

    fn turn_off(&mut self) -> Result<(), SwitchError>;
}

/// Send `command` to `switch`. `NoOp` never touches the device.
pub fn apply_command(switch: &mut dyn Switch, command: SwitchCommand) -> Result<(), SwitchError> {
    match command {
        SwitchCommand::TurnOn => switch.turn_on(),
        SwitchCommand::TurnOff => switch.turn_off(),
        SwitchCommand::NoOp => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_command_routes_to_switch() {
        let mut switch = MockSwitch::new();
        switch.expect_turn_on().times(1).returning(|| Ok(()));
        switch.expect_turn_off().times(1).returning(|| {
            Err(SwitchError::Status {
                name: "Porch".to_string(),
                status: 500,
            })
        });

        assert!(apply_command(&mut switch, SwitchCommand::TurnOn).is_ok());
        assert!(apply_command(&mut switch, SwitchCommand::TurnOff).is_err());
        assert!(apply_command(&mut switch, SwitchCommand::NoOp).is_ok());
    }
}
