//! # beaconlight
//!
//! Internal library for the beaconlight daemon.
//!
//! Turns a WeMo switch on after sunset while a Bluetooth beacon is in range,
//! and off again once the beacon has been gone for a while.
//!
//! ## Architecture
//!
//! - **Entry Point**: `Beaconlight` wires up lock, config, switch, sunset and signals
//! - **Core Logic**: `core` holds the control loop, the activation window and
//!   the hysteresis controller
//! - **Presence**: `presence` manages the RFCOMM link to the beacon
//! - **Switch**: `switch` talks SOAP to WeMo devices and discovers them over SSDP
//! - **Geographic**: `geo` computes sunset and resolves location and timezone
//! - **Configuration**: `config` for TOML settings and validation
//! - **Infrastructure**: signal handling, lock file, logging and utilities

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod common;

pub mod args;
pub mod commands;
pub mod config;
pub mod core;
pub mod geo;
pub mod io;
pub mod presence;
pub mod switch;
pub mod time_source;

mod beaconlight;

pub use beaconlight::Beaconlight;
