//! Entry point: parse arguments and dispatch.
//!
//! Exit status is 0 after a graceful shutdown or a successful command and 1
//! when startup or a command fails.

use beaconlight::args::{self, CliAction, ParsedArgs};
use beaconlight::commands;
use beaconlight::common::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use beaconlight::{Beaconlight, log_critical, log_end, log_indented, log_pipe};
use std::path::PathBuf;

fn main() {
    let parsed = ParsedArgs::from_env();

    let result = match parsed.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::HelpCommand { command } => commands::help::run_help_command(command.as_deref()),
        CliAction::DiscoverCommand {
            debug_enabled,
            config_path,
        } => commands::discover::run_discover_command(debug_enabled, config_path.as_deref()),
        CliAction::WindowCommand {
            debug_enabled,
            config_path,
        } => commands::window::run_window_command(debug_enabled, config_path.as_deref()),
        CliAction::Run {
            debug_enabled,
            config_path,
        } => Beaconlight::new(debug_enabled)
            .with_config_path(config_path.map(PathBuf::from))
            .run(),
    };

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            log_pipe!();
            log_critical!("{}", e);
            for cause in e.chain().skip(1) {
                log_indented!("caused by: {}", cause);
            }
            log_end!();
            std::process::exit(EXIT_FAILURE);
        }
    }
}
