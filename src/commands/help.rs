//! Help command: general help or detailed help for one command.

use anyhow::Result;

/// Show brief usage for a command (used for error messages)
pub fn show_command_usage(command: &str) {
    match command {
        "discover" | "D" => log_block_start!("Usage: beaconlight discover [OPTIONS]"),
        "window" | "w" => log_block_start!("Usage: beaconlight window [OPTIONS]"),
        _ => log_block_start!("Usage: beaconlight [OPTIONS] [COMMAND]"),
    }
}

/// Run the help command (dispatcher)
pub fn run_help_command(command: Option<&str>) -> Result<()> {
    match command {
        None => display_general_help(),
        Some("discover") | Some("D") => super::discover::display_help(),
        Some("window") | Some("w") => super::window::display_help(),
        Some("help") | Some("h") => display_help_help(),
        Some(unknown) => {
            log_warning_standalone!("Unknown command: {}", unknown);
            display_general_help();
        }
    }
    Ok(())
}

fn display_general_help() {
    log_version!();
    log_block_start!("Available Commands:");
    log_indented!("discover, D             List WeMo switches and their state");
    log_indented!("window, w               Show today's sunset and activation window");
    log_indented!("help, h [COMMAND]       Show detailed help for a command");
    log_pipe!();
    log_info!("Run 'beaconlight' without a command to start the daemon.");
    log_indented!("Use 'beaconlight --help' to see all options and general usage.");
    log_end!();
}

fn display_help_help() {
    log_version!();
    log_block_start!("help - Display help information");
    show_command_usage("help");
    log_block_start!("Examples:");
    log_indented!("beaconlight help");
    log_indented!("beaconlight help discover");
    log_end!();
}
