//! Command-line argument parsing.
//!
//! Parsing never fails outright: anything unrecognised turns into
//! `ShowHelpDueToError` so `main` can print usage and exit non-zero.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon
    Run {
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// List WeMo switches on the local network
    DiscoverCommand {
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// Print today's sunset and activation window
    WindowCommand {
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// Help for a command, or general help
    HelpCommand { command: Option<String> },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments, the program name first.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let action = parse_action(&args_vec);
        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

fn parse_action(args: &[String]) -> CliAction {
    // Help and version take precedence over everything else
    if args
        .iter()
        .any(|arg| arg == "--version" || arg == "-V" || arg == "-v")
    {
        return CliAction::ShowVersion;
    }
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return CliAction::ShowHelp;
    }

    let mut debug_enabled = false;
    let mut config_path: Option<String> = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut idx = 0;
    while idx < args.len() {
        match args[idx].as_str() {
            "--debug" | "-d" => debug_enabled = true,
            "--config" | "-c" => {
                match args.get(idx + 1) {
                    Some(path) if !path.starts_with('-') => config_path = Some(path.clone()),
                    _ => {
                        log_warning_standalone!("--config requires a file path");
                        return CliAction::ShowHelpDueToError;
                    }
                }
                idx += 1;
            }
            arg if arg.starts_with('-') => {
                log_warning_standalone!("Unknown option: {}", arg);
                return CliAction::ShowHelpDueToError;
            }
            arg => positional.push(arg),
        }
        idx += 1;
    }

    match positional.as_slice() {
        [] => CliAction::Run {
            debug_enabled,
            config_path,
        },
        ["discover" | "D"] => CliAction::DiscoverCommand {
            debug_enabled,
            config_path,
        },
        ["window" | "w"] => CliAction::WindowCommand {
            debug_enabled,
            config_path,
        },
        ["help" | "h"] => CliAction::HelpCommand { command: None },
        ["help" | "h", command] => CliAction::HelpCommand {
            command: Some(command.to_string()),
        },
        [command, ..] if matches!(*command, "discover" | "D" | "window" | "w") => {
            log_warning_standalone!("'{}' takes no arguments", command);
            CliAction::ShowHelpDueToError
        }
        [command, ..] => {
            log_warning_standalone!("Unknown command: {}", command);
            CliAction::ShowHelpDueToError
        }
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("beaconlight [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <file>    Use a specific configuration file");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("discover, D            List WeMo switches on the local network");
    log_indented!("window, w              Show today's sunset and activation window");
    log_indented!("help [COMMAND]         Show detailed help for a command");
    log_block_start!("Signals:");
    log_indented!("SIGUSR1                Log a status report");
    log_indented!("SIGINT, SIGTERM        Shut down gracefully");
    log_end!();
}
