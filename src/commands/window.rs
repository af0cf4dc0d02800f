//! Window command: show today's sunset and activation window.

use anyhow::Result;
use chrono::Utc;

use crate::common::utils::format_duration;
use crate::core::window::ActivationWindow;
use crate::geo::{SunsetProvider, provider_from_config};

pub fn run_window_command(debug_enabled: bool, config_path: Option<&str>) -> Result<()> {
    log_version!();

    let config = super::load_config(config_path)?;
    let (provider, tz) = provider_from_config(&config)?;
    if debug_enabled {
        log_pipe!();
        log_debug!("Sunset source: {}", provider.describe());
    }

    let now = Utc::now().with_timezone(&tz);
    report_window(provider.as_ref(), config.offset_minutes(), now)?;
    log_end!();
    Ok(())
}

fn report_window(
    provider: &dyn SunsetProvider,
    offset_minutes: u32,
    now: chrono::DateTime<chrono_tz::Tz>,
) -> Result<()> {
    let sunset = provider.sunset_on(now.date_naive())?;
    let window = ActivationWindow::for_sunset(&sunset, offset_minutes);

    log_block_start!("Sunset today: {}", sunset.format("%H:%M:%S %Z"));
    log_indented!(
        "Activation window: {} to {}",
        window.opens.format("%H:%M:%S"),
        window.closes.format("%H:%M:%S")
    );

    if window.contains(&now) {
        log_block_start!("The window is open now");
    } else {
        let until = window.until_open(&now);
        if until.is_zero() {
            log_block_start!("The window has closed for today");
        } else {
            log_block_start!(
                "The window opens in {}",
                format_duration(until.num_seconds())
            );
        }
    }
    Ok(())
}

pub fn display_help() {
    log_version!();
    log_block_start!("window - Show today's sunset and activation window");
    super::help::show_command_usage("window");
    log_block_start!("Description:");
    log_indented!("Computes sunset from the configured coordinates, fixed time");
    log_indented!("or geolocation, and prints when the window opens and closes.");
    log_end!();
}
