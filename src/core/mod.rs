//! The control loop.
//!
//! Each tick probes the beacon, checks the activation window against today's
//! sunset, folds both into the hysteresis controller and sends the resulting
//! command to the switch. Between ticks the loop sleeps on the signal channel
//! so shutdown and status requests are handled without waiting out the
//! interval.
//!
//! The loop owns every piece of mutable state: the presence link, the
//! controller and the sunset schedule. Nothing is shared with other threads
//! except the signal channel and the `running` flag.

pub mod hysteresis;
pub mod window;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use crate::{
    common::utils::format_duration,
    geo::SunsetSchedule,
    io::signals::{SignalMessage, SignalState},
    presence::{PresenceLink, Reachability},
    switch::{Switch, apply_command},
    time_source::TimeSource,
};

pub use hysteresis::{HysteresisController, SwitchCommand, SwitchState};
pub use window::{ActivationWindow, is_open};

/// Parameters for creating a control loop.
///
/// Bundles the collaborators so construction stays readable.
pub struct CoreParams {
    pub link: PresenceLink,
    pub switch: Box<dyn Switch>,
    pub schedule: SunsetSchedule,
    pub offset_minutes: u32,
    pub timeout: chrono::Duration,
    pub interval: Duration,
    pub time_source: Arc<dyn TimeSource>,
    pub signal_state: SignalState,
    pub debug_enabled: bool,
}

/// What happened to the command computed in a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to send: a no-op, or the command already succeeded this window
    Skipped,
    Succeeded,
    Failed(String),
}

/// Record of one tick, kept for the status report.
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub at: DateTime<Tz>,
    pub presence: Reachability,
    pub sunset: DateTime<Tz>,
    pub gate_open: bool,
    pub command: SwitchCommand,
    pub outcome: DispatchOutcome,
}

impl TickResult {
    pub fn dispatched(&self) -> bool {
        self.outcome != DispatchOutcome::Skipped
    }
}

/// Control loop state.
pub struct Core {
    link: PresenceLink,
    switch: Box<dyn Switch>,
    schedule: SunsetSchedule,
    controller: HysteresisController,
    offset_minutes: u32,
    interval: Duration,
    time_source: Arc<dyn TimeSource>,
    signal_state: SignalState,
    debug_enabled: bool,
    last_tick: Option<TickResult>,
    ticks: u64,
}

impl Core {
    pub fn new(params: CoreParams) -> Self {
        let controller = HysteresisController::new(params.time_source.now(), params.timeout);
        Self {
            link: params.link,
            switch: params.switch,
            schedule: params.schedule,
            controller,
            offset_minutes: params.offset_minutes,
            interval: params.interval,
            time_source: params.time_source,
            signal_state: params.signal_state,
            debug_enabled: params.debug_enabled,
            last_tick: None,
            ticks: 0,
        }
    }

    pub fn controller(&self) -> &HysteresisController {
        &self.controller
    }

    pub fn link(&self) -> &PresenceLink {
        &self.link
    }

    pub fn last_tick(&self) -> Option<&TickResult> {
        self.last_tick.as_ref()
    }

    /// Run ticks until shutdown is requested, then close the link.
    pub fn execute(mut self) -> Result<()> {
        log_block_start!(
            "Watching beacon {} every {}s",
            self.link.address(),
            self.interval.as_secs()
        );
        self.log_window();

        while self.signal_state.is_running() {
            self.tick();
            if !self.wait_for_next_tick() {
                break;
            }
        }

        self.link.close();
        log_block_start!("Closed beacon link");
        log_end!();
        Ok(())
    }

    /// One pass of probe, gate, decide and dispatch.
    pub fn tick(&mut self) -> TickResult {
        let presence = self.link.poll();

        let now = self.time_source.now();
        let previous_sunset = self.schedule.current().clone();
        let sunset = self.schedule.sunset_for(now).clone();
        let local_now = now.with_timezone(&self.schedule.timezone());
        let gate_open = is_open(&sunset, self.offset_minutes, &local_now);

        let was_open = self.last_tick.as_ref().map(|tick| tick.gate_open);
        let sunset_changed = sunset != previous_sunset;
        if sunset_changed || was_open.is_some_and(|open| open != gate_open) {
            self.log_gate_change(gate_open, &sunset);
        }
        if gate_open && (sunset_changed || was_open != Some(true)) {
            self.controller.begin_window();
        }

        let command = self
            .controller
            .evaluate(presence.is_reachable(), gate_open, now);

        let outcome = if self.controller.needs_dispatch(command) {
            self.dispatch(command)
        } else {
            DispatchOutcome::Skipped
        };

        if self.debug_enabled {
            log_pipe!();
            log_debug!(
                "Tick {}: beacon {}, window {}, {}",
                self.ticks,
                if presence.is_reachable() { "present" } else { "absent" },
                if gate_open { "open" } else { "closed" },
                command
            );
            if gate_open && !presence.is_reachable() && command == SwitchCommand::NoOp {
                log_indented!(
                    "Grace period: {} left",
                    format_duration(self.controller.grace_remaining(now).num_seconds())
                );
            }
        }

        self.ticks += 1;
        let result = TickResult {
            at: local_now,
            presence,
            sunset,
            gate_open,
            command,
            outcome,
        };
        self.last_tick = Some(result.clone());
        result
    }

    fn dispatch(&mut self, command: SwitchCommand) -> DispatchOutcome {
        match apply_command(self.switch.as_mut(), command) {
            Ok(()) => {
                self.controller.record_result(command, true);
                let reason = match command {
                    SwitchCommand::TurnOn => "beacon present",
                    _ => "beacon absent past timeout",
                };
                log_block_start!("Switch '{}': {} ({})", self.switch.name(), command, reason);
                DispatchOutcome::Succeeded
            }
            Err(e) => {
                self.controller.record_result(command, false);
                log_pipe!();
                log_error!("Failed to {} switch '{}': {}", command, self.switch.name(), e);
                log_indented!("Retrying on the next tick");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Sleep for the interval, handling signals that arrive meanwhile.
    ///
    /// Returns false when the loop should stop.
    fn wait_for_next_tick(&mut self) -> bool {
        let deadline = Instant::now() + self.interval;

        loop {
            if !self.signal_state.is_running() {
                return false;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.signal_state.signal_receiver.recv_timeout(remaining) {
                Ok(SignalMessage::Shutdown) => return false,
                Ok(SignalMessage::Status) => self.report_status(),
                Err(RecvTimeoutError::Timeout) => return self.signal_state.is_running(),
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(remaining);
                    return self.signal_state.is_running();
                }
            }
        }
    }

    fn log_window(&self) {
        let sunset = self.schedule.current();
        let window = ActivationWindow::for_sunset(sunset, self.offset_minutes);
        log_block_start!(
            "Sunset today at {} ({})",
            sunset.format("%H:%M:%S"),
            self.schedule.describe()
        );
        log_indented!(
            "Activation window: {} to {}",
            window.opens.format("%H:%M:%S"),
            window.closes.format("%H:%M:%S")
        );
    }

    fn log_gate_change(&self, gate_open: bool, sunset: &DateTime<Tz>) {
        if gate_open {
            log_block_start!(
                "Activation window open ({} minutes before sunset at {})",
                self.offset_minutes,
                sunset.format("%H:%M:%S")
            );
        } else {
            let window = ActivationWindow::for_sunset(sunset, self.offset_minutes);
            log_block_start!(
                "Activation window closed, opens at {}",
                window.opens.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    /// Log the last tick on SIGUSR1.
    pub fn report_status(&self) {
        log_block_start!("Status");
        if self.time_source.is_simulated() {
            log_indented!("Clock: simulated");
        }
        log_indented!(
            "Beacon {}: {}",
            self.link.address(),
            if self.link.is_connected() { "connected" } else { "disconnected" }
        );
        let now: DateTime<Utc> = self.time_source.now();
        log_indented!(
            "Last seen: {} ago",
            format_duration((now - self.controller.last_present_at()).num_seconds())
        );
        log_indented!(
            "Switch '{}': {}",
            self.switch.name(),
            match self.controller.switch_state() {
                SwitchState::On => "on",
                SwitchState::Off => "off",
                SwitchState::Unknown => "unknown",
            }
        );
        match &self.last_tick {
            Some(tick) => {
                log_indented!(
                    "Last tick at {}: window {}, {}",
                    tick.at.format("%H:%M:%S"),
                    if tick.gate_open { "open" } else { "closed" },
                    tick.command
                );
                if let DispatchOutcome::Failed(reason) = &tick.outcome {
                    log_indented!("Last command failed: {reason}");
                }
            }
            None => log_indented!("No tick completed yet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::FixedSunset;
    use crate::presence::BeaconAddress;
    use crate::presence::scripted::{ScriptHandle, ScriptedTransport};
    use crate::switch::{MockSwitch, SwitchError};
    use crate::time_source::ManualTimeSource;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    fn berlin(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Berlin
            .with_ymd_and_hms(2024, 6, 1, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn core_with(switch: MockSwitch, clock: Arc<ManualTimeSource>) -> (Core, ScriptHandle) {
        let (transport, script) = ScriptedTransport::new();
        let address = BeaconAddress::new("A4:C1:38:12:34:56", 1).unwrap();
        let link = PresenceLink::new(Box::new(transport), address, Duration::from_secs(5));
        let provider = FixedSunset::parse("18:00:00", Berlin).unwrap();
        let schedule = SunsetSchedule::new(Box::new(provider), Berlin, clock.now()).unwrap();

        let core = Core::new(CoreParams {
            link,
            switch: Box::new(switch),
            schedule,
            offset_minutes: 30,
            timeout: chrono::Duration::minutes(10),
            interval: Duration::from_secs(3600),
            time_source: clock,
            signal_state: SignalState::new(),
            debug_enabled: false,
        });
        (core, script)
    }

    fn named(mut switch: MockSwitch) -> MockSwitch {
        switch.expect_name().return_const("Porch Light".to_string());
        switch
    }

    #[test]
    fn test_closed_window_never_dispatches() {
        let clock = Arc::new(ManualTimeSource::new(berlin(12, 0, 0)));
        let (mut core, script) = core_with(named(MockSwitch::new()), clock.clone());

        script.set_present(true);
        let tick = core.tick();
        assert!(!tick.gate_open);
        assert_eq!(tick.command, SwitchCommand::NoOp);
        assert!(!tick.dispatched());
    }

    #[test]
    fn test_presence_in_window_turns_on_once() {
        let mut switch = named(MockSwitch::new());
        switch.expect_turn_on().times(1).returning(|| Ok(()));
        let clock = Arc::new(ManualTimeSource::new(berlin(17, 35, 0)));
        let (mut core, script) = core_with(switch, clock.clone());

        script.set_present(true);
        let first = core.tick();
        assert_eq!(first.command, SwitchCommand::TurnOn);
        assert_eq!(first.outcome, DispatchOutcome::Succeeded);

        clock.advance(chrono::Duration::seconds(10));
        let second = core.tick();
        assert_eq!(second.command, SwitchCommand::TurnOn);
        assert_eq!(second.outcome, DispatchOutcome::Skipped);
        assert_eq!(core.controller().switch_state(), SwitchState::On);
    }

    #[test]
    fn test_next_evening_turns_on_again() {
        let mut switch = named(MockSwitch::new());
        switch.expect_turn_on().times(2).returning(|| Ok(()));
        let clock = Arc::new(ManualTimeSource::new(berlin(17, 35, 0)));
        let (mut core, script) = core_with(switch, clock.clone());
        script.set_present(true);

        assert_eq!(core.tick().outcome, DispatchOutcome::Succeeded);

        // Same time the next day, with no tick in between
        clock.advance(chrono::Duration::days(1));
        let next_day = core.tick();
        assert!(next_day.gate_open);
        assert_eq!(next_day.command, SwitchCommand::TurnOn);
        assert_eq!(next_day.outcome, DispatchOutcome::Succeeded);
        assert_eq!(next_day.sunset.date_naive(), next_day.at.date_naive());
        assert_eq!(script.probe_calls(), 2);
    }

    #[test]
    fn test_failed_command_is_retried() {
        let mut switch = named(MockSwitch::new());
        let mut seq = mockall::Sequence::new();
        switch
            .expect_turn_on()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(SwitchError::Status {
                    name: "Porch Light".to_string(),
                    status: 500,
                })
            });
        switch
            .expect_turn_on()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let clock = Arc::new(ManualTimeSource::new(berlin(17, 45, 0)));
        let (mut core, script) = core_with(switch, clock.clone());
        script.set_present(true);

        let first = core.tick();
        assert!(matches!(first.outcome, DispatchOutcome::Failed(_)));
        assert_eq!(core.controller().switch_state(), SwitchState::Unknown);

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(core.tick().outcome, DispatchOutcome::Succeeded);
    }

    #[test]
    fn test_execute_returns_after_shutdown_request() {
        let clock = Arc::new(ManualTimeSource::new(berlin(12, 0, 0)));
        let (core, script) = core_with(named(MockSwitch::new()), clock);
        script.push_connects(&[true]);

        let sender = core.signal_state.signal_sender.clone();
        let handle = std::thread::spawn(move || core.execute());

        sender.send(SignalMessage::Status).unwrap();
        sender.send(SignalMessage::Shutdown).unwrap();
        handle.join().unwrap().unwrap();

        // The link opened on the first tick is closed on the way out
        assert_eq!(script.closes(), 1);
    }
}
