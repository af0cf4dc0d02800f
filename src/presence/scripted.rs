//! Scripted beacon transport for driving `PresenceLink` without a radio.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{BeaconAddress, BeaconConnection, BeaconTransport, LinkError};

#[derive(Debug)]
struct Script {
    connects: VecDeque<bool>,
    probes: VecDeque<bool>,
    connect_default: bool,
    probe_default: bool,
    connect_calls: u32,
    probe_calls: u32,
    closes: u32,
}

/// Test-side handle controlling what the transport does next.
///
/// Queued outcomes are used first; once a queue is empty the default applies.
/// Defaults: connects fail, probes on an open connection succeed.
#[derive(Debug, Clone)]
pub struct ScriptHandle(Arc<Mutex<Script>>);

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push_connects(&self, outcomes: &[bool]) {
        self.lock().connects.extend(outcomes);
    }

    pub fn push_probes(&self, outcomes: &[bool]) {
        self.lock().probes.extend(outcomes);
    }

    /// Beacon in range: connects and probes succeed. Out of range: both fail.
    pub fn set_present(&self, present: bool) {
        let mut script = self.lock();
        script.connect_default = present;
        script.probe_default = present;
    }

    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    pub fn probe_calls(&self) -> u32 {
        self.lock().probe_calls
    }

    pub fn closes(&self) -> u32 {
        self.lock().closes
    }
}

pub struct ScriptedTransport(ScriptHandle);

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle(Arc::new(Mutex::new(Script {
            connects: VecDeque::new(),
            probes: VecDeque::new(),
            connect_default: false,
            probe_default: true,
            connect_calls: 0,
            probe_calls: 0,
            closes: 0,
        })));
        (Self(handle.clone()), handle)
    }
}

struct ScriptedConnection(ScriptHandle);

impl BeaconTransport for ScriptedTransport {
    fn connect(
        &mut self,
        _address: &BeaconAddress,
        timeout: Duration,
    ) -> Result<Box<dyn BeaconConnection>, LinkError> {
        let mut script = self.0.lock();
        script.connect_calls += 1;
        let default = script.connect_default;
        if script.connects.pop_front().unwrap_or(default) {
            Ok(Box::new(ScriptedConnection(self.0.clone())))
        } else {
            Err(LinkError::ConnectTimeout(timeout))
        }
    }
}

impl BeaconConnection for ScriptedConnection {
    fn send_probe(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.is_empty() {
            return Err(LinkError::Send(std::io::Error::other("empty probe")));
        }
        let mut script = self.0.lock();
        script.probe_calls += 1;
        let default = script.probe_default;
        if script.probes.pop_front().unwrap_or(default) {
            Ok(())
        } else {
            Err(LinkError::Closed)
        }
    }

    fn close(self: Box<Self>) -> Result<(), LinkError> {
        self.0.lock().closes += 1;
        Err(LinkError::Closed)
    }
}
