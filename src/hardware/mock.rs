//! Mock Hardware Implementations
//!
//! Provides simulated collaborators for running without physical hardware.
//!
//! # Available Mocks
//!
//! - `MockSupply` - Simulated HP663x power supply behind [`InstrumentLink`]
//! - `ScriptedKeys` - Replays a fixed sequence of key polls
//! - `RecordingPlot` - Captures every plot script it receives
//!
//! All mocks keep their observable state behind `Arc<Mutex<..>>` handles so a test
//! can still inspect them after the mock itself has been moved into a session.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::{InstrumentLink, Key, KeySource, PlotSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// MockSupply - Simulated Power Supply
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    /// The bus call itself fails
    Fail,
    /// The device answers with text that is not a number
    Garbage,
}

#[derive(Debug, Clone)]
struct Fault {
    command: String,
    occurrence: usize,
    kind: FaultKind,
}

/// Mock power supply with a resistive load
///
/// Simulates an HP663x with:
/// - `VSET`/`ISET`/`OVSET`/`OCP` handling (also inside `;`-joined commands)
/// - `VOUT?` answering the commanded voltage, clamped to the overvoltage limit
/// - `IOUT?` answering `volt / load`, clamped to the current limit
/// - Fixed-width, CR/LF framed responses like the real device
/// - One-shot fault injection keyed by command and occurrence
///
/// # Example
///
/// ```rust
/// use psu_ramp::hardware::capabilities::InstrumentLink;
/// use psu_ramp::hardware::mock::MockSupply;
///
/// let mut supply = MockSupply::new().with_load(5.0).fail_on("IOUT?", 2);
/// supply.send("VSET 1.000000").unwrap();
/// assert!(supply.query("IOUT?").is_ok());
/// assert!(supply.query("IOUT?").is_err());
/// ```
pub struct MockSupply {
    load_ohms: f64,
    volt_set: f64,
    volt_limit: f64,
    amp_limit: f64,
    overcurrent_trip: bool,
    tripped: bool,
    occurrences: HashMap<String, usize>,
    faults: Vec<Fault>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockSupply {
    /// Create a new mock supply with a 10 Ω load and HP6633A limits
    pub fn new() -> Self {
        Self {
            load_ohms: 10.0,
            volt_set: 0.0,
            volt_limit: 50.0,
            amp_limit: 2.0,
            overcurrent_trip: false,
            tripped: false,
            occurrences: HashMap::new(),
            faults: Vec::new(),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the simulated load resistance in ohms
    pub fn with_load(mut self, ohms: f64) -> Self {
        self.load_ohms = ohms;
        self
    }

    /// Fail the `occurrence`-th (1-based) call of `command`
    ///
    /// `command` is matched against the command word, e.g. `"IOUT?"` or `"VSET"`.
    pub fn fail_on(mut self, command: &str, occurrence: usize) -> Self {
        self.faults.push(Fault {
            command: command.to_string(),
            occurrence,
            kind: FaultKind::Fail,
        });
        self
    }

    /// Answer the `occurrence`-th (1-based) query of `command` with non-numeric text
    pub fn garbage_on(mut self, command: &str, occurrence: usize) -> Self {
        self.faults.push(Fault {
            command: command.to_string(),
            occurrence,
            kind: FaultKind::Garbage,
        });
        self
    }

    /// Shared handle on the call log, usable after the mock has been moved
    pub fn call_log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_log)
    }

    /// Get a copy of the call log for verification
    pub fn call_log(&self) -> Vec<String> {
        lock(&self.call_log).clone()
    }

    /// Currently commanded voltage
    pub fn setpoint(&self) -> f64 {
        self.volt_set
    }

    fn command_word(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("")
    }

    /// Count the call and return the fault scheduled for it, if any
    fn record(&mut self, command: &str) -> Option<FaultKind> {
        lock(&self.call_log).push(command.to_string());

        let word = Self::command_word(command).to_string();
        let count = self.occurrences.entry(word.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        self.faults
            .iter()
            .position(|f| f.command == word && f.occurrence == count)
            .map(|idx| self.faults.remove(idx).kind)
    }

    fn apply_setting(&mut self, part: &str) -> AppResult<()> {
        let mut words = part.split_whitespace();
        let name = words.next().unwrap_or("");
        let value = words.next();
        let number = || -> AppResult<f64> {
            value
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| RampError::send_failed(part, "missing numeric argument"))
        };

        match name {
            "VSET" => self.volt_set = number()?,
            "ISET" => self.amp_limit = number()?,
            "OVSET" => self.volt_limit = number()?,
            "OCP" => self.overcurrent_trip = number()? != 0.0,
            "OUT" | "RST" | "CLR" => {
                self.volt_set = 0.0;
                self.tripped = false;
            }
            "" => {}
            other => {
                return Err(RampError::send_failed(
                    part,
                    format!("unknown command '{other}'"),
                ))
            }
        }
        Ok(())
    }

    fn output_volt(&self) -> f64 {
        if self.tripped {
            0.0
        } else {
            self.volt_set.min(self.volt_limit)
        }
    }

    fn output_amp(&mut self) -> f64 {
        let demand = if self.load_ohms > 0.0 {
            self.output_volt() / self.load_ohms
        } else {
            0.0
        };
        if demand > self.amp_limit && self.overcurrent_trip {
            self.tripped = true;
            return 0.0;
        }
        demand.min(self.amp_limit)
    }
}

impl Default for MockSupply {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentLink for MockSupply {
    fn send(&mut self, command: &str) -> AppResult<()> {
        if self.record(command) == Some(FaultKind::Fail) {
            return Err(RampError::send_failed(command, "mock bus failure"));
        }
        for part in command.split(';') {
            self.apply_setting(part)?;
        }
        Ok(())
    }

    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        match self.record(command) {
            Some(FaultKind::Fail) => {
                return Err(RampError::query_failed(command, "mock bus failure"))
            }
            Some(FaultKind::Garbage) => return Ok("\u{fffd}?\r\n".to_string()),
            None => {}
        }
        match Self::command_word(command) {
            "VOUT?" => Ok(format!("{:7.3}\r\n", self.output_volt())),
            "IOUT?" => Ok(format!("{:7.4}\r\n", self.output_amp())),
            other => Err(RampError::query_failed(
                command,
                format!("unknown query '{other}'"),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("MockSupply (load: {} Ω)", self.load_ohms)
    }
}

// =============================================================================
// ScriptedKeys - Replayed Operator Input
// =============================================================================

/// Key source that replays a fixed script of poll results
///
/// Each poll consumes one entry; once exhausted every poll returns `None`.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    polls: VecDeque<Option<Key>>,
    poll_count: Arc<Mutex<usize>>,
}

impl ScriptedKeys {
    /// Replay the given poll results in order
    pub fn new(polls: impl IntoIterator<Item = Option<Key>>) -> Self {
        Self {
            polls: polls.into_iter().collect(),
            poll_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Never report a key
    pub fn silent() -> Self {
        Self::default()
    }

    /// Report `key` on the `poll`-th (1-based) poll and nothing before it
    pub fn at_poll(poll: usize, key: Key) -> Self {
        let mut polls: Vec<Option<Key>> = vec![None; poll.saturating_sub(1)];
        polls.push(Some(key));
        Self::new(polls)
    }

    /// Shared handle on the number of polls seen so far
    pub fn poll_count_handle(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.poll_count)
    }
}

impl KeySource for ScriptedKeys {
    fn poll_nonblocking(&mut self) -> Option<Key> {
        *lock(&self.poll_count) += 1;
        self.polls.pop_front().flatten()
    }
}

// =============================================================================
// RecordingPlot - Captured Plot Scripts
// =============================================================================

/// Plot sink that records scripts instead of drawing them
#[derive(Debug, Default)]
pub struct RecordingPlot {
    scripts: Arc<Mutex<Vec<String>>>,
    failing: bool,
}

impl RecordingPlot {
    /// Create a recording sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink whose every `apply` fails, like a plot process that died
    pub fn failing() -> Self {
        Self {
            scripts: Arc::default(),
            failing: true,
        }
    }

    /// Shared handle on the recorded scripts
    pub fn scripts_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.scripts)
    }
}

impl PlotSink for RecordingPlot {
    fn apply(&mut self, script: &str) -> AppResult<()> {
        if self.failing {
            return Err(RampError::PlottingUnavailable("broken pipe".to_string()));
        }
        lock(&self.scripts).push(script.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_command_applies_every_part() {
        let mut supply = MockSupply::new().with_load(1.0);
        supply
            .send("VSET 3.000000;ISET 0.500000;OVSET 10.000000;OCP 0")
            .unwrap();
        assert_eq!(supply.setpoint(), 3.0);
        assert_eq!(supply.query("VOUT?").unwrap(), 3.0);
        // 3 A demanded, limited to 0.5 A
        assert_eq!(supply.query("IOUT?").unwrap(), 0.5);
    }

    #[test]
    fn test_overcurrent_trip_drops_output() {
        let mut supply = MockSupply::new().with_load(1.0);
        supply.send("VSET 3;ISET 0.5;OVSET 10;OCP 1").unwrap();
        assert_eq!(supply.query("IOUT?").unwrap(), 0.0);
        assert_eq!(supply.query("VOUT?").unwrap(), 0.0);
    }

    #[test]
    fn test_responses_are_framed() {
        let mut supply = MockSupply::new();
        supply.send("VSET 12.009").unwrap();
        assert_eq!(supply.query_raw("VOUT?").unwrap(), " 12.009\r\n");
    }

    #[test]
    fn test_fault_is_one_shot() {
        let mut supply = MockSupply::new().fail_on("VOUT?", 1);
        assert!(supply.query("VOUT?").is_err());
        assert!(supply.query("VOUT?").is_ok());
    }

    #[test]
    fn test_garbage_reading() {
        let mut supply = MockSupply::new().garbage_on("IOUT?", 1);
        let err = supply.query("IOUT?").unwrap_err();
        assert!(matches!(err, RampError::MalformedReading { .. }));
    }

    #[test]
    fn test_reset_is_logged_and_zeroes_output() {
        let mut supply = MockSupply::new();
        supply.send("VSET 4").unwrap();
        supply.reset().unwrap();
        assert_eq!(supply.setpoint(), 0.0);
        assert_eq!(supply.call_log(), vec!["VSET 4", "OUT 0;RST;CLR"]);
    }

    #[test]
    fn test_scripted_keys() {
        let mut keys = ScriptedKeys::at_poll(3, Key::Char('q'));
        assert_eq!(keys.poll_nonblocking(), None);
        assert_eq!(keys.poll_nonblocking(), None);
        assert_eq!(keys.poll_nonblocking(), Some(Key::Char('q')));
        assert_eq!(keys.poll_nonblocking(), None);
        assert_eq!(*keys.poll_count_handle().lock().unwrap(), 4);
    }
}
