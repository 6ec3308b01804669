//! Worker process pool.
//!
//! Owns the child processes behind both service variants. Each unit of work
//! maps to one worker spawned with piped stdio:
//! - a stdout pump thread splits the pipe into newline-delimited records and
//!   publishes each as a `Data` event, preserving pipe order,
//! - a stderr pump thread publishes diagnostics as `Error` events,
//! - an exit monitor joins both pumps, reaps the child, removes the pool
//!   entry and publishes the terminal `Close` event.
//!
//! Unit lifecycle is `Spawning → Running → Exited`; a spawn failure skips
//! `Running` (the unit never enters the pool) and is reported as an `Error`
//! followed by `Close` so it stays scoped to that unit.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use super::events::{EventBus, UnitEvent};

/// Lifecycle state of one unit's worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// `Command::spawn` has not returned yet.
    Spawning,
    /// Worker is live; stdio pumps are attached.
    Running,
    /// Worker exited (or never spawned). Carries the exit code when known.
    Exited(Option<i32>),
}

struct UnitEntry {
    unit_id: String,
    child: Arc<Mutex<Child>>,
    /// Owned exclusively by the pool; no other component may write to a
    /// worker's stdin.
    stdin: Option<ChildStdin>,
    state: Arc<Mutex<UnitState>>,
}

/// Bounded-lifetime pool of worker processes, keyed by unit id.
///
/// Admission policy (concurrency ceilings, duplicate handling) belongs to
/// the owning service; the pool itself only guarantees one live worker per
/// id and cleanup on exit.
pub struct ProcessPool {
    /// Log prefix, e.g. "MODEL_SVC".
    tag: &'static str,
    units: Arc<Mutex<Vec<UnitEntry>>>,
    bus: Arc<EventBus>,
}

impl ProcessPool {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            units: Arc::new(Mutex::new(Vec::new())),
            bus: Arc::new(EventBus::new()),
        }
    }

    /// Number of live units.
    pub fn len(&self) -> usize {
        self.units.lock().map(|units| units.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.units
            .lock()
            .map(|units| units.iter().any(|entry| entry.unit_id == unit_id))
            .unwrap_or(false)
    }

    /// Live unit ids, in insertion order.
    pub fn unit_ids(&self) -> Vec<String> {
        self.units
            .lock()
            .map(|units| units.iter().map(|entry| entry.unit_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Lifecycle state of a unit, `None` once its pool entry is gone.
    pub fn unit_state(&self, unit_id: &str) -> Option<UnitState> {
        let units = self.units.lock().ok()?;
        let entry = units.iter().find(|entry| entry.unit_id == unit_id)?;
        entry.state.lock().ok().map(|state| *state)
    }

    /// Attach a listener for one unit id.
    pub fn subscribe(&self, unit_id: &str) -> Receiver<UnitEvent> {
        self.bus.subscribe(unit_id)
    }

    /// Drop the listener for one unit id.
    pub fn unsubscribe(&self, unit_id: &str) {
        self.bus.unsubscribe(unit_id)
    }

    /// Spawn a worker for `unit_id` and wire up its event pumps.
    ///
    /// The caller is responsible for admission checks; this method assumes
    /// the id is not already in the pool. An OS-level spawn failure is
    /// reported as `Error` + `Close` events for the unit rather than an
    /// error return: it is a worker failure, not a service failure.
    pub fn spawn_unit(&self, unit_id: &str, mut command: Command) {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::info!("[{}] spawning worker for unit {unit_id}", self.tag);

        let state = Arc::new(Mutex::new(UnitState::Spawning));
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                log::warn!("[{}] failed to spawn worker for unit {unit_id}: {err}", self.tag);
                set_state(&state, UnitState::Exited(None));
                self.bus
                    .publish(unit_id, UnitEvent::Error(format!("Failed to spawn worker: {err}")));
                self.bus.publish(unit_id, UnitEvent::Close(None));
                return;
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        set_state(&state, UnitState::Running);

        let stdout_pump = stdout.map(|out| {
            let bus = self.bus.clone();
            let id = unit_id.to_string();
            thread::spawn(move || pump_stdout(out, &id, &bus))
        });
        let stderr_pump = stderr.map(|err| {
            let bus = self.bus.clone();
            let id = unit_id.to_string();
            thread::spawn(move || pump_stderr(err, &id, &bus))
        });

        let child = Arc::new(Mutex::new(child));
        if let Ok(mut units) = self.units.lock() {
            units.push(UnitEntry {
                unit_id: unit_id.to_string(),
                child: child.clone(),
                stdin,
                state: state.clone(),
            });
        }

        // Exit monitor. Joining the pumps first guarantees every Data/Error
        // event is published before the terminal Close.
        let units = self.units.clone();
        let bus = self.bus.clone();
        let id = unit_id.to_string();
        let tag = self.tag;
        thread::spawn(move || {
            if let Some(pump) = stdout_pump {
                let _ = pump.join();
            }
            if let Some(pump) = stderr_pump {
                let _ = pump.join();
            }
            let code = reap(&child);
            set_state(&state, UnitState::Exited(code));
            if let Ok(mut units) = units.lock() {
                units.retain(|entry| entry.unit_id != id);
            }
            log::info!("[{tag}] worker for unit {id} exited (code {code:?})");
            bus.publish(&id, UnitEvent::Close(code));
        });
    }

    /// Kill a unit's worker and drop its pool entry.
    ///
    /// Returns `false` when the id is unknown (already exited or never
    /// created). Immediate forcible termination; the exit monitor reaps the
    /// process and publishes `Close` to whoever is still subscribed.
    pub fn kill_unit(&self, unit_id: &str) -> bool {
        let entry = match self.units.lock() {
            Ok(mut units) => match units.iter().position(|entry| entry.unit_id == unit_id) {
                Some(index) => units.remove(index),
                None => return false,
            },
            Err(_) => return false,
        };
        log::info!("[{}] killing worker for unit {unit_id}", self.tag);
        if let Ok(mut child) = entry.child.lock() {
            let _ = child.kill();
        }
        // Dropping the entry closes our end of the worker's stdin
        true
    }

    /// Write one already-framed line to the unit's stdin.
    ///
    /// Returns `false` when the id is unknown. Writes are fire-and-forget:
    /// a broken pipe is logged and otherwise ignored, since worker death is
    /// reported by the exit monitor.
    pub fn write_line(&self, unit_id: &str, line: &str) -> bool {
        let mut units = match self.units.lock() {
            Ok(units) => units,
            Err(_) => return false,
        };
        let entry = match units.iter_mut().find(|entry| entry.unit_id == unit_id) {
            Some(entry) => entry,
            None => return false,
        };
        match entry.stdin.as_mut() {
            Some(stdin) => {
                if let Err(err) = stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush()) {
                    log::warn!("[{}] stdin write to unit {unit_id} failed: {err}", self.tag);
                }
            }
            None => {
                log::warn!("[{}] unit {unit_id} has no stdin handle", self.tag);
            }
        }
        true
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        if let Ok(mut units) = self.units.lock() {
            for entry in units.drain(..) {
                if let Ok(mut child) = entry.child.lock() {
                    let _ = child.kill();
                    let _ = child.wait(); // Reap
                }
            }
        }
    }
}

/// Frame one record as a JSON line for a worker's stdin.
pub fn encode_record(record: &serde_json::Value) -> Result<String, serde_json::Error> {
    Ok(format!("{}\n", serde_json::to_string(record)?))
}

fn set_state(state: &Arc<Mutex<UnitState>>, next: UnitState) {
    if let Ok(mut state) = state.lock() {
        *state = next;
    }
}

/// Split the worker's stdout into records and publish them in pipe order.
/// A chunk carrying several newline-delimited records becomes one `Data`
/// event per record.
fn pump_stdout(stdout: ChildStdout, unit_id: &str, bus: &EventBus) {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        match line {
            Ok(line) if !line.is_empty() => {
                bus.publish(unit_id, UnitEvent::Data(format!("{line}\n")));
            }
            Ok(_) => {}
            Err(_) => break, // pipe gone; the monitor reports the exit
        }
    }
}

fn pump_stderr(stderr: ChildStderr, unit_id: &str, bus: &EventBus) {
    let reader = BufReader::new(stderr);
    for line in reader.lines() {
        match line {
            Ok(line) if !line.trim().is_empty() => {
                bus.publish(unit_id, UnitEvent::Error(line));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

/// Wait for the child to exit without holding its lock, so a concurrent
/// `kill_unit` can still reach it.
fn reap(child: &Arc<Mutex<Child>>) -> Option<i32> {
    loop {
        match child.lock() {
            Ok(mut child) => match child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) => {}
                Err(_) => return None,
            },
            Err(_) => return None,
        }
        thread::sleep(Duration::from_millis(20));
    }
}
