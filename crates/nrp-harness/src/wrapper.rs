// SPDX-License-Identifier: Apache-2.0

//! `EngineWrapper` — the cooperative core exposed to the user script as
//! `nrp` (spec §4.5). Blocks at `run_loop` entry until unpaused, raises the
//! internal stop/timeout signals the executor translates into lifecycle
//! triggers, and exposes read-only simulation/real time accessors.

use crate::engine::EngineClient;
use crate::error::HarnessError;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A level-triggered gate: `run_loop` blocks in [`PauseGate::wait_until_set`]
/// for as long as the gate is clear. Cheap to clone; all clones observe the
/// same underlying state.
#[derive(Clone)]
pub struct PauseGate(Arc<(Mutex<bool>, Condvar)>);

impl PauseGate {
    pub fn new() -> Self {
        Self(Arc::new((Mutex::new(false), Condvar::new())))
    }

    pub fn set(&self) {
        *self.0 .0.lock() = true;
        self.0 .1.notify_all();
    }

    pub fn clear(&self) {
        *self.0 .0.lock() = false;
    }

    pub fn wait_until_set(&self) {
        let mut guard = self.0 .0.lock();
        while !*guard {
            self.0 .1.wait(&mut guard);
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// A one-shot "please stop" flag. Never cleared once set (spec §4.5: "a
/// ... one-shot `stopped` event").
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raised by [`EngineWrapper::run_loop`] when `stopped` was observed at
/// entry (spec §4.5 step 2). Benign: the executor logs it and exits.
#[derive(Debug, Clone)]
pub struct StopExecution;

/// Raised by [`EngineWrapper::run_loop`] when the requested chunk would
/// exceed `max_timesteps` (spec §4.5 step 3, and B1/B2). No partial
/// execution ever happens when this is raised.
#[derive(Debug, Clone)]
pub struct SimulationTimeout;

/// Wall-clock and simulation-time accounting shared between the wrapper and
/// the status ticker (spec §4.5, §3's status message).
struct Clock {
    timesteps_done: AtomicU64,
    elapsed_ns: AtomicU64,
    is_running: AtomicBool,
    /// Set when `is_running`; read by `real_time` to add in-flight elapsed
    /// time without waiting for the current step to finish.
    start: Mutex<Option<Instant>>,
}

/// The cooperative step core. One instance per simulation, shared (cloned)
/// between the executor thread (which calls `run_loop` from inside the
/// user script) and the status ticker (which reads the read-only
/// accessors).
#[derive(Clone)]
pub struct EngineWrapper<E: EngineClient> {
    engine: Arc<Mutex<E>>,
    runtime: tokio::runtime::Handle,
    paused: PauseGate,
    stopped: StopFlag,
    max_timesteps: u64,
    timestep: f64,
    clock: Arc<Clock>,
}

impl<E: EngineClient + 'static> EngineWrapper<E> {
    pub fn new(
        engine: Arc<Mutex<E>>,
        runtime: tokio::runtime::Handle,
        paused: PauseGate,
        stopped: StopFlag,
        max_timesteps: u64,
        timestep: f64,
    ) -> Self {
        Self {
            engine,
            runtime,
            paused,
            stopped,
            max_timesteps,
            timestep,
            clock: Arc::new(Clock {
                timesteps_done: AtomicU64::new(0),
                elapsed_ns: AtomicU64::new(0),
                is_running: AtomicBool::new(false),
                start: Mutex::new(None),
            }),
        }
    }

    fn timesteps_done(&self) -> u64 {
        self.clock.timesteps_done.load(Ordering::SeqCst)
    }

    /// `(engine result, raised)` — `raised` is `Some` iff `run_loop` must
    /// terminate the script (spec §4.5's `run_loop`). Synchronous: blocks
    /// the calling (executor) thread, never the async runtime, since the
    /// executor is a dedicated OS thread (spec §5).
    pub fn run_loop(&self, n: u64, data: Option<Value>) -> Result<Option<Value>, RunLoopSignal> {
        // Step 1: suspension point for backend-initiated pause.
        self.paused.wait_until_set();

        // Step 2: cooperative stop, checked only here (spec §5's
        // "Cancellation / timeouts").
        if self.stopped.is_set() {
            return Err(RunLoopSignal::Stopped(StopExecution));
        }

        // Step 3: no partial execution past the configured timeout (B2).
        if self.timesteps_done() + n > self.max_timesteps {
            return Err(RunLoopSignal::TimedOut(SimulationTimeout));
        }

        // Steps 4-6: delegate to the engine, tracking wall-clock time.
        let start = Instant::now();
        *self.clock.start.lock() = Some(start);
        self.clock.is_running.store(true, Ordering::SeqCst);

        let mut guard = self.engine.lock();
        let result = self.runtime.block_on(guard.run_loop(n, data));
        drop(guard);

        self.clock.elapsed_ns.fetch_add(start.elapsed().as_nanos() as u64, Ordering::SeqCst);
        self.clock.is_running.store(false, Ordering::SeqCst);
        *self.clock.start.lock() = None;

        match result {
            // Step 7: advance the counter only on success.
            Ok(value) => {
                self.clock.timesteps_done.fetch_add(n, Ordering::SeqCst);
                Ok(value)
            }
            Err(error) => Err(RunLoopSignal::EngineError(error)),
        }
    }

    /// I6: `(max - done) * timestep`, always non-negative.
    pub fn simulation_time_remaining(&self) -> f64 {
        let remaining = self.max_timesteps.saturating_sub(self.timesteps_done());
        remaining as f64 * self.timestep
    }

    pub fn simulation_time(&self) -> f64 {
        self.timesteps_done() as f64 * self.timestep
    }

    pub fn real_time(&self) -> f64 {
        let elapsed_ns = self.clock.elapsed_ns.load(Ordering::SeqCst);
        let in_flight_ns = match *self.clock.start.lock() {
            Some(start) if self.clock.is_running.load(Ordering::SeqCst) => start.elapsed().as_nanos() as u64,
            _ => 0,
        };
        (elapsed_ns + in_flight_ns) as f64 / 1e9
    }
}

/// Why `run_loop` failed to return a value (spec §4.5's exception table).
pub enum RunLoopSignal {
    Stopped(StopExecution),
    TimedOut(SimulationTimeout),
    EngineError(HarnessError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngineClient;

    fn wrapper(max_timesteps: u64, timestep: f64) -> EngineWrapper<FakeEngineClient> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let handle = runtime.handle().clone();
        std::mem::forget(runtime); // keep the runtime alive for the test's duration
        let paused = PauseGate::new();
        paused.set();
        EngineWrapper::new(
            Arc::new(Mutex::new(FakeEngineClient::new())),
            handle,
            paused,
            StopFlag::new(),
            max_timesteps,
            timestep,
        )
    }

    #[test]
    fn run_loop_advances_timesteps_done_by_exactly_n_on_success() {
        let w = wrapper(10, 0.1);
        w.run_loop(3, None).ok();
        assert_eq!(w.timesteps_done(), 3);
        assert_eq!(w.simulation_time(), 0.3);
    }

    #[test]
    fn run_loop_raises_timeout_without_advancing_on_overshoot() {
        let w = wrapper(2, 0.1);
        w.run_loop(2, None).ok();
        let result = w.run_loop(1, None);
        assert!(matches!(result, Err(RunLoopSignal::TimedOut(_))));
        assert_eq!(w.timesteps_done(), 2, "overshooting chunk must not advance the counter");
    }

    #[test]
    fn zero_timeout_raises_immediately() {
        // B1: SimulationTimeout = 0 implies max_timesteps = 0.
        let w = wrapper(0, 0.1);
        let result = w.run_loop(1, None);
        assert!(matches!(result, Err(RunLoopSignal::TimedOut(_))));
    }

    #[test]
    fn stopped_flag_is_observed_at_entry() {
        let w = wrapper(100, 0.1);
        w.stopped.set();
        let result = w.run_loop(1, None);
        assert!(matches!(result, Err(RunLoopSignal::Stopped(_))));
    }

    #[test]
    fn simulation_time_remaining_is_never_negative() {
        let w = wrapper(3, 0.5);
        w.run_loop(3, None).ok();
        assert_eq!(w.simulation_time_remaining(), 0.0);
    }

    #[test]
    fn paused_gate_blocks_until_set() {
        let gate = PauseGate::new();
        let gate2 = gate.clone();
        let handle = std::thread::spawn(move || {
            gate2.wait_until_set();
            42
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());
        gate.set();
        assert_eq!(handle.join().unwrap(), 42);
    }
}
