// SPDX-License-Identifier: Apache-2.0

//! The simulation lifecycle finite-state machine (C1).
//!
//! A single state variable with a fixed transition table, a capability set
//! of hooks (`LifecycleHooks`) run around transitions, and an after-state-
//! change callback used by the synchronizer (`nrp-sync`) to mirror state
//! across the broker. The FSM itself is synchronous and has no knowledge of
//! the broker, processes, or scripts — those are supplied by whichever
//! `LifecycleHooks` implementation is plugged in (grounded on the
//! teacher's trait-object adapter pattern, e.g. `AgentAdapter`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six states a simulation can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Paused,
    Started,
    Completed,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub const INITIAL: LifecycleState = LifecycleState::Created;

    pub fn is_final(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            LifecycleState::Created
                | LifecycleState::Paused
                | LifecycleState::Started
                | LifecycleState::Completed
        )
    }

    pub fn is_error(self) -> bool {
        matches!(self, LifecycleState::Failed)
    }
}

crate::simple_display! {
    LifecycleState {
        Created => "created",
        Paused => "paused",
        Started => "started",
        Completed => "completed",
        Stopped => "stopped",
        Failed => "failed",
    }
}

/// A named trigger that drives the lifecycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTrigger {
    Initialized,
    Started,
    Paused,
    Completed,
    Stopped,
    Failed,
}

crate::simple_display! {
    LifecycleTrigger {
        Initialized => "initialized",
        Started => "started",
        Paused => "paused",
        Completed => "completed",
        Stopped => "stopped",
        Failed => "failed",
    }
}

impl LifecycleTrigger {
    /// Every trigger has exactly one destination state, independent of source
    /// (this is what makes self-transitions idempotent: firing a trigger
    /// while already at its destination is always a no-op).
    fn destination(self) -> LifecycleState {
        match self {
            LifecycleTrigger::Initialized => LifecycleState::Paused,
            LifecycleTrigger::Started => LifecycleState::Started,
            LifecycleTrigger::Paused => LifecycleState::Paused,
            LifecycleTrigger::Completed => LifecycleState::Completed,
            LifecycleTrigger::Stopped => LifecycleState::Stopped,
            LifecycleTrigger::Failed => LifecycleState::Failed,
        }
    }

    /// Source states from which this trigger is valid (see spec §4.1 table).
    fn valid_sources(self) -> &'static [LifecycleState] {
        use LifecycleState::*;
        match self {
            LifecycleTrigger::Initialized => &[Created],
            LifecycleTrigger::Started => &[Paused],
            LifecycleTrigger::Paused => &[Started],
            LifecycleTrigger::Completed => &[Started],
            LifecycleTrigger::Stopped => &[Created, Paused, Started, Completed],
            LifecycleTrigger::Failed => &[Created, Paused, Started, Completed],
        }
    }

    fn before_hook(self, source: LifecycleState) -> Option<Hook> {
        match self {
            LifecycleTrigger::Initialized => Some(Hook::Initialize),
            LifecycleTrigger::Started => Some(Hook::Start),
            LifecycleTrigger::Paused => Some(Hook::Pause),
            LifecycleTrigger::Completed => None,
            LifecycleTrigger::Stopped => Some(Hook::Stop),
            // failed() has a before=stop only when coming from `created`;
            // from the running states it instead has an after=fail.
            LifecycleTrigger::Failed if source == LifecycleState::Created => Some(Hook::Stop),
            LifecycleTrigger::Failed => None,
        }
    }

    fn after_hook(self, source: LifecycleState) -> Option<Hook> {
        match self {
            LifecycleTrigger::Failed if source != LifecycleState::Created => Some(Hook::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Initialize,
    Start,
    Pause,
    Stop,
    Fail,
}

/// Error returned by a hook implementation. Carries only a message: the
/// concrete cause (process spawn failure, script compile error, broker
/// disconnect, ...) is logged by the hook itself before returning this.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors surfaced by [`Lifecycle::trigger`].
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("trigger `{trigger}` is not valid from state `{source}`")]
    InvalidTransition { trigger: LifecycleTrigger, source: LifecycleState },
    #[error("lifecycle hook failed: {0}")]
    HookFailed(#[from] HookError),
}

/// The capability set a concrete lifecycle (backend or worker) supplies to
/// the generic FSM. Avoids inheritance per spec §9's design note: both
/// sides implement the same five hook names, wired in at construction.
pub trait LifecycleHooks: Send {
    fn initialize(&mut self) -> Result<(), HookError> {
        Ok(())
    }
    fn start(&mut self) -> Result<(), HookError> {
        Ok(())
    }
    fn pause(&mut self) -> Result<(), HookError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), HookError> {
        Ok(())
    }
    fn fail(&mut self) -> Result<(), HookError> {
        Ok(())
    }
    /// Invoked once, after the terminal-state grace period has elapsed.
    /// Not part of the transition table itself — see [`Lifecycle::take_shutdown_grace`].
    fn shutdown(&mut self) {}
}

/// Describes a transition that just occurred, passed to the after-state-
/// change listener (consumed by the synchronizer in `nrp-sync`).
#[derive(Debug, Clone, Copy)]
pub struct StateChange {
    pub source: LifecycleState,
    pub trigger: LifecycleTrigger,
    pub destination: LifecycleState,
    /// True when this transition must not be published (it was itself
    /// caused by an incoming synchronization message, or the caller asked
    /// for a silent trigger explicitly).
    pub silent: bool,
}

type ChangeListener = Box<dyn FnMut(&StateChange) + Send>;

/// The replicated finite-state machine itself.
pub struct Lifecycle<H: LifecycleHooks> {
    state: LifecycleState,
    hooks: H,
    on_change: Option<ChangeListener>,
    shutdown_grace_pending: bool,
}

impl<H: LifecycleHooks> Lifecycle<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            state: LifecycleState::INITIAL,
            hooks,
            on_change: None,
            shutdown_grace_pending: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Register the single after-state-change listener.
    pub fn set_on_change(&mut self, listener: ChangeListener) {
        self.on_change = Some(listener);
    }

    /// Fire a trigger, propagating the resulting state change (unless it
    /// turns out to be a self-transition, which is never propagated).
    pub fn trigger(&mut self, trigger: LifecycleTrigger) -> Result<(), LifecycleError> {
        self.trigger_internal(trigger, false)
    }

    /// Fire a trigger without propagating it — used by the synchronizer
    /// when applying an incoming remote transition (spec §4.2 step 4).
    pub fn trigger_silent(&mut self, trigger: LifecycleTrigger) -> Result<(), LifecycleError> {
        self.trigger_internal(trigger, true)
    }

    /// Force the local state variable directly, bypassing hooks and the
    /// transition table. Used by the synchronizer to resolve divergence
    /// (spec §4.2 steps 3 and 5) — never called from ordinary application code.
    pub fn force_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// True once a terminal state has just been reached and the ~1s grace
    /// period + `shutdown()` hook invocation is owed. Consumed exactly once;
    /// the async driver around this FSM is responsible for the actual sleep
    /// (the FSM itself stays synchronous and runtime-agnostic).
    pub fn take_shutdown_grace(&mut self) -> bool {
        std::mem::take(&mut self.shutdown_grace_pending)
    }

    fn trigger_internal(
        &mut self,
        trigger: LifecycleTrigger,
        silent_request: bool,
    ) -> Result<(), LifecycleError> {
        let source = self.state;

        // Idempotent self-transition: firing a trigger whose destination is
        // already our current state always succeeds silently (R1) and is
        // never propagated, regardless of whether `source` is formally one
        // of the trigger's valid sources.
        if source == trigger.destination() {
            return Ok(());
        }

        if !trigger.valid_sources().contains(&source) {
            return Err(LifecycleError::InvalidTransition { trigger, source });
        }

        if let Some(hook) = trigger.before_hook(source) {
            if let Err(e) = self.run_hook(hook) {
                return self.recover_from_hook_failure(e);
            }
        }

        let destination = trigger.destination();
        self.state = destination;

        if let Some(hook) = trigger.after_hook(source) {
            if let Err(e) = self.run_hook(hook) {
                // State has already committed to `destination`; nothing
                // further to roll back. Surface the failure as-is.
                return Err(LifecycleError::HookFailed(e));
            }
        }

        let silent = silent_request;
        if let Some(listener) = self.on_change.as_mut() {
            listener(&StateChange { source, trigger, destination, silent });
        }

        if destination.is_final() {
            self.shutdown_grace_pending = true;
        }

        Ok(())
    }

    fn run_hook(&mut self, hook: Hook) -> Result<(), HookError> {
        match hook {
            Hook::Initialize => self.hooks.initialize(),
            Hook::Start => self.hooks.start(),
            Hook::Pause => self.hooks.pause(),
            Hook::Stop => self.hooks.stop(),
            Hook::Fail => self.hooks.fail(),
        }
    }

    /// A before-hook failed before any state commit happened. Per spec
    /// §4.1: attempt `failed()` as cleanup; if that too fails, surface the
    /// *original* error and force the state to `failed` anyway so shutdown
    /// can still proceed.
    fn recover_from_hook_failure(&mut self, original: HookError) -> Result<(), LifecycleError> {
        match self.trigger_internal(LifecycleTrigger::Failed, false) {
            Ok(()) => Err(LifecycleError::HookFailed(original)),
            Err(_) => {
                self.state = LifecycleState::Failed;
                self.shutdown_grace_pending = true;
                Err(LifecycleError::HookFailed(original))
            }
        }
    }
}

impl<H: LifecycleHooks> fmt::Debug for Lifecycle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle").field("state", &self.state).finish()
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
