use super::*;

#[derive(Default)]
struct RecordingHooks {
    calls: Vec<&'static str>,
    fail_on: Option<&'static str>,
}

impl RecordingHooks {
    fn with_failure(call: &'static str) -> Self {
        Self { calls: Vec::new(), fail_on: Some(call) }
    }

    fn maybe_fail(&mut self, name: &'static str) -> Result<(), HookError> {
        self.calls.push(name);
        if self.fail_on == Some(name) {
            Err(HookError::new(format!("{name} exploded")))
        } else {
            Ok(())
        }
    }
}

impl LifecycleHooks for RecordingHooks {
    fn initialize(&mut self) -> Result<(), HookError> {
        self.maybe_fail("initialize")
    }
    fn start(&mut self) -> Result<(), HookError> {
        self.maybe_fail("start")
    }
    fn pause(&mut self) -> Result<(), HookError> {
        self.maybe_fail("pause")
    }
    fn stop(&mut self) -> Result<(), HookError> {
        self.maybe_fail("stop")
    }
    fn fail(&mut self) -> Result<(), HookError> {
        self.maybe_fail("fail")
    }
    fn shutdown(&mut self) {
        self.calls.push("shutdown");
    }
}

fn run_to_started(fsm: &mut Lifecycle<RecordingHooks>) {
    fsm.trigger(LifecycleTrigger::Initialized).unwrap();
    fsm.trigger(LifecycleTrigger::Started).unwrap();
}

#[test]
fn happy_path_reaches_completed() {
    let mut fsm = Lifecycle::new(RecordingHooks::default());
    run_to_started(&mut fsm);
    assert_eq!(fsm.state(), LifecycleState::Started);
    fsm.trigger(LifecycleTrigger::Completed).unwrap();
    assert_eq!(fsm.state(), LifecycleState::Completed);
    assert!(!fsm.take_shutdown_grace(), "completed is not terminal");
}

#[test]
fn invalid_transition_is_rejected() {
    let mut fsm = Lifecycle::new(RecordingHooks::default());
    let err = fsm.trigger(LifecycleTrigger::Started).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition { trigger: LifecycleTrigger::Started, source: LifecycleState::Created }
    ));
    assert_eq!(fsm.state(), LifecycleState::Created);
}

#[test]
fn self_transition_is_idempotent_and_not_propagated() {
    let mut fsm = Lifecycle::new(RecordingHooks::default());
    run_to_started(&mut fsm);

    let propagated = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = propagated.clone();
    fsm.set_on_change(Box::new(move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }));

    // re-firing `started` while already started must be a silent no-op:
    // no hook call, no propagation, no error.
    fsm.trigger(LifecycleTrigger::Started).unwrap();
    assert_eq!(fsm.state(), LifecycleState::Started);
    assert_eq!(propagated.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(fsm.hooks().calls.last(), Some(&"start"));
}

#[test]
fn stopped_is_idempotent_from_terminal_state() {
    let mut fsm = Lifecycle::new(RecordingHooks::default());
    run_to_started(&mut fsm);
    fsm.trigger(LifecycleTrigger::Stopped).unwrap();
    assert!(fsm.take_shutdown_grace());
    assert!(fsm.trigger(LifecycleTrigger::Stopped).is_ok());
    assert_eq!(fsm.state(), LifecycleState::Stopped);
}

#[test]
fn before_hook_failure_escalates_to_failed() {
    let mut fsm = Lifecycle::new(RecordingHooks::with_failure("start"));
    fsm.trigger(LifecycleTrigger::Initialized).unwrap();
    let err = fsm.trigger(LifecycleTrigger::Started).unwrap_err();
    assert!(matches!(err, LifecycleError::HookFailed(_)));
    assert_eq!(fsm.state(), LifecycleState::Failed);
    assert!(fsm.take_shutdown_grace());
}

#[test]
fn after_hook_failure_still_lands_in_failed_with_original_error() {
    let mut fsm = Lifecycle::new(RecordingHooks::with_failure("fail"));
    run_to_started(&mut fsm);
    let err = fsm.trigger(LifecycleTrigger::Failed).unwrap_err();
    assert!(matches!(err, LifecycleError::HookFailed(_)));
    assert_eq!(fsm.state(), LifecycleState::Failed);
}

#[test]
fn silent_trigger_does_not_propagate() {
    let mut fsm = Lifecycle::new(RecordingHooks::default());
    let propagated = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = propagated.clone();
    fsm.set_on_change(Box::new(move |change| {
        if !change.silent {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }));
    fsm.trigger_silent(LifecycleTrigger::Initialized).unwrap();
    assert_eq!(propagated.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(fsm.state(), LifecycleState::Paused);
}
