//! Process module tests.


/// Verify all public process types are exported from the library.
#[test]
fn all_process_types_exported() {
    use agent_notch::config::{RestartConfig, ServerConfig};
    use agent_notch::process::{
        backoff_delay, CrashMonitor, LineFramer, ProcessError, ProcessEvent, ProcessManager,
        DEFAULT_EVENT_BUFFER, DEFAULT_TERMINATE_TIMEOUT,
    };

    let _ = LineFramer::new();
    let _ = ProcessManager::channel(ServerConfig::default());
    let _ = CrashMonitor::new(&RestartConfig::default(), || {});
    let _: fn() -> ProcessError = || ProcessError::NotRunning;
    let _ = ProcessEvent::Terminated {
        generation: 1,
        code: 0,
    };

    assert_eq!(backoff_delay(1).as_secs(), 1);
    assert!(DEFAULT_EVENT_BUFFER > 0);
    assert!(DEFAULT_TERMINATE_TIMEOUT.as_millis() > 0);
}
