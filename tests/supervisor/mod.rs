//! Supervisor module tests.

mod coordinator_test;

/// Verify all public supervisor types are exported from the library.
#[test]
fn all_supervisor_types_exported() {
    use agent_notch::supervisor::{
        CoordinatorError, CoordinatorHandle, CoordinatorSnapshot, McpCoordinator, ServerState,
        MAX_ERROR_OUTPUT_BYTES, RESTART_PAUSE,
    };

    let snapshot = CoordinatorSnapshot::default();
    assert_eq!(snapshot.state, ServerState::Stopped);
    assert_eq!(snapshot.restart_attempts, 0);
    let _: fn() -> CoordinatorError = || CoordinatorError::Closed;
    let _: Option<(CoordinatorHandle, McpCoordinator)> = None;
    assert_eq!(MAX_ERROR_OUTPUT_BYTES, 64 * 1024);
    assert_eq!(RESTART_PAUSE.as_millis(), 500);
}
