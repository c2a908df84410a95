//! Tracker module tests.

mod tracker_test;

/// Verify all public tracker types are exported from the library.
#[test]
fn all_tracker_types_exported() {
    use agent_notch::tracker::{
        format_duration, is_build_tool, PendingCall, TelemetrySource, TokenTotals, ToolCall,
        ToolCallResult, ToolCallTracker, ToolEvent, BUILD_TOOLS, DEFAULT_MAX_RECENT_CALLS,
    };

    let _ = ToolCallTracker::new(DEFAULT_MAX_RECENT_CALLS);
    let _ = ToolCall::new("x").with_source(TelemetrySource::Codex);
    let _ = ToolCallResult::success("");
    let _ = TokenTotals::default();
    let _: Option<(PendingCall, ToolEvent)> = None;
    assert!(is_build_tool(BUILD_TOOLS[0]));
    assert_eq!(format_duration(std::time::Duration::from_millis(5)), "5ms");
}
