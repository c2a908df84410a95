//! Integration tests for the coordinator against fake MCP servers.

use std::time::Duration;

use agent_notch::rpc::RpcRequest;
use agent_notch::supervisor::{CoordinatorHandle, CoordinatorSnapshot, McpCoordinator, ServerState};

use crate::support::{notch_config, write_script, BUILD_SERVER, SILENT_SERVER};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_until(
    handle: &CoordinatorHandle,
    mut condition: impl FnMut(&CoordinatorSnapshot) -> bool,
) -> CoordinatorSnapshot {
    let mut updates = handle.subscribe();
    let snapshot = tokio::time::timeout(WAIT_TIMEOUT, updates.wait_for(|s| condition(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("coordinator closed");
    snapshot.clone()
}

#[tokio::test]
async fn xcode_build_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "server.sh", BUILD_SERVER);
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    let running = handle.snapshot();
    assert_eq!(running.state, ServerState::Running);
    assert!(running.pid.is_some());

    let request = RpcRequest::tool_call(1, "xcode_build", serde_json::Map::new());
    handle
        .send_line(serde_json::to_string(&request).unwrap())
        .await
        .unwrap();

    let snapshot = wait_until(&handle, |s| s.last_build_result.is_some()).await;
    let build = snapshot.last_build_result.unwrap();
    assert!(build.success);
    assert_eq!(build.duration_ms, Some(5000));
    assert_eq!(snapshot.current_build_time, Some(Duration::from_secs(5)));

    let call = &snapshot.recent_tool_calls[0];
    assert_eq!(call.tool_name, "xcode_build");
    assert!(call.is_success());
    assert!(!call.is_active());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_is_noop_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "server.sh", SILENT_SERVER);
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    let pid = handle.snapshot().pid;
    handle.start().await.unwrap();
    assert_eq!(handle.snapshot().pid, pid);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_is_not_reported_as_crash() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "server.sh", SILENT_SERVER);
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    handle.stop().await.unwrap();
    assert_eq!(handle.snapshot().state, ServerState::Stopped);

    // The SIGTERM exit arrives after the stop and must be ignored.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, ServerState::Stopped);
    assert_eq!(snapshot.restart_attempts, 0);
    assert!(snapshot.pid.is_none());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn clean_exit_stops_without_restart() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "server.sh", "exit 0\n");
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    let snapshot = wait_until(&handle, |s| s.state == ServerState::Stopped).await;
    assert_eq!(snapshot.restart_attempts, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn crash_restarts_until_limit() {
    let dir = tempfile::tempdir().unwrap();
    let launches = dir.path().join("launches");
    let script = write_script(
        dir.path(),
        "server.sh",
        &format!("echo run >> '{}'\necho boom >&2\nexit 2\n", launches.display()),
    );
    let mut config = notch_config(script, dir.path());
    config.restart.max_attempts = 1;
    let handle = McpCoordinator::spawn(&config);

    handle.start().await.unwrap();
    let crashed = wait_until(&handle, |s| matches!(s.state, ServerState::Crashed(_))).await;
    assert_eq!(crashed.state.display_text(), "Crashed: Exit code: 2");
    assert_eq!(crashed.restart_attempts, 1);
    assert!(crashed.error_output.contains("boom"));

    // One restart after 1s, then the limit stops further attempts.
    tokio::time::sleep(Duration::from_millis(3000)).await;
    let snapshot = handle.snapshot();
    assert!(matches!(snapshot.state, ServerState::Crashed(_)));
    assert_eq!(snapshot.restart_attempts, 1);

    let runs = std::fs::read_to_string(&launches).unwrap();
    assert_eq!(runs.lines().count(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn no_restart_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let launches = dir.path().join("launches");
    let script = write_script(
        dir.path(),
        "server.sh",
        &format!("echo run >> '{}'\nexit 1\n", launches.display()),
    );
    let mut config = notch_config(script, dir.path());
    config.restart.auto_restart = false;
    let handle = McpCoordinator::spawn(&config);

    handle.start().await.unwrap();
    wait_until(&handle, |s| matches!(s.state, ServerState::Crashed(_))).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(std::fs::read_to_string(&launches).unwrap().lines().count(), 1);
    assert_eq!(handle.snapshot().restart_attempts, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn stderr_telemetry_tracks_tool_calls() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "server.sh",
        r#"echo 'booting' >&2
echo '{"event":"tool_start","tool":"xcode_run","id":"r1"}' >&2
echo '{"event":"tool_end","tool":"xcode_run","id":"r1","success":true,"duration_ms":1500,"tokens":42}' >&2
exec cat > /dev/null
"#,
    );
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    let snapshot = wait_until(&handle, |s| {
        s.recent_tool_calls.first().is_some_and(|c| !c.is_active())
    })
    .await;

    let call = &snapshot.recent_tool_calls[0];
    assert_eq!(call.tool_name, "xcode_run");
    assert_eq!(call.token_count, Some(42));
    assert_eq!(snapshot.token_totals.tokens, 42);
    assert_eq!(snapshot.current_build_time, Some(Duration::from_millis(1500)));
    assert!(snapshot.error_output.contains("booting"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_force_completes_active_calls() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "server.sh",
        r#"echo '{"event":"tool_start","tool":"xcode_build","id":"b1"}' >&2
exec cat > /dev/null
"#,
    );
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    wait_until(&handle, |s| s.recent_tool_calls.iter().any(|c| c.is_active())).await;

    handle.stop().await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.recent_tool_calls.len(), 1);
    assert!(snapshot.recent_tool_calls.iter().all(|c| !c.is_active()));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_launches_new_process() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "server.sh", SILENT_SERVER);
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    let first = handle.snapshot().pid;
    handle.restart().await.unwrap();
    let second = handle.snapshot();

    assert_eq!(second.state, ServerState::Running);
    assert!(second.pid.is_some());
    assert_ne!(second.pid, first);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn output_written_while_stopping_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "server.sh",
        r#"late='{"event":"tool_start","tool":"late","id":"z"}'
trap 'echo "$late" >&2; exit 0' TERM
while :; do sleep 0.1; done
"#,
    );
    let handle = McpCoordinator::spawn(&notch_config(script, dir.path()));

    handle.start().await.unwrap();
    // Give the shell time to install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, ServerState::Stopped);
    assert!(snapshot.recent_tool_calls.iter().all(|c| !c.is_active()));
    assert!(snapshot.recent_tool_calls.is_empty());
    assert!(!snapshot.error_output.contains("late"));

    handle.shutdown().await.unwrap();
}
