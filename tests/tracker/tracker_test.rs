//! Integration tests for tool call correlation over framed output.

use std::time::Duration;

use agent_notch::process::LineFramer;
use agent_notch::rpc::{RpcId, RpcMessage, RpcParser, RpcRequest};
use agent_notch::tracker::{ToolCallResult, ToolCallTracker, ToolEvent};

/// Feed raw stdout chunks through framing, classification and tracking.
fn feed_stdout(framer: &mut LineFramer, tracker: &mut ToolCallTracker, chunk: &[u8]) {
    let parser = RpcParser::new();
    for line in framer.feed(chunk) {
        match parser.parse_str(&line) {
            RpcMessage::Request(request) => tracker.record_request(&request),
            RpcMessage::Response(response) => {
                tracker.record_response(&response);
            }
            RpcMessage::Notification(_) | RpcMessage::Invalid(_) => {}
        }
    }
}

#[test]
fn xcode_build_end_to_end() {
    let mut tracker = ToolCallTracker::default();
    let mut framer = LineFramer::new();

    let mut args = serde_json::Map::new();
    args.insert("scheme".to_string(), serde_json::json!("App"));
    tracker.record_request(&RpcRequest::tool_call(1, "xcode_build", args));

    let response = br#"{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"{\"success\":true,\"durationMs\":5000}"}]}}
"#;
    // Deliver the response in two pieces.
    let (head, tail) = response.split_at(40);
    feed_stdout(&mut framer, &mut tracker, head);
    assert_eq!(tracker.pending_count(), 1);
    feed_stdout(&mut framer, &mut tracker, tail);

    let call = &tracker.recent_tool_calls()[0];
    assert_eq!(call.tool_name, "xcode_build");
    assert_eq!(call.arguments["scheme"], "App");
    assert!(call.is_success());
    assert!(call.end_time.is_some());

    let build = tracker.last_build_result().unwrap();
    assert!(build.success);
    assert_eq!(build.duration_ms, Some(5000));
    assert_eq!(tracker.current_build_time(), Some(Duration::from_secs(5)));
    assert!(!tracker.is_pending(&RpcId::Int(1)));
}

#[test]
fn interleaved_calls_match_by_id() {
    let mut tracker = ToolCallTracker::default();
    let mut framer = LineFramer::new();

    let requests = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slow"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":"two","method":"tools/call","params":{"name":"fast"}}"#,
        "\n",
    );
    feed_stdout(&mut framer, &mut tracker, requests.as_bytes());
    assert_eq!(tracker.pending_count(), 2);

    let responses = concat!(
        r#"{"jsonrpc":"2.0","id":"two","result":{"content":[{"type":"text","text":"quick"}]}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":99,"result":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"timeout"}}"#,
        "\n",
    );
    feed_stdout(&mut framer, &mut tracker, responses.as_bytes());

    let calls: Vec<(&str, Option<&ToolCallResult>)> = tracker
        .recent_tool_calls()
        .iter()
        .map(|c| (c.tool_name.as_str(), c.result.as_ref()))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("slow", Some(&ToolCallResult::failure("timeout"))),
            ("fast", Some(&ToolCallResult::success("quick"))),
        ]
    );
    assert_eq!(tracker.pending_count(), 0);
}

#[test]
fn stderr_telemetry_mixed_with_logs() {
    let mut tracker = ToolCallTracker::default();
    let mut framer = LineFramer::new();
    let stderr = concat!(
        "INFO starting build\n",
        r#"{"event":"tool_start","tool":"xcode_build","id":"b1"}"#,
        "\n",
        "WARN deprecated API\n",
        r#"{"event":"tool_end","tool":"xcode_build","id":"b1","success":true,"duration_ms":1500,"tokens":42}"#,
        "\n",
    );

    for line in framer.feed(stderr.as_bytes()) {
        if let Some(event) = ToolEvent::parse_line(&line) {
            tracker.apply_event(event);
        }
    }

    assert_eq!(tracker.recent_tool_calls().len(), 1);
    let call = &tracker.recent_tool_calls()[0];
    assert!(call.is_success());
    assert_eq!(call.token_count, Some(42));
    assert_eq!(tracker.current_build_time(), Some(Duration::from_millis(1500)));
    assert_eq!(tracker.token_totals().tokens, 42);
}

#[test]
fn cap_holds_under_load() {
    let mut tracker = ToolCallTracker::new(5);
    let mut framer = LineFramer::new();

    for i in 0..20 {
        let exchange = format!(
            "{}\n{}\n",
            serde_json::json!({"jsonrpc":"2.0","id":i,"method":"tools/call","params":{"name":format!("t{i}")}}),
            serde_json::json!({"jsonrpc":"2.0","id":i,"result":{}}),
        );
        feed_stdout(&mut framer, &mut tracker, exchange.as_bytes());
        assert!(tracker.recent_tool_calls().len() <= 5);
    }

    assert_eq!(tracker.recent_tool_calls()[0].tool_name, "t19");
    assert_eq!(tracker.recent_tool_calls()[4].tool_name, "t15");
}
