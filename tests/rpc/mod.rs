//! JSON-RPC module tests.


/// Verify all public rpc types are exported from the library.
#[test]
fn all_rpc_types_exported() {
    use agent_notch::rpc::{
        BuildResult, RpcError, RpcId, RpcMessage, RpcNotification, RpcParser, RpcRequest,
        RpcResponse, ToolCallInfo, ToolResultContent, JSONRPC_VERSION, TOOLS_CALL_METHOD,
    };

    let _ = RpcParser::new();
    let _ = RpcRequest::new(1, TOOLS_CALL_METHOD, serde_json::json!({}));
    let _ = RpcMessage::Invalid(Vec::new());
    let _: Option<(RpcError, RpcResponse, RpcNotification, BuildResult)> = None;
    let _: Option<(ToolCallInfo, ToolResultContent)> = None;
    assert_eq!(RpcId::from(1), RpcId::Int(1));
    assert_eq!(JSONRPC_VERSION, "2.0");
}
