//! Correlation of tool requests with their outcomes.
//!
//! Two paths feed the tracker. JSON-RPC `tools/call` requests are matched to
//! responses by [`RpcId`]; stderr telemetry events are matched by string id.
//! Both end up in one bounded list of recent calls, newest first.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rpc::{BuildResult, RpcId, RpcParser, RpcRequest, RpcResponse};

use super::{ToolCall, ToolCallResult, ToolEvent};

/// Default number of recent calls kept.
pub const DEFAULT_MAX_RECENT_CALLS: usize = 10;

/// A `tools/call` request waiting for its response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub tool_name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub start_time: DateTime<Utc>,
}

/// Token and cost sums over the recent calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Tracks in-flight and recently finished tool calls.
#[derive(Debug)]
pub struct ToolCallTracker {
    parser: RpcParser,
    pending_calls: HashMap<RpcId, PendingCall>,
    pending_events: HashMap<String, ToolCall>,
    recent: VecDeque<ToolCall>,
    max_recent_calls: usize,
    current_build_time: Option<Duration>,
    last_build_result: Option<BuildResult>,
}

impl Default for ToolCallTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECENT_CALLS)
    }
}

impl ToolCallTracker {
    #[must_use]
    pub fn new(max_recent_calls: usize) -> Self {
        Self {
            parser: RpcParser::new(),
            pending_calls: HashMap::new(),
            pending_events: HashMap::new(),
            recent: VecDeque::with_capacity(max_recent_calls + 1),
            max_recent_calls,
            current_build_time: None,
            last_build_result: None,
        }
    }

    /// Remember a `tools/call` request until its response arrives.
    ///
    /// Requests for other methods, or without an id, are ignored.
    pub fn record_request(&mut self, request: &RpcRequest) {
        self.record_request_at(request, Utc::now());
    }

    /// [`record_request`](Self::record_request) with an explicit start time.
    pub fn record_request_at(&mut self, request: &RpcRequest, start_time: DateTime<Utc>) {
        let Some(id) = request.id.clone().filter(|id| *id != RpcId::Null) else {
            return;
        };
        let Some(info) = self.parser.extract_tool_call_info(request) else {
            return;
        };

        tracing::debug!(id = %id, tool = %info.name, "Tool call started");
        self.pending_calls.insert(
            id,
            PendingCall {
                tool_name: info.name,
                arguments: info.arguments,
                start_time,
            },
        );
    }

    /// Complete the pending call matching `response`.
    ///
    /// Responses without a pending request (other methods, duplicates, or
    /// replies that outlived a restart) are dropped and return `None`.
    pub fn record_response(&mut self, response: &RpcResponse) -> Option<ToolCall> {
        self.record_response_at(response, Utc::now())
    }

    /// [`record_response`](Self::record_response) with an explicit end time.
    pub fn record_response_at(
        &mut self,
        response: &RpcResponse,
        end_time: DateTime<Utc>,
    ) -> Option<ToolCall> {
        let pending = self.pending_calls.remove(&response.id)?;

        let mut call = ToolCall::started_at(pending.tool_name, pending.arguments, pending.start_time);

        let result = match self.parser.extract_tool_result(response) {
            Some(extracted) if extracted.is_error => ToolCallResult::failure(extracted.content),
            Some(extracted) => ToolCallResult::success(extracted.content),
            None => match &response.error {
                Some(error) => ToolCallResult::failure(error.message.clone()),
                None => ToolCallResult::success(""),
            },
        };
        call.complete(end_time, result);

        if call.is_build_tool() {
            if let Some(build) = self.parser.extract_build_result(response) {
                self.current_build_time = build.duration();
                self.last_build_result = Some(build);
            } else {
                self.current_build_time = call.duration();
            }
        }

        tracing::debug!(
            id = %response.id,
            tool = %call.tool_name,
            success = call.is_success(),
            duration = %call.formatted_duration(),
            "Tool call finished"
        );

        self.push_recent(call.clone());
        Some(call)
    }

    /// Start tracking a call reported over the telemetry side channel.
    pub fn record_tool_start(&mut self, id: impl Into<String>, call: ToolCall) {
        self.pending_events.insert(id.into(), call.clone());
        self.push_recent(call);
    }

    /// Finish a call started with [`record_tool_start`](Self::record_tool_start).
    ///
    /// Unknown ids are ignored.
    pub fn record_tool_end(
        &mut self,
        id: &str,
        success: bool,
        duration_ms: Option<u64>,
        tokens: Option<u64>,
    ) {
        self.record_tool_end_at(id, success, duration_ms, tokens, Utc::now());
    }

    /// [`record_tool_end`](Self::record_tool_end) with an explicit end time.
    pub fn record_tool_end_at(
        &mut self,
        id: &str,
        success: bool,
        duration_ms: Option<u64>,
        tokens: Option<u64>,
        end_time: DateTime<Utc>,
    ) {
        let Some(mut call) = self.pending_events.remove(id) else {
            tracing::trace!(id, "Tool end without matching start");
            return;
        };

        let result = if success {
            ToolCallResult::success("")
        } else {
            ToolCallResult::failure("Tool failed")
        };
        call.complete(end_time, result);
        call.token_count = tokens;

        if let Some(entry) = self.recent.iter_mut().find(|c| c.id == call.id) {
            *entry = call.clone();
        }

        if call.is_build_tool() {
            if let Some(ms) = duration_ms {
                self.current_build_time = Some(Duration::from_millis(ms));
            }
        }
    }

    /// Apply a decoded stderr telemetry event.
    pub fn apply_event(&mut self, event: ToolEvent) {
        match event {
            ToolEvent::ToolStart { tool, id } => self.record_tool_start(id, ToolCall::new(tool)),
            ToolEvent::ToolEnd {
                id,
                success,
                duration_ms,
                tokens,
                ..
            } => self.record_tool_end(&id, success, duration_ms, tokens),
        }
    }

    /// Insert a call that is already finished, e.g. from agent telemetry.
    pub fn record_completed_tool_call(&mut self, call: ToolCall) {
        if call.is_active() {
            tracing::debug!(tool = %call.tool_name, "Ignoring unfinished call");
            return;
        }
        self.push_recent(call);
    }

    /// Finish every active call now, as successes.
    ///
    /// Used when the session goes away so nothing stays active forever.
    pub fn force_complete_all_active(&mut self) {
        let now = Utc::now();
        self.pending_events.clear();

        let mut completed = 0usize;
        for call in self.recent.iter_mut().filter(|c| c.is_active()) {
            call.complete(now, ToolCallResult::success(""));
            completed += 1;
        }
        if completed > 0 {
            tracing::debug!(completed, "Force-completed active tool calls");
        }
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        self.pending_calls.clear();
        self.pending_events.clear();
        self.recent.clear();
        self.current_build_time = None;
        self.last_build_result = None;
    }

    fn push_recent(&mut self, call: ToolCall) {
        self.recent.push_front(call);
        while self.recent.len() > self.max_recent_calls {
            self.recent.pop_back();
        }
    }

    /// Recent calls, newest first.
    #[must_use]
    pub fn recent_tool_calls(&self) -> &VecDeque<ToolCall> {
        &self.recent
    }

    /// Number of `tools/call` requests waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending_calls.len()
    }

    /// Whether a request with this id is waiting for a response.
    #[must_use]
    pub fn is_pending(&self, id: &RpcId) -> bool {
        self.pending_calls.contains_key(id)
    }

    /// Number of telemetry calls waiting for their end event.
    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Duration of the latest build tool call.
    #[must_use]
    pub fn current_build_time(&self) -> Option<Duration> {
        self.current_build_time
    }

    /// Structured result of the latest build tool call.
    #[must_use]
    pub fn last_build_result(&self) -> Option<&BuildResult> {
        self.last_build_result.as_ref()
    }

    /// Capacity of the recent list.
    #[must_use]
    pub fn max_recent_calls(&self) -> usize {
        self.max_recent_calls
    }

    /// Sum of token counts and cost over the recent calls.
    #[must_use]
    pub fn token_totals(&self) -> TokenTotals {
        self.recent
            .iter()
            .fold(TokenTotals::default(), |mut totals, call| {
                totals.tokens += call.token_count.unwrap_or(0);
                totals.input_tokens += call.input_tokens.unwrap_or(0);
                totals.output_tokens += call.output_tokens.unwrap_or(0);
                totals.cost_usd += call.cost_usd.unwrap_or(0.0);
                totals
            })
    }
}
