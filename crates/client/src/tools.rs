//! Tool call activity tracking for one streamed reply.
//!
//! `ToolTracker` is the shared "a tool is running" flag. `ToolCallAssembler`
//! merges the fragments a provider streams for each call, so a call counts
//! once no matter how many frames it spans.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parlance_protocol::ToolInvocation;
use serde_json::Value;

/// Counts open tool calls. "A tool is running" is simply `open > 0`, which is
/// the OR across every call in flight. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ToolTracker {
    open: Arc<AtomicUsize>,
}

impl ToolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) {
        self.open.fetch_add(1, Ordering::SeqCst);
    }

    /// A result with no open call is ignored.
    pub fn finished(&self) {
        let _ = self
            .open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Terminal transitions close every call.
    pub fn clear(&self) {
        self.open.store(0, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.open_calls() > 0
    }

    pub fn open_calls(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// One tool call frame before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument text slice, a complete JSON value, or null.
    pub arguments: Value,
}

#[derive(Debug)]
struct InFlight {
    index: Option<u32>,
    id: Option<String>,
    name: String,
    raw_arguments: String,
    arguments: Value,
}

impl InFlight {
    fn matches(&self, delta: &ToolCallDelta) -> bool {
        (delta.index.is_some() && delta.index == self.index)
            || (delta.id.is_some() && delta.id == self.id)
    }

    fn absorb(&mut self, delta: ToolCallDelta) {
        if self.index.is_none() {
            self.index = delta.index;
        }
        if self.id.is_none() {
            self.id = delta.id;
        }
        if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
            self.name = name;
        }
        match delta.arguments {
            Value::Null => {}
            Value::String(slice) => {
                self.raw_arguments.push_str(&slice);
                self.arguments = parse_arguments(&self.raw_arguments);
            }
            complete => {
                self.raw_arguments.clear();
                self.arguments = complete;
            }
        }
    }

    fn invocation(&self) -> ToolInvocation {
        ToolInvocation {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Merges streamed tool call fragments keyed by `index` or `id`.
///
/// A fragment with neither key starts a new call when it names a function and
/// otherwise extends the most recent call.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: Vec<InFlight>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `delta` in and return the merged call. `tracker` hears about each
    /// call once, when its first fragment arrives.
    pub fn apply(&mut self, delta: ToolCallDelta, tracker: &ToolTracker) -> Option<ToolInvocation> {
        let keyed = delta.index.is_some() || delta.id.is_some();
        let existing = if keyed {
            self.calls.iter().position(|call| call.matches(&delta))
        } else if delta.name.is_none() {
            self.calls.len().checked_sub(1)
        } else {
            None
        };

        if let Some(pos) = existing {
            let call = &mut self.calls[pos];
            call.absorb(delta);
            return Some(call.invocation());
        }

        let name = delta.name.clone().filter(|n| !n.is_empty())?;
        let mut call = InFlight {
            index: None,
            id: None,
            name,
            raw_arguments: String::new(),
            arguments: Value::Null,
        };
        call.absorb(delta);
        tracker.started();
        let invocation = call.invocation();
        self.calls.push(call);
        Some(invocation)
    }

    /// A result closes the oldest open call with that name, or the oldest
    /// call when none matches.
    pub fn resolve(&mut self, name: &str, tracker: &ToolTracker) {
        let pos = self
            .calls
            .iter()
            .position(|call| call.name == name)
            .or_else(|| (!self.calls.is_empty()).then_some(0));
        if let Some(pos) = pos {
            self.calls.remove(pos);
        }
        tracker.finished();
    }

    pub fn open_calls(&self) -> usize {
        self.calls.len()
    }
}

/// Providers send arguments either as an object or as JSON text. Text that
/// does not parse yet is kept as a string.
fn parse_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
