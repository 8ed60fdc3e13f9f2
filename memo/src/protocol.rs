// Wire protocol - shared structs for daemon <-> CLI communication
// Newline-delimited JSON messages over a Unix socket, one response per request

use crate::persistence::LogEntry;
use crate::stack::Task;
use serde::{Deserialize, Serialize};

/// Upper bound on a single request frame (bytes)
pub const MAX_REQUEST_FRAME_SIZE: usize = 64 * 1024;

/// Request message from the CLI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Full ordered task list
    List,
    /// Start a new task, pausing the current one
    Push { description: String },
    /// Finish the current task and resume the next
    Pop,
    /// Swap the two top tasks
    Switch,
    /// Add a task to the bottom of the stack
    Queue { description: String },
    /// Rewrite the stack order with a permutation of `0..len`
    Reorder { order: Vec<usize> },
    /// Full activity log, oldest entry first
    Log,
    /// Daemon build identifier, for version-gated reconnection
    Version,
    /// Check if the daemon is alive
    Ping,
    /// Ask the daemon to shut down cleanly
    Shutdown,
}

/// Response message from the daemon to the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Stack {
        tasks: Vec<Task>,
    },
    Pushed {
        started: Task,
        #[serde(skip_serializing_if = "Option::is_none")]
        paused: Option<Task>,
    },
    Popped {
        popped: Task,
        #[serde(skip_serializing_if = "Option::is_none")]
        resuming: Option<Task>,
    },
    Switched {
        started: Task,
        paused: Task,
    },
    Queued {
        queued: Task,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<Task>,
    },
    Reordered {
        tasks: Vec<Task>,
    },
    Log {
        entries: Vec<LogEntry>,
    },
    Version {
        version: String,
    },
    Pong,
    ShuttingDown,
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or empty input; rejected before any mutation
    InvalidRequest,
    /// Pop on an empty stack
    EmptyStack,
    /// Switch with fewer than two tasks
    NotEnoughTasks,
    /// Reorder with a bad permutation
    InvalidOrder,
    /// Unexpected daemon-side failure
    Internal,
}

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes (strips trailing newline)
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = if bytes.last() == Some(&b'\n') {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    };
    serde_json::from_slice(trimmed)
}
