// memo-daemon: background daemon owning the task stack
//
// Responsibilities:
// - Own the single TaskStack instance behind a serializing lock
// - Append an activity log entry whenever a task leaves the active slot
// - Persist a full stack snapshot atomically after every mutation
// - Expose the newline-JSON Unix socket protocol for CLI invocations

use anyhow::{Context, Result};
use chrono::Utc;
use memo::config::Config;
use memo::persistence::{append_log, load_stack, read_log, save_stack, LogEntry, StopReason};
use memo::protocol::{
    deserialize_message, serialize_message, ErrorCode, Request, Response, MAX_REQUEST_FRAME_SIZE,
};
use memo::stack::{Task, TaskStack};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};

/// Daemon state shared across all client connections.
///
/// The stack lock serializes every read and mutation; persistence happens
/// while the lock is still held, so clients always observe whole operations.
struct DaemonState {
    config: Config,
    stack: Mutex<TaskStack>,
}

impl DaemonState {
    /// Record a task's departure from the active slot. A write failure is
    /// reported but does not abort the request: the log is derived history,
    /// not the source of truth.
    fn record_stop(&self, task: &Task, reason: StopReason) {
        let entry = LogEntry {
            task: task.description.clone(),
            started: task.started_at,
            stopped: Utc::now(),
            reason,
        };
        if let Err(err) = append_log(&self.config, &entry) {
            eprintln!("Failed to append activity log entry: {err:#}");
        }
    }

    /// Persist the full stack snapshot. On failure the in-memory state stays
    /// authoritative and at most this one mutation can be lost to a crash;
    /// the failure is still reported loudly.
    fn persist(&self, stack: &TaskStack) {
        if let Err(err) = save_stack(&self.config, stack) {
            eprintln!("Failed to persist stack snapshot: {err:#}");
        }
    }
}

fn invalid(message: impl Into<String>) -> Response {
    Response::Error {
        code: ErrorCode::InvalidRequest,
        message: message.into(),
    }
}

/// Handle a single request from a client
async fn handle_request(
    state: &Arc<DaemonState>,
    request: Request,
    shutdown_tx: &mpsc::Sender<()>,
) -> Response {
    match request {
        Request::List => {
            let stack = state.stack.lock().await;
            Response::Stack {
                tasks: stack.tasks().to_vec(),
            }
        }

        Request::Push { description } => {
            let description = description.trim().to_string();
            if description.is_empty() {
                return invalid("description required");
            }

            let mut stack = state.stack.lock().await;
            let paused = stack.peek().cloned();
            if let Some(previous) = &paused {
                state.record_stop(previous, StopReason::Pushed);
            }
            let started = stack.push(&description);
            state.persist(&stack);

            Response::Pushed { started, paused }
        }

        Request::Pop => {
            let mut stack = state.stack.lock().await;
            let Some(popped) = stack.pop() else {
                return Response::Error {
                    code: ErrorCode::EmptyStack,
                    message: "stack is empty".to_string(),
                };
            };
            state.record_stop(&popped, StopReason::Popped);
            state.persist(&stack);

            let resuming = stack.peek().cloned();
            Response::Popped { popped, resuming }
        }

        Request::Switch => {
            let mut stack = state.stack.lock().await;
            let Some((started, paused)) = stack.switch() else {
                return Response::Error {
                    code: ErrorCode::NotEnoughTasks,
                    message: "need at least 2 tasks to switch".to_string(),
                };
            };
            state.record_stop(&paused, StopReason::Switched);
            state.persist(&stack);

            Response::Switched { started, paused }
        }

        Request::Queue { description } => {
            let description = description.trim().to_string();
            if description.is_empty() {
                return invalid("description required");
            }

            let mut stack = state.stack.lock().await;
            let queued = stack.queue(&description);
            state.persist(&stack);

            let current = stack.peek().cloned();
            Response::Queued { queued, current }
        }

        Request::Reorder { order } => {
            let mut stack = state.stack.lock().await;
            let previous = stack.peek().cloned();

            if let Err(err) = stack.reorder(&order) {
                return Response::Error {
                    code: ErrorCode::InvalidOrder,
                    message: err.to_string(),
                };
            }

            // Only an actual change of the front occupant is a departure;
            // no-op reorders must not add log noise
            if let Some(previous) = previous {
                let front_changed = stack.peek().map(|t| t.id) != Some(previous.id);
                if front_changed {
                    state.record_stop(&previous, StopReason::Reordered);
                }
            }
            state.persist(&stack);

            Response::Reordered {
                tasks: stack.tasks().to_vec(),
            }
        }

        Request::Log => {
            // Hold the stack lock so the log is never read mid-mutation
            let _stack = state.stack.lock().await;
            match read_log(&state.config) {
                Ok(entries) => Response::Log { entries },
                Err(err) => Response::Error {
                    code: ErrorCode::Internal,
                    message: format!("Failed to read activity log: {err:#}"),
                },
            }
        }

        Request::Version => Response::Version {
            version: memo::version().to_string(),
        },

        Request::Ping => Response::Pong,

        Request::Shutdown => {
            let _ = shutdown_tx.send(()).await;
            Response::ShuttingDown
        }
    }
}

async fn handle_client(
    state: Arc<DaemonState>,
    mut stream: UnixStream,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        match reader.read_line(&mut line).await {
            Ok(0) => break, // client disconnected
            Ok(_) => {
                let response = if line.len() > MAX_REQUEST_FRAME_SIZE {
                    invalid(format!(
                        "Request frame too large: {} bytes (max {})",
                        line.len(),
                        MAX_REQUEST_FRAME_SIZE
                    ))
                } else {
                    match deserialize_message::<Request>(line.as_bytes()) {
                        Ok(request) => handle_request(&state, request, &shutdown_tx).await,
                        Err(err) => invalid(format!("Failed to parse request: {}", err)),
                    }
                };

                let bytes = serialize_message(&response)?;
                writer.write_all(&bytes).await?;
                writer.flush().await?;

                line.clear();
            }
            Err(err) => {
                eprintln!("Error reading from client: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                eprintln!("Failed to install SIGTERM handler: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    config
        .ensure_dirs()
        .context("Failed to create data directories")?;

    // Refuse to double-start; clean up a socket left by a crashed daemon
    if config.socket_exists() {
        if config.is_daemon_running() {
            eprintln!("Daemon already running (PID: {:?})", config.read_pid());
            std::process::exit(1);
        }
        config
            .remove_socket()
            .context("Failed to remove stale socket")?;
    }

    config.write_pid().context("Failed to write PID file")?;

    // A corrupt snapshot is fatal: surface it instead of resetting state
    let stack = load_stack(&config).context("Refusing to start with an unreadable snapshot")?;
    let state = Arc::new(DaemonState {
        config: config.clone(),
        stack: Mutex::new(stack),
    });

    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("Failed to bind socket: {}", config.socket_path.display()))?;

    // Owner-only access to the socket
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| {
                format!(
                    "Failed to set socket permissions: {}",
                    config.socket_path.display()
                )
            })?;
    }

    println!("Daemon listening on {}", config.socket_path.display());

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_termination().await;
        let _ = signal_tx.send(()).await;
    });

    // Accept connections until shutdown
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_client(state, stream, shutdown_tx).await {
                                eprintln!("Client error: {}", err);
                            }
                        });
                    }
                    Err(err) => {
                        eprintln!("Accept error: {}", err);
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                println!("Shutting down daemon...");
                break;
            }
        }
    }

    config.remove_pid().ok();
    config.remove_socket().ok();

    println!("Daemon stopped");
    Ok(())
}
