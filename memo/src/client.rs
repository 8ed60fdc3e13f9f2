// Daemon client and bootstrap for the CLI
// Stateless: one connection per request against a daemon the bootstrap has
// already confirmed reachable

use crate::config::Config;
use crate::protocol::{deserialize_message, serialize_message, Request, Response};
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STARTUP_POLL_ATTEMPTS: u32 = 50;

/// Connect to a daemon that is expected to be listening already
pub fn connect(config: &Config) -> Result<UnixStream> {
    let stream = UnixStream::connect(&config.socket_path).with_context(|| {
        format!(
            "Failed to connect to daemon at {}",
            config.socket_path.display()
        )
    })?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    Ok(stream)
}

/// Send one request over an established connection and read its response
fn request_over(stream: &mut UnixStream, request: &Request) -> Result<Response> {
    let bytes = serialize_message(request)?;
    stream.write_all(&bytes)?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read daemon response")?;

    deserialize_message(line.as_bytes()).context("Failed to parse daemon response")
}

/// Send one request on a fresh connection
pub fn send_request(config: &Config, request: &Request) -> Result<Response> {
    let mut stream = connect(config)?;
    request_over(&mut stream, request)
}

/// Locate the daemon binary: next to the current executable for installed
/// layouts, falling back to a PATH lookup
fn resolve_daemon_path() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("memo-daemon");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("memo-daemon")
}

/// Start the daemon as a detached background process and wait for its
/// socket to accept connections
fn start_daemon(config: &Config) -> Result<UnixStream> {
    let daemon_path = resolve_daemon_path();

    Command::new(&daemon_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start daemon at {}", daemon_path.display()))?;

    for _ in 0..STARTUP_POLL_ATTEMPTS {
        std::thread::sleep(STARTUP_POLL_INTERVAL);
        if let Ok(stream) = connect(config) {
            return Ok(stream);
        }
    }

    Err(anyhow!(
        "Timed out waiting for daemon to start (socket not found at: {})",
        config.socket_path.display()
    ))
}

/// Connect to the daemon, starting one if none is listening
fn connect_or_start(config: &Config) -> Result<UnixStream> {
    match connect(config) {
        Ok(stream) => Ok(stream),
        Err(_) => start_daemon(config),
    }
}

/// Ask the daemon to shut down, escalating to SIGTERM if it does not
/// release the socket in time
fn stop_daemon(config: &Config) -> Result<()> {
    if let Ok(mut stream) = connect(config) {
        // Best effort; the daemon may exit before answering
        let _ = request_over(&mut stream, &Request::Shutdown);
    }

    for _ in 0..STARTUP_POLL_ATTEMPTS {
        if !config.is_daemon_running() {
            return Ok(());
        }
        std::thread::sleep(STARTUP_POLL_INTERVAL);
    }

    if let Some(pid) = config.read_pid() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        for _ in 0..STARTUP_POLL_ATTEMPTS {
            if !config.is_daemon_running() {
                return Ok(());
            }
            std::thread::sleep(STARTUP_POLL_INTERVAL);
        }
    }

    Err(anyhow!("Old daemon did not shut down"))
}

/// Ensure a daemon matching this build is listening, replacing a stale one.
///
/// The daemon reports its build identifier; on mismatch the old daemon is
/// shut down and a fresh one started, so the on-disk state is always served
/// by code that wrote it.
pub fn ensure_compatible_daemon(config: &Config) -> Result<()> {
    let mut stream = connect_or_start(config)?;

    match request_over(&mut stream, &Request::Version) {
        Ok(Response::Version { version }) if version == crate::version() => Ok(()),
        Ok(Response::Version { .. }) | Err(_) => {
            drop(stream);
            stop_daemon(config)?;
            start_daemon(config)?;
            Ok(())
        }
        Ok(other) => Err(anyhow!("Unexpected response to version probe: {other:?}")),
    }
}
