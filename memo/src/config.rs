// Environment configuration helpers for the daemon and CLI
// Handles platform-specific paths for the socket, PID file, and data files

use std::path::PathBuf;

/// Configuration for daemon paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime files (socket, PID)
    pub runtime_dir: PathBuf,
    /// Directory for durable state (stack snapshot, activity log)
    pub state_dir: PathBuf,
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Path to the daemon PID file
    pub pid_file: PathBuf,
}

impl Config {
    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        let runtime_dir = Self::default_runtime_dir();
        let state_dir = Self::default_state_dir();

        Self {
            socket_path: runtime_dir.join("daemon.sock"),
            pid_file: runtime_dir.join("daemon.pid"),
            runtime_dir,
            state_dir,
        }
    }

    /// Create configuration from environment variables, falling back to
    /// defaults. `MEMO_DAEMON_DIR` overrides both runtime_dir and state_dir.
    pub fn from_env() -> Self {
        if let Ok(override_dir) = std::env::var("MEMO_DAEMON_DIR") {
            let base = PathBuf::from(override_dir);
            return Self::at(base);
        }

        Self::default_paths()
    }

    /// Create configuration with both directories rooted at `base`
    pub fn at(base: PathBuf) -> Self {
        Self {
            socket_path: base.join("daemon.sock"),
            pid_file: base.join("daemon.pid"),
            runtime_dir: base.clone(),
            state_dir: base,
        }
    }

    fn default_runtime_dir() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            // Prefer XDG_RUNTIME_DIR if set, else fall back to state_dir
            if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                PathBuf::from(runtime_dir).join("memo")
            } else {
                Self::default_state_dir()
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            Self::default_state_dir()
        }
    }

    fn default_state_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".memo"))
            .unwrap_or_else(|| PathBuf::from("/tmp/memo"))
    }

    /// Path to the stack snapshot file
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    /// Path to the append-only activity log
    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join("log.jsonl")
    }

    /// Ensure both directories exist, restricting the runtime directory to
    /// the current user on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        std::fs::create_dir_all(&self.runtime_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.runtime_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    /// Write the daemon PID to the PID file
    pub fn write_pid(&self) -> std::io::Result<()> {
        self.ensure_dirs()?;
        std::fs::write(&self.pid_file, std::process::id().to_string())
    }

    /// Read the daemon PID from the PID file
    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Remove the PID file
    pub fn remove_pid(&self) -> std::io::Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)
        } else {
            Ok(())
        }
    }

    /// Remove the socket file
    pub fn remove_socket(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
        } else {
            Ok(())
        }
    }

    /// Check if the daemon socket exists (indicating a daemon may be running)
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Check if a process with the stored PID is still running
    #[cfg(unix)]
    pub fn is_daemon_running(&self) -> bool {
        if let Some(pid) = self.read_pid() {
            // Signal 0 probes for existence without delivering anything
            unsafe { libc::kill(pid as i32, 0) == 0 }
        } else {
            false
        }
    }

    #[cfg(not(unix))]
    pub fn is_daemon_running(&self) -> bool {
        // Conservative fallback: assume running if socket exists
        self.socket_exists()
    }
}
