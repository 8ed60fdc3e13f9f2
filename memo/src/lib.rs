// memo library shared between the daemon and CLI binaries

pub mod config;
pub mod format;
pub mod persistence;
pub mod protocol;
pub mod stack;

// Daemon client + bootstrap (Unix only for now)
#[cfg(unix)]
pub mod client;

// Interactive stack picker (Unix only for now)
#[cfg(unix)]
pub mod picker;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
