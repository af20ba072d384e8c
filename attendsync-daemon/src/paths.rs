use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn attendsync_root(home: &Path) -> PathBuf {
    attendsync_core::config::config_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    attendsync_root(home).join(DAEMON_SOCKET)
}
