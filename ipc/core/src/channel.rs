//! Channel Identity
//!
//! A channel is a logical named IPC endpoint. The name maps deterministically
//! to a Unix domain socket path: a fixed base directory, the name, and a fixed
//! suffix. The mapping is pure — the same name always yields the same path.
//!
//! Channel names must be unique per host, since the socket path is the sole
//! addressing mechanism.

use std::path::{Path, PathBuf};

/// Base directory for well-known channel sockets.
pub const SOCKET_DIR: &str = "/tmp";

/// Suffix appended to the channel name to form the socket filename.
pub const SOCKET_SUFFIX: &str = ".sock";

/// A logical named IPC endpoint mapped to one Unix domain socket path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    name: String,
    socket_path: PathBuf,
}

impl Channel {
    /// Create a channel in the well-known socket directory.
    ///
    /// The path is `/tmp/<name>.sock`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::in_dir(SOCKET_DIR, name)
    }

    /// Create a channel whose socket lives under `dir` instead of the
    /// well-known directory.
    ///
    /// Used by tests to root sockets inside a temporary directory, and by
    /// deployments that prefer `$XDG_RUNTIME_DIR` over `/tmp`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let socket_path = dir.as_ref().join(format!("{name}{SOCKET_SUFFIX}"));
        Self { name, socket_path }
    }

    /// The logical channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The socket path this channel is addressed by.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_name_maps_to_well_known_path() {
        let ch = Channel::new("world");
        assert_eq!(ch.socket_path(), Path::new("/tmp/world.sock"));
        assert_eq!(ch.name(), "world");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        assert_eq!(Channel::new("renderer"), Channel::new("renderer"));
        assert_ne!(
            Channel::new("renderer").socket_path(),
            Channel::new("backend").socket_path()
        );
    }

    #[test]
    fn test_in_dir_roots_the_socket() {
        let ch = Channel::in_dir("/run/user/1000/dplayer", "renderer");
        assert_eq!(
            ch.socket_path(),
            Path::new("/run/user/1000/dplayer/renderer.sock")
        );
    }
}
