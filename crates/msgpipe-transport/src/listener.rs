use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::PipeConfig;
use crate::error::{Result, TransportError};
use crate::pipe::MessagePipe;
use crate::sys;

/// Path-bound listener that hands out [`MessagePipe`] endpoints.
///
/// Uses a filesystem `SOCK_SEQPACKET` socket so the accepted endpoints keep
/// message boundaries, just like a pair from [`MessagePipe::create`].
/// The socket file is removed on drop if it is still the one we created.
pub struct MessagePipeListener {
    fd: OwnedFd,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    config: PipeConfig,
}

impl MessagePipeListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` is 108 bytes on Linux.
    const MAX_PATH_LEN: usize = 108;

    /// Bind and listen on a filesystem path.
    ///
    /// If the path already exists and is a socket, it is removed first
    /// (stale socket cleanup). Any other kind of file is left alone and the
    /// bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen on a filesystem path with an explicit mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            } else {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
        }

        let fd = sys::bind_listener(&path).map_err(bind_err)?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on message pipe socket");

        Ok(Self {
            fd,
            created_inode: Some((created.dev(), created.ino())),
            path,
            config: PipeConfig::default(),
        })
    }

    /// Configuration applied to every accepted endpoint.
    pub fn with_config(mut self, config: PipeConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<MessagePipe> {
        let fd = sys::accept(self.fd.as_raw_fd()).map_err(TransportError::Accept)?;
        debug!(fd = fd.as_raw_fd(), "accepted connection");
        Ok(MessagePipe::from_fd(fd, self.config.clone()))
    }

    /// Accept a connection, giving up after `timeout`.
    ///
    /// `Ok(None)` means nobody connected in time.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<MessagePipe>> {
        let ready =
            sys::poll_readable(self.fd.as_raw_fd(), Some(timeout)).map_err(TransportError::Accept)?;
        match ready {
            Some(()) => self.accept().map(Some),
            None => Ok(None),
        }
    }

    /// Connect to a listening path (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<MessagePipe> {
        Self::connect_with_config(path, PipeConfig::default())
    }

    /// Connect to a listening path with explicit endpoint configuration.
    pub fn connect_with_config(path: impl AsRef<Path>, config: PipeConfig) -> Result<MessagePipe> {
        let path = path.as_ref();
        let fd = sys::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to message pipe socket");
        Ok(MessagePipe::from_fd(fd, config))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MessagePipeListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl std::fmt::Debug for MessagePipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeListener")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Readiness;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("msgpipe-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_bind_accept_connect() {
        let dir = temp_dir("listener");
        let sock_path = dir.join("test.sock");

        let listener = MessagePipeListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let client = MessagePipeListener::connect(&path_clone).unwrap();
            client.write_message(b"hello").unwrap();
            client.write_message(b"world").unwrap();
        });

        let server = listener.accept().unwrap();
        assert_eq!(server.read_message().unwrap().as_ref(), b"hello");
        assert_eq!(server.read_message().unwrap().as_ref(), b"world");

        handle.join().unwrap();
        assert_eq!(server.wait_readable_or_closed().unwrap(), Readiness::Closed);

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = MessagePipeListener::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_hardened() {
        let dir = temp_dir("perms");
        let sock_path = dir.join("perm.sock");

        let listener = MessagePipeListener::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = temp_dir("stale");
        let sock_path = dir.join("stale.sock");

        let first = MessagePipeListener::bind(&sock_path).unwrap();
        std::mem::forget(first);
        assert!(sock_path.exists());

        let second = MessagePipeListener::bind(&sock_path);
        assert!(second.is_ok());

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = MessagePipeListener::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = temp_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = MessagePipeListener::bind(&sock_path).unwrap();
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_to_missing_path_fails() {
        let dir = temp_dir("missing");
        let result = MessagePipeListener::connect(dir.join("absent.sock"));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_accept_timeout_expires_without_client() {
        let dir = temp_dir("accept-timeout");
        let listener = MessagePipeListener::bind(dir.join("idle.sock")).unwrap();

        let accepted = listener
            .accept_timeout(Duration::from_millis(20))
            .unwrap();
        assert!(accepted.is_none());

        let _client = MessagePipeListener::connect(listener.path()).unwrap();
        let accepted = listener.accept_timeout(Duration::from_secs(1)).unwrap();
        assert!(accepted.is_some());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
