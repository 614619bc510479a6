//! Thin wrappers over the `SOCK_SEQPACKET` syscalls used by the pipe types.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::traits::Readiness;

const HANGUP_EVENTS: libc::c_short = libc::POLLHUP | libc::POLLRDHUP;
const READ_EVENTS: libc::c_short = libc::POLLIN | HANGUP_EVENTS;
const LISTEN_BACKLOG: libc::c_int = 128;

/// Result of pulling one message off a pipe.
pub(crate) enum Inbound {
    Message(Bytes),
    /// The message could not be buffered and was dropped.
    Oversized(usize),
    Closed,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn seqpacket_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the returned descriptor is checked below.
    let fd = cvt(unsafe {
        libc::socket(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
            0,
        )
    })?;
    // SAFETY: socket(2) succeeded, so `fd` is open and exclusively ours.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn seqpacket_pair() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: `fds` is a writable array of two descriptors as socketpair(2) requires.
    cvt(unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    })?;
    // SAFETY: socketpair(2) succeeded, so both descriptors are open and exclusively ours.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn sockaddr_un(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: sockaddr_un is plain old data and all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    if bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path contains an interior NUL byte",
        ));
    }
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path too long",
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::size_of::<libc::sa_family_t>() + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}

pub(crate) fn bind_listener(path: &Path) -> io::Result<OwnedFd> {
    let (addr, len) = sockaddr_un(path)?;
    let fd = seqpacket_socket()?;
    let raw = std::os::fd::AsRawFd::as_raw_fd(&fd);
    // SAFETY: `addr` is a valid sockaddr_un and `len` covers the populated prefix.
    cvt(unsafe {
        libc::bind(
            raw,
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            len,
        )
    })?;
    // SAFETY: `raw` is a bound socket owned by `fd`.
    cvt(unsafe { libc::listen(raw, LISTEN_BACKLOG) })?;
    Ok(fd)
}

pub(crate) fn accept(listener: RawFd) -> io::Result<OwnedFd> {
    loop {
        // SAFETY: null address pointers are allowed when the peer address is not needed.
        let rc = unsafe {
            libc::accept4(
                listener,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                libc::SOCK_CLOEXEC,
            )
        };
        match cvt(rc) {
            // SAFETY: accept4(2) succeeded, so `fd` is open and exclusively ours.
            Ok(fd) => return Ok(unsafe { OwnedFd::from_raw_fd(fd) }),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn connect(path: &Path) -> io::Result<OwnedFd> {
    let (addr, len) = sockaddr_un(path)?;
    let fd = seqpacket_socket()?;
    let raw = std::os::fd::AsRawFd::as_raw_fd(&fd);
    // SAFETY: `addr` is a valid sockaddr_un and `len` covers the populated prefix.
    cvt(unsafe {
        libc::connect(
            raw,
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            len,
        )
    })?;
    Ok(fd)
}

#[cfg(feature = "async")]
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl(2) on a descriptor we own.
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    // SAFETY: as above.
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// Poll for read readiness or hangup. `Ok(None)` means the timeout elapsed.
pub(crate) fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> io::Result<Option<()>> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let timeout_ms = match deadline {
            None => -1,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let mut ms = remaining.as_millis();
                if remaining.subsec_nanos() % 1_000_000 != 0 {
                    ms += 1;
                }
                ms.min(libc::c_int::MAX as u128) as libc::c_int
            }
        };

        let mut pfd = libc::pollfd {
            fd,
            events: READ_EVENTS,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid pollfd and the count is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(None);
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        return Ok(Some(()));
    }
}

fn hung_up(fd: RawFd) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: HANGUP_EVENTS,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid pollfd and the count is 1; zero timeout never blocks.
    let rc = cvt(unsafe { libc::poll(&mut pfd, 1, 0) })?;
    Ok(rc > 0 && pfd.revents & HANGUP_EVENTS != 0)
}

/// Length of the next pending message, without consuming it.
///
/// `MSG_TRUNC` makes the kernel report the real record length even though
/// only one byte is copied out.
fn peek_len(fd: RawFd, dontwait: bool) -> io::Result<usize> {
    let mut byte = 0u8;
    let mut flags = libc::MSG_PEEK | libc::MSG_TRUNC;
    if dontwait {
        flags |= libc::MSG_DONTWAIT;
    }
    loop {
        // SAFETY: `byte` is a valid one-byte writable buffer.
        let rc = unsafe { libc::recv(fd, (&mut byte as *mut u8).cast(), 1, flags) };
        match cvt_size(rc) {
            Ok(len) => return Ok(len),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        let rc = unsafe {
            libc::recv(
                fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        match cvt_size(rc) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Drop the pending message. A short receive buffer truncates the record.
fn discard(fd: RawFd) -> io::Result<()> {
    let mut byte = [0u8; 1];
    recv(fd, &mut byte).map(|_| ())
}

/// Non-blocking readiness probe. `Ok(None)` means nothing is pending yet.
pub(crate) fn probe(fd: RawFd) -> io::Result<Option<Readiness>> {
    match peek_len(fd, true) {
        Ok(0) => {
            if hung_up(fd)? {
                Ok(Some(Readiness::Closed))
            } else {
                Ok(Some(Readiness::Readable))
            }
        }
        Ok(_) => Ok(Some(Readiness::Readable)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(err) if err.kind() == io::ErrorKind::ConnectionReset => Ok(Some(Readiness::Closed)),
        Err(err) => Err(err),
    }
}

/// Pull the next message off the pipe, sized exactly to the record.
pub(crate) fn take_message(fd: RawFd, max_size: usize, dontwait: bool) -> io::Result<Inbound> {
    let len = match peek_len(fd, dontwait) {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::ConnectionReset => return Ok(Inbound::Closed),
        Err(err) => return Err(err),
    };

    // Zero-length records only come from foreign writers; after hangup they
    // are indistinguishable from end-of-stream.
    if len == 0 {
        if hung_up(fd)? {
            return Ok(Inbound::Closed);
        }
        discard(fd)?;
        return Ok(Inbound::Message(Bytes::new()));
    }

    if len > max_size {
        discard(fd)?;
        return Ok(Inbound::Oversized(len));
    }

    let mut buf = Vec::new();
    if buf.try_reserve_exact(len).is_err() {
        discard(fd)?;
        return Ok(Inbound::Oversized(len));
    }
    buf.resize(len, 0);

    let read = recv(fd, &mut buf)?;
    buf.truncate(read);
    Ok(Inbound::Message(Bytes::from(buf)))
}

/// Send one record. Seqpacket sends are all-or-nothing.
pub(crate) fn send(fd: RawFd, frame: &[u8], dontwait: bool) -> io::Result<usize> {
    let mut flags = libc::MSG_NOSIGNAL;
    if dontwait {
        flags |= libc::MSG_DONTWAIT;
    }
    loop {
        // SAFETY: `frame` is valid for `frame.len()` readable bytes.
        let rc = unsafe { libc::send(fd, frame.as_ptr().cast(), frame.len(), flags) };
        match cvt_size(rc) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn is_message_too_large(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EMSGSIZE)
}
