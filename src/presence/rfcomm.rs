//! Bluetooth RFCOMM transport.
//!
//! Sockets are opened non-blocking so that both the connect and every probe
//! can be bounded with `poll(2)`. The standard library has no Bluetooth
//! address family, so socket creation and `connect(2)` go through `libc`.

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{getsockopt, sockopt};
use std::io;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use super::{BeaconAddress, BeaconConnection, BeaconTransport, LinkError};

const BTPROTO_RFCOMM: libc::c_int = 3;

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

impl SockaddrRc {
    fn new(address: &BeaconAddress) -> Self {
        // bdaddr_t is stored least significant byte first
        let mut bdaddr = address.bytes;
        bdaddr.reverse();
        Self {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: address.channel,
        }
    }
}

/// Transport that connects to the beacon over RFCOMM.
pub struct RfcommTransport {
    probe_timeout: Duration,
}

impl RfcommTransport {
    /// `probe_timeout` bounds how long a probe may wait for the socket to
    /// become writable.
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }
}

impl BeaconTransport for RfcommTransport {
    fn connect(
        &mut self,
        address: &BeaconAddress,
        timeout: Duration,
    ) -> Result<Box<dyn BeaconConnection>, LinkError> {
        let fd = open_socket().map_err(LinkError::Socket)?;
        let sockaddr = SockaddrRc::new(address);

        // SAFETY: `sockaddr` is a properly initialised sockaddr_rc that outlives
        // the call and the length passed matches its size.
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                (&sockaddr as *const SockaddrRc).cast::<libc::sockaddr>(),
                std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };

        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(LinkError::Connect(err));
            }

            match wait_writable(&fd, timeout).map_err(LinkError::Connect)? {
                None => return Err(LinkError::ConnectTimeout(timeout)),
                Some(_) => {
                    let so_error = getsockopt(&fd, sockopt::SocketError)
                        .map_err(|e| LinkError::Connect(e.into()))?;
                    if so_error != 0 {
                        return Err(LinkError::Connect(io::Error::from_raw_os_error(so_error)));
                    }
                }
            }
        }

        Ok(Box::new(RfcommConnection {
            fd,
            probe_timeout: self.probe_timeout,
        }))
    }
}

/// Connected RFCOMM socket.
pub struct RfcommConnection {
    fd: OwnedFd,
    probe_timeout: Duration,
}

impl BeaconConnection for RfcommConnection {
    fn send_probe(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let revents = wait_writable(&self.fd, self.probe_timeout)
            .map_err(LinkError::Send)?
            .ok_or(LinkError::ProbeTimeout(self.probe_timeout))?;

        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP) {
            return Err(LinkError::Closed);
        }

        // SAFETY: the buffer pointer and length come from a live slice.
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                payload.as_ptr().cast::<libc::c_void>(),
                payload.len(),
                libc::MSG_NOSIGNAL | libc::MSG_DONTWAIT,
            )
        };

        match sent {
            n if n < 0 => Err(LinkError::Send(io::Error::last_os_error())),
            0 => Err(LinkError::Closed),
            _ => Ok(()),
        }
    }

    fn close(self: Box<Self>) -> Result<(), LinkError> {
        // SAFETY: the descriptor is owned and still open; shutdown does not close it.
        let rc = unsafe { libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_RDWR) };
        if rc == 0 {
            Ok(())
        } else {
            Err(LinkError::Send(io::Error::last_os_error()))
        }
    }
}

fn open_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call with constant arguments.
    let raw = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            BTPROTO_RFCOMM,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

/// Wait until `fd` is writable or `timeout` passes.
///
/// Returns `None` on timeout. Interrupted waits resume with the time left.
fn wait_writable(fd: &OwnedFd, timeout: Duration) -> io::Result<Option<PollFlags>> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let millis = u16::try_from(remaining.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLOUT)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(fds[0].revents().unwrap_or(PollFlags::empty()))),
            Err(nix::errno::Errno::EINTR) if !remaining.is_zero() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
