//! Raw link-layer capture socket

use std::time::Duration;

use super::FrameSource;
use crate::Result;

#[cfg(target_os = "linux")]
use {
    crate::RelayError,
    nix::errno::Errno,
    nix::sys::socket::{
        AddressFamily, MsgFlags, SockFlag, SockProtocol, SockType, recv, setsockopt, socket,
        sockopt,
    },
    nix::sys::time::{TimeVal, TimeValLike},
    std::ffi::OsString,
    std::os::fd::{AsRawFd, OwnedFd},
    tracing::{debug, info},
};

/// `AF_PACKET` raw socket receiving every frame on one interface.
///
/// Requires `CAP_NET_RAW` (or root). Construction fails fast with a
/// `Configuration` error when the capability is missing.
#[cfg(target_os = "linux")]
pub struct RawCapture {
    fd: OwnedFd,
    interface: String,
    timeout: Option<Duration>,
}

#[cfg(target_os = "linux")]
impl RawCapture {
    /// Open a capture socket bound to `interface`.
    pub fn open(interface: &str) -> Result<Self> {
        let fd = socket(AddressFamily::Packet, SockType::Raw, SockFlag::empty(), SockProtocol::EthAll)
            .map_err(|errno| match errno {
                Errno::EPERM | Errno::EACCES => RelayError::configuration(format!(
                    "raw packet capture requires CAP_NET_RAW or root ({})",
                    errno
                )),
                other => RelayError::io("opening raw capture socket", other.into()),
            })?;

        setsockopt(&fd, sockopt::BindToDevice, &OsString::from(interface)).map_err(|errno| {
            RelayError::configuration(format!("cannot bind capture to interface {interface}: {errno}"))
        })?;

        info!(interface, "Raw capture socket opened");
        Ok(Self { fd, interface: interface.to_string(), timeout: None })
    }

    /// Interface the socket is bound to
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.timeout == Some(timeout) {
            return Ok(());
        }
        let micros = i64::try_from(timeout.as_micros()).unwrap_or(i64::MAX).max(1);
        setsockopt(&self.fd, sockopt::ReceiveTimeout, &TimeVal::microseconds(micros))
            .map_err(|errno| RelayError::io("setting capture timeout", errno.into()))?;
        self.timeout = Some(timeout);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl FrameSource for RawCapture {
    fn read_frame(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        self.set_timeout(timeout)?;
        match recv(self.fd.as_raw_fd(), buf, MsgFlags::empty()) {
            Ok(len) => Ok(Some(len)),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
            Err(errno) => {
                debug!("Capture recv failed: {}", errno);
                Err(RelayError::io("reading raw frame", errno.into()))
            }
        }
    }
}

// Non-Linux stub implementation
#[cfg(not(target_os = "linux"))]
pub struct RawCapture {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
impl RawCapture {
    /// Raw capture is only available on Linux.
    pub fn open(_interface: &str) -> Result<Self> {
        Err(crate::RelayError::unsupported_platform("Raw packet capture", "Linux"))
    }

    /// Interface the socket is bound to
    pub fn interface(&self) -> &str {
        ""
    }
}

#[cfg(not(target_os = "linux"))]
impl FrameSource for RawCapture {
    fn read_frame(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<Option<usize>> {
        Ok(None)
    }
}
