// Copyright (C) 2020, Oxide Computer Company

//! VMCI socket operations.

use std::fmt;
use std::io::{self, Error, Read, Write};
use std::net::Shutdown;
use std::os::raw::{c_int, c_void};

use log::trace;

use crate::include::vmci_sockets::*;
use crate::sys::{self, RawSocket};
use crate::system;

/// Protocol argument used when the caller has no reason to pick one.
pub const DEFAULT_PROTOCOL: c_int = 0;

/// Connection type of a VMCI socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    /// Connection oriented byte stream.
    Stream,
    /// Connectionless datagrams.
    Datagram,
}

impl SocketType {
    fn as_raw(self) -> c_int {
        match self {
            SocketType::Stream => sys::SOCK_STREAM,
            SocketType::Datagram => sys::SOCK_DGRAM,
        }
    }
}

/// A VMCI endpoint: a context id and a port within that context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VmciAddr {
    pub cid: u32,
    pub port: u32,
}

impl VmciAddr {
    pub const CID_HYPERVISOR: u32 = VMADDR_CID_HYPERVISOR;
    pub const CID_LOCAL: u32 = VMADDR_CID_LOCAL;
    pub const CID_HOST: u32 = VMADDR_CID_HOST;
    pub const CID_ANY: u32 = VMADDR_CID_ANY;
    pub const PORT_ANY: u32 = VMADDR_PORT_ANY;

    pub const fn new(cid: u32, port: u32) -> VmciAddr {
        VmciAddr { cid, port }
    }

    /// Any local context, as used by `bind`.
    pub const fn any(port: u32) -> VmciAddr {
        VmciAddr::new(VMADDR_CID_ANY, port)
    }

    /// The host, as seen from a guest.
    pub const fn host(port: u32) -> VmciAddr {
        VmciAddr::new(VMADDR_CID_HOST, port)
    }

    fn to_raw(self, family: c_int) -> sockaddr_vm {
        sockaddr_vm::new(family, self.cid, self.port)
    }
}

impl From<sockaddr_vm> for VmciAddr {
    fn from(addr: sockaddr_vm) -> VmciAddr {
        VmciAddr::new(addr.svm_cid, addr.svm_port)
    }
}

impl fmt::Display for VmciAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cid, self.port)
    }
}

fn cvt(result: c_int) -> Result<(), Error> {
    if result == sys::SOCKET_ERROR {
        return Err(Error::last_os_error());
    }
    Ok(())
}

fn cvt_len(result: isize) -> Result<usize, Error> {
    if result < 0 {
        return Err(Error::last_os_error());
    }
    Ok(result as usize)
}

/// An owned VMCI socket. The handle is closed when the socket is dropped.
#[derive(Debug)]
pub struct VmciSocket {
    fd: RawSocket,
    family: c_int,
}

impl VmciSocket {
    /// Creates a new socket of `socktype` with the default protocol, in
    /// the family resolved by [`system::init`].
    pub fn new(socktype: SocketType) -> Result<VmciSocket, Error> {
        VmciSocket::with_protocol(socktype, DEFAULT_PROTOCOL)
    }

    pub fn with_protocol(socktype: SocketType, protocol: c_int) -> Result<VmciSocket, Error> {
        VmciSocket::with_family(system::address_family(), socktype.as_raw(), protocol)
    }

    fn with_family(family: c_int, socktype: c_int, protocol: c_int) -> Result<VmciSocket, Error> {
        // Not resolved yet: report it the way the OS reports a bogus family
        if family == AF_VMCI_UNRESOLVED {
            return Err(Error::from_raw_os_error(sys::EAFNOSUPPORT));
        }

        let fd = sys::socket(family, socktype, protocol);
        if fd == sys::INVALID_SOCKET {
            return Err(Error::last_os_error());
        }
        Ok(VmciSocket { fd, family })
    }

    /// Binds the socket to `port` on any local context.
    pub fn bind(&self, port: u32) -> Result<(), Error> {
        self.bind_addr(VmciAddr::any(port))
    }

    pub fn bind_addr(&self, addr: VmciAddr) -> Result<(), Error> {
        cvt(sys::bind(self.fd, &addr.to_raw(self.family)))
    }

    pub fn connect(&self, addr: VmciAddr) -> Result<(), Error> {
        cvt(sys::connect(self.fd, &addr.to_raw(self.family)))?;
        trace!("connected to {}", addr);
        Ok(())
    }

    pub fn listen(&self, backlog: c_int) -> Result<(), Error> {
        cvt(sys::listen(self.fd, backlog))
    }

    /// Accepts an incoming connection. Returns the connected socket along
    /// with the address of the peer.
    pub fn accept(&self) -> Result<(VmciSocket, VmciAddr), Error> {
        // Struct is allocated (and owned) by Rust, but modified by C
        let mut raw = sockaddr_vm::default();
        let fd = sys::accept(self.fd, &mut raw);
        if fd == sys::INVALID_SOCKET {
            return Err(Error::last_os_error());
        }

        let peer = VmciAddr::from(raw);
        trace!("accepted connection from {}", peer);
        Ok((VmciSocket { fd, family: self.family }, peer))
    }

    pub fn send(&self, buf: &[u8], flags: c_int) -> Result<usize, Error> {
        cvt_len(unsafe { sys::send(self.fd, buf.as_ptr() as *const c_void, buf.len(), flags) })
    }

    pub fn send_to(&self, buf: &[u8], flags: c_int, addr: VmciAddr) -> Result<usize, Error> {
        let raw = addr.to_raw(self.family);
        let ptr = buf.as_ptr() as *const c_void;
        cvt_len(unsafe { sys::sendto(self.fd, ptr, buf.len(), flags, &raw) })
    }

    pub fn recv(&self, buf: &mut [u8], flags: c_int) -> Result<usize, Error> {
        cvt_len(unsafe { sys::recv(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags) })
    }

    /// Receives data and the address of its sender. The sender is `None`
    /// when the OS reports no address, as it does on connected streams.
    pub fn recv_from(
        &self,
        buf: &mut [u8],
        flags: c_int,
    ) -> Result<(usize, Option<VmciAddr>), Error> {
        // Struct is allocated (and owned) by Rust, but modified by C
        let mut raw = sockaddr_vm::default();
        let mut raw_len = 0;
        let ptr = buf.as_mut_ptr() as *mut c_void;
        let result =
            unsafe { sys::recvfrom(self.fd, ptr, buf.len(), flags, &mut raw, &mut raw_len) };
        let len = cvt_len(result)?;

        let sender = if sys::holds_sockaddr_vm(raw_len) {
            Some(VmciAddr::from(raw))
        } else {
            None
        };
        Ok((len, sender))
    }

    pub fn local_addr(&self) -> Result<VmciAddr, Error> {
        let mut raw = sockaddr_vm::default();
        cvt(sys::getsockname(self.fd, &mut raw))?;
        Ok(VmciAddr::from(raw))
    }

    pub fn peer_addr(&self) -> Result<VmciAddr, Error> {
        let mut raw = sockaddr_vm::default();
        cvt(sys::getpeername(self.fd, &mut raw))?;
        Ok(VmciAddr::from(raw))
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<(), Error> {
        let how = match how {
            Shutdown::Read => sys::SHUT_RD,
            Shutdown::Write => sys::SHUT_WR,
            Shutdown::Both => sys::SHUT_RDWR,
        };
        cvt(sys::shutdown(self.fd, how))
    }

    /// Closes the socket, reporting the result that drop would discard.
    pub fn close(self) -> Result<(), Error> {
        let fd = self.into_raw();
        cvt(sys::close_socket(fd))
    }

    pub fn as_raw(&self) -> RawSocket {
        self.fd
    }

    /// Gives up ownership of the handle without closing it.
    pub fn into_raw(self) -> RawSocket {
        let fd = self.fd;
        std::mem::forget(self);
        fd
    }

    /// Takes ownership of `fd`, which must be an open VMCI socket created
    /// in the currently resolved family.
    ///
    /// # Safety
    ///
    /// `fd` must be a valid socket handle not owned by anything else.
    pub unsafe fn from_raw(fd: RawSocket) -> VmciSocket {
        VmciSocket { fd, family: system::address_family() }
    }
}

impl Drop for VmciSocket {
    fn drop(&mut self) {
        sys::close_socket(self.fd);
    }
}

impl Read for VmciSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf, 0)
    }
}

impl Write for VmciSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf, 0)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
mod unix_fd {
    use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

    use super::VmciSocket;

    impl AsRawFd for VmciSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.as_raw()
        }
    }

    impl IntoRawFd for VmciSocket {
        fn into_raw_fd(self) -> RawFd {
            self.into_raw()
        }
    }

    impl FromRawFd for VmciSocket {
        unsafe fn from_raw_fd(fd: RawFd) -> VmciSocket {
            VmciSocket::from_raw(fd)
        }
    }
}

#[cfg(windows)]
mod windows_socket {
    use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket, RawSocket};

    use super::VmciSocket;

    impl AsRawSocket for VmciSocket {
        fn as_raw_socket(&self) -> RawSocket {
            self.as_raw() as RawSocket
        }
    }

    impl IntoRawSocket for VmciSocket {
        fn into_raw_socket(self) -> RawSocket {
            self.into_raw() as RawSocket
        }
    }

    impl FromRawSocket for VmciSocket {
        unsafe fn from_raw_socket(sock: RawSocket) -> VmciSocket {
            VmciSocket::from_raw(sock as crate::sys::RawSocket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_family_is_unsupported() {
        for socktype in &[SocketType::Stream, SocketType::Datagram] {
            let result = VmciSocket::with_family(AF_VMCI_UNRESOLVED, socktype.as_raw(), 0);
            let err = result.expect_err("socket created in sentinel family");
            assert_eq!(err.raw_os_error(), Some(sys::EAFNOSUPPORT));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_os_rejects_unresolved_family() {
        // What the C surface passes straight through before init
        let fd = sys::socket(AF_VMCI_UNRESOLVED, libc::SOCK_STREAM, 0);
        assert_eq!(fd, sys::INVALID_SOCKET);
        assert_eq!(sys::last_errno(), libc::EAFNOSUPPORT);
    }

    #[test]
    fn test_addr_constructors() {
        assert_eq!(VmciAddr::any(5000), VmciAddr::new(u32::MAX, 5000));
        assert_eq!(VmciAddr::host(5000).cid, 2);
        assert_eq!(VmciAddr::new(3, 1024).to_string(), "3:1024");
    }

    #[test]
    fn test_addr_raw_conversion() {
        let addr = VmciAddr::new(7, 9999);
        let raw = addr.to_raw(40);
        assert_eq!(raw.svm_family as c_int, 40);
        assert_eq!(VmciAddr::from(raw), addr);
    }

    #[test]
    fn test_socket_type_values() {
        assert_eq!(SocketType::Stream.as_raw(), sys::SOCK_STREAM);
        assert_eq!(SocketType::Datagram.as_raw(), sys::SOCK_DGRAM);
    }

    #[cfg(unix)]
    fn connected_pair() -> (VmciSocket, VmciSocket) {
        let [a, b] = sys::socketpair(libc::SOCK_STREAM).expect("failed to create socket pair");
        unsafe { (VmciSocket::from_raw(a), VmciSocket::from_raw(b)) }
    }

    #[cfg(unix)]
    #[test]
    fn test_send_recv_sizes() {
        let (mut client, mut server) = connected_pair();

        // Nothing is queued for an empty send
        assert_eq!(client.send(&[], 0).expect("empty send failed"), 0);

        client.send(&[0xa5], 0).expect("failed to send one byte");
        let mut one = [0u8; 16];
        assert_eq!(server.recv(&mut one, 0).expect("failed to recv one byte"), 1);
        assert_eq!(one[0], 0xa5);

        // MTU sized, then larger than the socket buffer
        for &size in &[1500usize, 1024 * 1024] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let expected = payload.clone();

            let writer = std::thread::spawn(move || {
                client.write_all(&payload).expect("failed to send payload");
                client
            });
            let mut received = vec![0u8; size];
            server.read_exact(&mut received).expect("failed to recv payload");
            client = writer.join().expect("writer panicked");

            assert_eq!(received, expected);
        }

        client.close().expect("failed to close client");
        server.close().expect("failed to close server");
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_write_gives_eof() {
        let (client, server) = connected_pair();
        client.send(b"last", 0).expect("failed to send");
        client.shutdown(Shutdown::Write).expect("failed to shut down");

        let mut buf = [0u8; 16];
        assert_eq!(server.recv(&mut buf, 0).expect("failed to recv"), 4);
        assert_eq!(&buf[..4], b"last");
        assert_eq!(server.recv(&mut buf, 0).expect("failed to recv eof"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_recv_from_without_sender() {
        let (client, server) = connected_pair();
        client.send(b"hi", 0).expect("failed to send");

        let mut buf = [0u8; 16];
        let (len, sender) = server.recv_from(&mut buf, 0).expect("failed to recv");
        assert_eq!(len, 2);
        assert_eq!(&buf[..2], b"hi");
        assert_eq!(sender, None);
    }

    #[cfg(unix)]
    #[test]
    fn test_send_to_connected_stream() {
        // The address is handed to the OS, which refuses it on a connected
        // stream
        let (client, _server) = connected_pair();
        let result = client.send_to(b"hi", 0, VmciAddr::host(1024));
        let err = result.expect_err("send_to succeeded");
        #[cfg(target_os = "linux")]
        assert_eq!(err.raw_os_error(), Some(libc::EISCONN));
        #[cfg(not(target_os = "linux"))]
        assert!(err.raw_os_error().is_some());
    }
}
