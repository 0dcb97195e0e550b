// Copyright (C) 2020, Oxide Computer Company

use libc::{c_int, c_void, sockaddr};

use crate::include::vmci_sockets::sockaddr_vm;
use super::sockaddr_vm_len;

pub type RawSocket = c_int;
pub type SockLen = libc::socklen_t;

pub const INVALID_SOCKET: RawSocket = -1;
pub const SOCKET_ERROR: c_int = -1;

pub const SOCK_STREAM: c_int = libc::SOCK_STREAM;
pub const SOCK_DGRAM: c_int = libc::SOCK_DGRAM;

pub const EAFNOSUPPORT: c_int = libc::EAFNOSUPPORT;

pub const SHUT_RD: c_int = libc::SHUT_RD;
pub const SHUT_WR: c_int = libc::SHUT_WR;
pub const SHUT_RDWR: c_int = libc::SHUT_RDWR;

/// Last OS error for the calling thread.
pub fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

pub fn socket(family: c_int, socktype: c_int, protocol: c_int) -> RawSocket {
    unsafe { libc::socket(family, socktype, protocol) }
}

/// Connected pair of unix domain sockets of `socktype`, standing in for a
/// VMCI connection where no transport is present.
#[cfg(test)]
pub fn socketpair(socktype: c_int) -> std::io::Result<[RawSocket; 2]> {
    let mut fds = [INVALID_SOCKET; 2];
    let result = unsafe { libc::socketpair(libc::AF_UNIX, socktype, 0, fds.as_mut_ptr()) };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fds)
}

pub fn bind(fd: RawSocket, addr: &sockaddr_vm) -> c_int {
    let name = addr as *const sockaddr_vm as *const sockaddr;
    unsafe { libc::bind(fd, name, sockaddr_vm_len()) }
}

pub fn connect(fd: RawSocket, addr: &sockaddr_vm) -> c_int {
    let name = addr as *const sockaddr_vm as *const sockaddr;
    unsafe { libc::connect(fd, name, sockaddr_vm_len()) }
}

pub fn listen(fd: RawSocket, backlog: c_int) -> c_int {
    unsafe { libc::listen(fd, backlog) }
}

pub fn accept(fd: RawSocket, addr: &mut sockaddr_vm) -> RawSocket {
    let mut len = sockaddr_vm_len();
    unsafe { libc::accept(fd, addr as *mut sockaddr_vm as *mut sockaddr, &mut len) }
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn send(fd: RawSocket, buf: *const c_void, len: usize, flags: c_int) -> isize {
    libc::send(fd, buf, len, flags)
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn sendto(
    fd: RawSocket,
    buf: *const c_void,
    len: usize,
    flags: c_int,
    addr: &sockaddr_vm,
) -> isize {
    let name = addr as *const sockaddr_vm as *const sockaddr;
    libc::sendto(fd, buf, len, flags, name, sockaddr_vm_len())
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recv(fd: RawSocket, buf: *mut c_void, len: usize, flags: c_int) -> isize {
    libc::recv(fd, buf, len, flags)
}

/// Receives into `buf` and the sender into `addr`. `addr_len` comes back
/// with the length the OS wrote, zero when it had no address to report.
///
/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recvfrom(
    fd: RawSocket,
    buf: *mut c_void,
    len: usize,
    flags: c_int,
    addr: &mut sockaddr_vm,
    addr_len: &mut SockLen,
) -> isize {
    *addr_len = sockaddr_vm_len();
    libc::recvfrom(fd, buf, len, flags, addr as *mut sockaddr_vm as *mut sockaddr, addr_len)
}

pub fn getsockname(fd: RawSocket, addr: &mut sockaddr_vm) -> c_int {
    let mut len = sockaddr_vm_len();
    unsafe { libc::getsockname(fd, addr as *mut sockaddr_vm as *mut sockaddr, &mut len) }
}

pub fn getpeername(fd: RawSocket, addr: &mut sockaddr_vm) -> c_int {
    let mut len = sockaddr_vm_len();
    unsafe { libc::getpeername(fd, addr as *mut sockaddr_vm as *mut sockaddr, &mut len) }
}

pub fn shutdown(fd: RawSocket, how: c_int) -> c_int {
    unsafe { libc::shutdown(fd, how) }
}

pub fn close_socket(fd: RawSocket) -> c_int {
    unsafe { libc::close(fd) }
}
