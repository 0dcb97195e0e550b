// Copyright (C) 2020, Oxide Computer Company

//! C-linkage surface of the library, for language bindings loading
//! `libvmci` directly.
//!
//! Every function follows the Berkeley sockets integer conventions: a
//! negative (or `INVALID_SOCKET`) return marks a failure whose cause is
//! read back with [`vmci_errno`]. Output parameters are written only when
//! the call succeeds, and may be null when the caller does not want them.
//!
//! None of these calls resolve the address family on their own. The host
//! calls [`vmci_init`] first; until then socket creation fails with
//! `EAFNOSUPPORT`.

use std::os::raw::{c_char, c_int, c_uint, c_void};

use crate::include::vmci_sockets::*;
use crate::sys::{self, RawSocket};
use crate::system;

unsafe fn store_addr(addr: &sockaddr_vm, cid: *mut c_int, port: *mut c_uint) {
    if !cid.is_null() {
        *cid = addr.svm_cid as c_int;
    }
    if !port.is_null() {
        *port = addr.svm_port;
    }
}

/// Resolves the VMCI address family. Returns the family, or -1 if the host
/// has no VMCI sockets service.
#[no_mangle]
pub extern "C" fn vmci_init() -> c_int {
    match system::init() {
        Ok(family) => family,
        Err(_) => AF_VMCI_UNRESOLVED,
    }
}

/// Forgets the resolved address family.
#[no_mangle]
pub extern "C" fn vmci_deinit() {
    system::deinit();
}

/// Returns the last socket error of the calling thread.
#[no_mangle]
pub extern "C" fn vmci_errno() -> c_int {
    sys::last_errno()
}

/// Returns the local context id, or -1 (`VMADDR_CID_ANY`) on failure.
#[no_mangle]
pub extern "C" fn vmci_get_local_cid() -> c_int {
    system::local_cid_or_any() as c_int
}

#[no_mangle]
pub extern "C" fn vmci_socket(socktype: c_int, protocol: c_int) -> RawSocket {
    sys::socket(system::address_family(), socktype, protocol)
}

/// Binds to `port` on any local context.
#[no_mangle]
pub extern "C" fn vmci_bind(sockfd: RawSocket, port: c_uint) -> c_int {
    let addr = sockaddr_vm::new(system::address_family(), VMADDR_CID_ANY, port);
    sys::bind(sockfd, &addr)
}

#[no_mangle]
pub extern "C" fn vmci_connect(sockfd: RawSocket, cid: c_int, port: c_uint) -> c_int {
    let addr = sockaddr_vm::new(system::address_family(), cid as c_uint, port);
    sys::connect(sockfd, &addr)
}

#[no_mangle]
pub extern "C" fn vmci_listen(sockfd: RawSocket, backlog: c_int) -> c_int {
    sys::listen(sockfd, backlog)
}

/// Accepts a connection, storing the peer's context id and port.
///
/// # Safety
///
/// `cid` and `port` must each be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn vmci_accept(
    sockfd: RawSocket,
    cid: *mut c_int,
    port: *mut c_uint,
) -> RawSocket {
    let mut addr = sockaddr_vm::default();
    let fd = sys::accept(sockfd, &mut addr);
    if fd != sys::INVALID_SOCKET {
        store_addr(&addr, cid, port);
    }
    fd
}

/// # Safety
///
/// `buffer` must be valid for reads of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn vmci_send(
    sockfd: RawSocket,
    buffer: *const c_char,
    size: usize,
    flags: c_int,
) -> isize {
    sys::send(sockfd, buffer as *const c_void, size, flags)
}

/// # Safety
///
/// `buffer` must be valid for reads of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn vmci_sendto(
    sockfd: RawSocket,
    buffer: *const c_char,
    size: usize,
    flags: c_int,
    cid: c_int,
    port: c_uint,
) -> isize {
    let addr = sockaddr_vm::new(system::address_family(), cid as c_uint, port);
    sys::sendto(sockfd, buffer as *const c_void, size, flags, &addr)
}

/// # Safety
///
/// `buffer` must be valid for writes of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn vmci_recv(
    sockfd: RawSocket,
    buffer: *mut c_char,
    size: usize,
    flags: c_int,
) -> isize {
    sys::recv(sockfd, buffer as *mut c_void, size, flags)
}

/// Receives data, storing the sender's context id and port. The outputs
/// are left as they were when the OS reports no sender, as on connected
/// streams.
///
/// # Safety
///
/// `buffer` must be valid for writes of `size` bytes; `cid` and `port`
/// must each be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn vmci_recvfrom(
    sockfd: RawSocket,
    buffer: *mut c_char,
    size: usize,
    flags: c_int,
    cid: *mut c_int,
    port: *mut c_uint,
) -> isize {
    let mut addr = sockaddr_vm::default();
    let mut addr_len = 0;
    let buf = buffer as *mut c_void;
    let received = sys::recvfrom(sockfd, buf, size, flags, &mut addr, &mut addr_len);
    if received >= 0 && sys::holds_sockaddr_vm(addr_len) {
        store_addr(&addr, cid, port);
    }
    received
}

/// Stores the socket's own context id and port.
///
/// # Safety
///
/// `cid` and `port` must each be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn vmci_getname(
    sockfd: RawSocket,
    cid: *mut c_int,
    port: *mut c_uint,
) -> c_int {
    let mut addr = sockaddr_vm::default();
    let result = sys::getsockname(sockfd, &mut addr);
    if result == 0 {
        store_addr(&addr, cid, port);
    }
    result
}

/// Stores the connected peer's context id and port.
///
/// # Safety
///
/// `cid` and `port` must each be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn vmci_getpeername(
    sockfd: RawSocket,
    cid: *mut c_int,
    port: *mut c_uint,
) -> c_int {
    let mut addr = sockaddr_vm::default();
    let result = sys::getpeername(sockfd, &mut addr);
    if result == 0 {
        store_addr(&addr, cid, port);
    }
    result
}

#[no_mangle]
pub extern "C" fn vmci_shutdown(sockfd: RawSocket, how: c_int) -> c_int {
    sys::shutdown(sockfd, how)
}

#[no_mangle]
pub extern "C" fn vmci_close(sockfd: RawSocket) -> c_int {
    sys::close_socket(sockfd)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::ptr::null_mut;

    #[test]
    fn test_errno_after_bad_handle() {
        assert_eq!(vmci_close(-1), -1);
        assert_eq!(vmci_errno(), libc::EBADF);

        assert_eq!(vmci_listen(-1, 1), -1);
        assert_eq!(vmci_errno(), libc::EBADF);
    }

    #[test]
    fn test_accept_failure_leaves_outputs() {
        let mut cid: c_int = 1234;
        let mut port: c_uint = 5678;
        let fd = unsafe { vmci_accept(-1, &mut cid, &mut port) };
        assert_eq!(fd, sys::INVALID_SOCKET);
        assert_eq!(vmci_errno(), libc::EBADF);
        assert_eq!(cid, 1234);
        assert_eq!(port, 5678);
    }

    #[test]
    fn test_null_outputs_on_failure() {
        let result = unsafe { vmci_getname(-1, null_mut(), null_mut()) };
        assert_eq!(result, -1);
        assert_eq!(vmci_errno(), libc::EBADF);
    }

    fn socket_pair() -> [RawSocket; 2] {
        sys::socketpair(libc::SOCK_STREAM).expect("failed to create socket pair")
    }

    #[test]
    fn test_send_recv_close() {
        let [a, b] = socket_pair();

        assert_eq!(unsafe { vmci_send(a, b"".as_ptr() as *const c_char, 0, 0) }, 0);

        let msg = b"hello vmci";
        let sent = unsafe { vmci_send(a, msg.as_ptr() as *const c_char, msg.len(), 0) };
        assert_eq!(sent, msg.len() as isize);

        let mut buf = [0u8; 64];
        let got = unsafe { vmci_recv(b, buf.as_mut_ptr() as *mut c_char, buf.len(), 0) };
        assert_eq!(got, msg.len() as isize);
        assert_eq!(&buf[..msg.len()], &msg[..]);

        assert_eq!(vmci_shutdown(a, libc::SHUT_WR), 0);
        let got = unsafe { vmci_recv(b, buf.as_mut_ptr() as *mut c_char, buf.len(), 0) };
        assert_eq!(got, 0);

        assert_eq!(vmci_close(a), 0);
        assert_eq!(vmci_close(b), 0);
    }

    #[test]
    fn test_recvfrom_without_sender_leaves_outputs() {
        let [a, b] = socket_pair();
        let msg = b"hi";
        unsafe { vmci_send(a, msg.as_ptr() as *const c_char, msg.len(), 0) };

        let mut cid: c_int = 77;
        let mut port: c_uint = 88;
        let mut buf = [0u8; 16];
        let got = unsafe {
            vmci_recvfrom(b, buf.as_mut_ptr() as *mut c_char, buf.len(), 0, &mut cid, &mut port)
        };
        assert_eq!(got, 2);
        assert_eq!(&buf[..2], b"hi");
        assert_eq!(cid, 77);
        assert_eq!(port, 88);

        assert_eq!(vmci_close(a), 0);
        assert_eq!(vmci_close(b), 0);
    }

    #[test]
    fn test_sendto_connected_stream() {
        let [a, b] = socket_pair();
        let msg = b"hi";
        let sent = unsafe {
            let host = VMADDR_CID_HOST as c_int;
            vmci_sendto(a, msg.as_ptr() as *const c_char, msg.len(), 0, host, 1024)
        };
        assert_eq!(sent, -1);
        #[cfg(target_os = "linux")]
        assert_eq!(vmci_errno(), libc::EISCONN);

        assert_eq!(vmci_close(a), 0);
        assert_eq!(vmci_close(b), 0);
    }
}
