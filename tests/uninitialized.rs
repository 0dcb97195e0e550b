#![cfg(unix)]

extern crate vmci;

use vmci::ffi::{vmci_errno, vmci_socket};
use vmci::system;
use vmci::{SocketType, VmciSocket};

// Kept as the only test in this binary so nothing else resolves the
// family first.
#[test]
fn test_socket_before_init() {
    assert!(!system::is_initialized());

    for socktype in &[SocketType::Stream, SocketType::Datagram] {
        let err = VmciSocket::new(*socktype).expect_err("created a socket before init");
        assert_eq!(err.raw_os_error(), Some(libc::EAFNOSUPPORT));
    }

    let fd = vmci_socket(libc::SOCK_STREAM, 0);
    assert_eq!(fd, -1);
    #[cfg(target_os = "linux")]
    assert_eq!(vmci_errno(), libc::EAFNOSUPPORT);
    #[cfg(not(target_os = "linux"))]
    assert_ne!(vmci_errno(), 0);

    // Resolving and then releasing the family lands back in the same state
    if system::init().is_ok() {
        assert!(system::is_initialized());
        system::deinit();
    }
    assert!(!system::is_initialized());
    let err = VmciSocket::new(SocketType::Stream).expect_err("created a socket after deinit");
    assert_eq!(err.raw_os_error(), Some(libc::EAFNOSUPPORT));
}
