// Copyright (C) 2020, Oxide Computer Company

//! Constants and structs for interfacing with the VMCI sockets interface.
//!
//! These are defined in Rust, but mimic the C constants and structs
//! defined in `vmci_sockets.h` and, for the upstream Linux family,
//! `linux/vm_sockets.h`.

#![allow(non_camel_case_types)]

use std::os::raw::{c_int, c_uint, c_ushort};

// Address family value held before resolution and after teardown. No host
// assigns a negative family, so socket(2) rejects it with EAFNOSUPPORT.
pub const AF_VMCI_UNRESOLVED: c_int = -1;

// Well known context ids
pub const VMADDR_CID_HYPERVISOR: c_uint = 0;
pub const VMADDR_CID_LOCAL: c_uint = 1;
pub const VMADDR_CID_HOST: c_uint = 2;
pub const VMADDR_CID_ANY: c_uint = c_uint::MAX;

pub const VMADDR_PORT_ANY: c_uint = c_uint::MAX;

// Control device exposing the VMCI sockets ioctls on Linux.
#[cfg(target_os = "linux")]
pub const VMCI_SOCKETS_DEVICE: &str = "/dev/vsock";

// ioctl type and numbers against the control device. Both are _IO(7, nr),
// i.e. 1976 and 1977 in the vendor header.
#[cfg(target_os = "linux")]
pub const VMCI_SOCKETS_IOCTL_TYPE: c_uint = 7;
#[cfg(target_os = "linux")]
pub const VMCI_SOCKETS_GET_AF_VALUE_NR: c_uint = 0xb8;
#[cfg(target_os = "linux")]
pub const VMCI_SOCKETS_GET_LOCAL_CID_NR: c_uint = 0xb9;

// Control device and DeviceIoControl codes on Windows.
#[cfg(windows)]
pub const VMCI_SOCKETS_DEVICE: &str = "\\\\.\\VMCI";
#[cfg(windows)]
pub const VMCI_SOCKETS_GET_AF_VALUE: u32 = 0x8103_2068;
#[cfg(windows)]
pub const VMCI_SOCKETS_GET_LOCAL_CID: u32 = 0x8103_206c;

#[cfg(unix)]
pub type sa_family_t = libc::sa_family_t;
#[cfg(windows)]
pub type sa_family_t = c_ushort;

// Define struct from vmci_sockets.h

// BSD derived stacks carry a length byte ahead of a one byte family.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct sockaddr_vm {
    pub svm_len: u8,
    pub svm_family: sa_family_t,
    pub svm_reserved1: c_ushort,
    pub svm_port: c_uint,
    pub svm_cid: c_uint,
    pub svm_zero: [u8; 4],
}

#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct sockaddr_vm {
    pub svm_family: sa_family_t,
    pub svm_reserved1: c_ushort,
    pub svm_port: c_uint,
    pub svm_cid: c_uint,
    pub svm_zero: [u8; 4],
}

impl sockaddr_vm {
    /// Builds an address in `family` for the endpoint `cid`:`port`. All
    /// other fields stay zeroed.
    pub fn new(family: c_int, cid: c_uint, port: c_uint) -> sockaddr_vm {
        let mut addr = sockaddr_vm {
            svm_family: family as sa_family_t,
            svm_port: port,
            svm_cid: cid,
            ..Default::default()
        };
        addr.set_len();
        addr
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    fn set_len(&mut self) {
        self.svm_len = std::mem::size_of::<sockaddr_vm>() as u8;
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
    fn set_len(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_sockaddr_vm_layout() {
        // Same size as a generic struct sockaddr
        assert_eq!(size_of::<sockaddr_vm>(), 16);

        let addr = sockaddr_vm::default();
        let base = &addr as *const sockaddr_vm as usize;
        assert_eq!(&addr.svm_port as *const c_uint as usize - base, 4);
        assert_eq!(&addr.svm_cid as *const c_uint as usize - base, 8);
        assert_eq!(&addr.svm_zero as *const [u8; 4] as usize - base, 12);
    }

    #[test]
    fn test_sockaddr_vm_new() {
        let addr = sockaddr_vm::new(40, VMADDR_CID_HOST, 1024);
        assert_eq!(addr.svm_family, 40);
        assert_eq!(addr.svm_reserved1, 0);
        assert_eq!(addr.svm_cid, 2);
        assert_eq!(addr.svm_port, 1024);
        assert_eq!(addr.svm_zero, [0; 4]);
    }

    #[test]
    fn test_any_values() {
        // The C library spells both of these as -1
        assert_eq!(VMADDR_CID_ANY, -1i32 as c_uint);
        assert_eq!(VMADDR_PORT_ANY, -1i32 as c_uint);
    }
}
