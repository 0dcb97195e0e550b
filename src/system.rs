// Copyright (C) 2020, Oxide Computer Company

//! VMCI sockets platform service and the process-wide address family.
//!
//! The host application calls [`init`] once before creating any socket and
//! may call [`deinit`] when it is done with the library:
//!
//! ```no_run
//! use vmci::system;
//! use vmci::socket::{SocketType, VmciSocket};
//! system::init().expect("failed to resolve VMCI address family");
//! let sock = VmciSocket::new(SocketType::Stream).expect("failed to create socket");
//! sock.close().expect("failed to close socket");
//! system::deinit();
//! ```

use std::io::Error;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::InitError;
use crate::include::vmci_sockets::{AF_VMCI_UNRESOLVED, VMADDR_CID_ANY};

static AF_VMCI: AtomicI32 = AtomicI32::new(AF_VMCI_UNRESOLVED);
static SYSTEM: Mutex<Option<VmciSystem>> = Mutex::new(None);

fn system_lock() -> MutexGuard<'static, Option<VmciSystem>> {
    SYSTEM.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves the VMCI address family and caches it for every socket
/// operation in the process. Returns the family.
///
/// Calling `init` again after it succeeded returns the cached family
/// without querying the host. On failure the cache keeps its sentinel value
/// and socket creation keeps failing with `EAFNOSUPPORT`.
pub fn init() -> Result<c_int, InitError> {
    let mut system = system_lock();
    if let Some(ref existing) = *system {
        return Ok(existing.af_value());
    }

    let resolved = VmciSystem::new().map_err(|e| {
        warn!("failed to resolve VMCI address family: {}", e);
        e
    })?;
    let family = resolved.af_value();
    AF_VMCI.store(family, Ordering::Release);
    *system = Some(resolved);

    debug!("resolved VMCI address family {}", family);
    Ok(family)
}

/// Restores the sentinel family and releases the control device, if one
/// is held. Sockets created before this call stay usable until closed.
pub fn deinit() {
    let mut system = system_lock();
    AF_VMCI.store(AF_VMCI_UNRESOLVED, Ordering::Release);
    if system.take().is_some() {
        debug!("released VMCI address family");
    }
}

/// The cached VMCI address family, or the sentinel if [`init`] has not
/// succeeded.
pub fn address_family() -> c_int {
    AF_VMCI.load(Ordering::Acquire)
}

pub fn is_initialized() -> bool {
    address_family() != AF_VMCI_UNRESOLVED
}

/// Returns the context id of this host. Uses the control device held by
/// [`init`] when there is one, otherwise queries the host directly.
pub fn get_local_cid() -> Result<u32, Error> {
    let system = system_lock();
    match *system {
        Some(ref existing) => existing.local_cid(),
        None => platform::local_cid(None),
    }
}

/// Same as [`get_local_cid`], with failure folded into `VMADDR_CID_ANY` the
/// way the vendor helper reports it.
pub fn local_cid_or_any() -> u32 {
    get_local_cid().unwrap_or(VMADDR_CID_ANY)
}

/// The VmciSystem module handles the VMCI sockets platform service. On
/// hosts running the legacy vendor driver it owns the control device
/// handle, which keeps the address family registered while it is open.
#[derive(Debug)]
pub struct VmciSystem {
    family: c_int,
    device: Option<platform::Device>,
}

impl VmciSystem {
    /// Queries the host for the VMCI address family, and returns a
    /// `Result`. If the query fails, the `Result` unwraps as an
    /// `InitError`. If it succeeds, the `Result` unwraps as an instance of
    /// `VmciSystem` holding the family.

    pub fn new() -> Result<VmciSystem, InitError> {
        let (family, device) = platform::resolve_af_value()?;
        if family < 0 {
            return Err(InitError::InvalidFamily(family));
        }
        Ok(VmciSystem { family, device })
    }

    pub fn af_value(&self) -> c_int {
        self.family
    }

    pub fn local_cid(&self) -> Result<u32, Error> {
        platform::local_cid(self.device.as_ref())
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs::{File, OpenOptions};
    use std::io::Error;
    use std::os::raw::{c_int, c_uint};

    use log::debug;
    use vmm_sys_util::ioctl::ioctl_with_mut_ref;
    use vmm_sys_util::{ioctl_io_nr, ioctl_ioc_nr};

    use crate::error::InitError;
    use crate::include::vmci_sockets::*;
    use crate::sys;

    ioctl_io_nr!(
        IOCTL_VMCI_SOCKETS_GET_AF_VALUE,
        VMCI_SOCKETS_IOCTL_TYPE,
        VMCI_SOCKETS_GET_AF_VALUE_NR
    );
    ioctl_io_nr!(
        IOCTL_VMCI_SOCKETS_GET_LOCAL_CID,
        VMCI_SOCKETS_IOCTL_TYPE,
        VMCI_SOCKETS_GET_LOCAL_CID_NR
    );

    pub type Device = File;

    fn open_device() -> Result<File, Error> {
        OpenOptions::new().read(true).open(VMCI_SOCKETS_DEVICE)
    }

    // Kernels with the upstream vsock core serve VMCI through AF_VSOCK.
    fn has_upstream_family() -> bool {
        let fd = sys::socket(libc::AF_VSOCK, libc::SOCK_STREAM, 0);
        if fd == sys::INVALID_SOCKET {
            return false;
        }
        sys::close_socket(fd);
        true
    }

    pub fn resolve_af_value() -> Result<(c_int, Option<Device>), InitError> {
        if has_upstream_family() {
            debug!("using upstream AF_VSOCK family");
            return Ok((libc::AF_VSOCK, None));
        }

        let device = open_device().map_err(InitError::Device)?;
        let mut family: c_int = AF_VMCI_UNRESOLVED;
        let request = IOCTL_VMCI_SOCKETS_GET_AF_VALUE();
        let result = unsafe { ioctl_with_mut_ref(&device, request, &mut family) };
        if result < 0 {
            return Err(InitError::Device(Error::last_os_error()));
        }

        debug!("queried address family from {}", VMCI_SOCKETS_DEVICE);
        Ok((family, Some(device)))
    }

    pub fn local_cid(device: Option<&Device>) -> Result<u32, Error> {
        let opened;
        let device = match device {
            Some(device) => device,
            None => {
                opened = open_device()?;
                &opened
            }
        };

        // Struct is allocated (and owned) by Rust, but modified by C
        let mut cid: c_uint = VMADDR_CID_ANY;
        let request = IOCTL_VMCI_SOCKETS_GET_LOCAL_CID();
        let result = unsafe { ioctl_with_mut_ref(device, request, &mut cid) };
        if result < 0 {
            return Err(Error::last_os_error());
        }
        Ok(cid)
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::OsStr;
    use std::io::Error;
    use std::iter::once;
    use std::mem::size_of;
    use std::os::raw::{c_int, c_void};
    use std::os::windows::ffi::OsStrExt;
    use std::ptr::null_mut;

    use crate::error::InitError;
    use crate::include::vmci_sockets::*;

    const GENERIC_READ: u32 = 0x8000_0000;
    const OPEN_EXISTING: u32 = 3;

    #[link(name = "kernel32")]
    extern "system" {
        fn CreateFileW(
            name: *const u16,
            access: u32,
            share: u32,
            security: *mut c_void,
            disposition: u32,
            flags: u32,
            template: *mut c_void,
        ) -> *mut c_void;
        fn DeviceIoControl(
            device: *mut c_void,
            code: u32,
            in_buf: *mut c_void,
            in_size: u32,
            out_buf: *mut c_void,
            out_size: u32,
            returned: *mut u32,
            overlapped: *mut c_void,
        ) -> c_int;
        fn CloseHandle(handle: *mut c_void) -> c_int;
    }

    // The driver keeps nothing registered per handle on Windows, so the
    // device is opened per query.
    #[derive(Debug)]
    pub enum Device {}

    fn device_query(code: u32) -> Result<u32, Error> {
        let path: Vec<u16> = OsStr::new(VMCI_SOCKETS_DEVICE).encode_wide().chain(once(0)).collect();
        let handle = unsafe {
            CreateFileW(path.as_ptr(), GENERIC_READ, 0, null_mut(), OPEN_EXISTING, 0, null_mut())
        };
        if handle as isize == -1 {
            return Err(Error::last_os_error());
        }

        let mut val: u32 = VMADDR_CID_ANY;
        let mut returned: u32 = 0;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                code,
                &mut val as *mut u32 as *mut c_void,
                size_of::<u32>() as u32,
                &mut val as *mut u32 as *mut c_void,
                size_of::<u32>() as u32,
                &mut returned,
                null_mut(),
            )
        };
        let err = Error::last_os_error();
        unsafe { CloseHandle(handle) };
        if ok == 0 {
            return Err(err);
        }
        Ok(val)
    }

    pub fn resolve_af_value() -> Result<(c_int, Option<Device>), InitError> {
        let family = device_query(VMCI_SOCKETS_GET_AF_VALUE).map_err(InitError::Device)?;
        Ok((family as c_int, None))
    }

    pub fn local_cid(_device: Option<&Device>) -> Result<u32, Error> {
        device_query(VMCI_SOCKETS_GET_LOCAL_CID)
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use std::io::{Error, ErrorKind};
    use std::os::raw::c_int;

    use crate::error::InitError;

    #[derive(Debug)]
    pub enum Device {}

    pub fn resolve_af_value() -> Result<(c_int, Option<Device>), InitError> {
        Err(InitError::Unsupported)
    }

    pub fn local_cid(_device: Option<&Device>) -> Result<u32, Error> {
        Err(Error::from(ErrorKind::Unsupported))
    }
}
