//! Named POSIX shared memory segments with a geometry descriptor
//!
//! The owner creates a segment and stamps a [`SegmentDescriptor`] into its
//! first bytes; attachers open the name and read the descriptor back to learn
//! the agreed size, so capacity never has to be communicated out of band.

use crate::config::AccessMode;
use crate::error::{HatchError, Result};
use rustix::fd::OwnedFd;
use rustix::fs::{fstat, ftruncate};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

/// Namespace prefix for every OS object this crate creates
pub(crate) const SHM_PREFIX: &str = "/memhatch_";

/// Suffix appended to the segment name to derive the notifier's object name
pub(crate) const EVENT_SUFFIX: &str = "-event";

/// Longest user-supplied name that keeps both derived OS names within NAME_MAX
const MAX_NAME_LEN: usize = 255 - SHM_PREFIX.len() - EVENT_SUFFIX.len();

/// Header record stored at the start of every segment
///
/// Written once by the owner at creation time and treated as authoritative by
/// every attacher; never mutated afterwards.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Total mapped size of the segment in bytes, header included
    pub total_size: u64,
}

/// Size of the descriptor record at the start of the mapping
pub const HEADER_SIZE: usize = std::mem::size_of::<SegmentDescriptor>();

/// Derive the OS object name for `name` with the given suffix
///
/// The length limit is sized for the longer of the two derived names, so a
/// name accepted for the segment is always valid for its notifier too.
pub(crate) fn object_name(name: &str, suffix: &str) -> Result<CString> {
    if name.len() > MAX_NAME_LEN {
        return Err(HatchError::NameTooLong {
            max: MAX_NAME_LEN,
            got: name.len(),
        });
    }

    CString::new(format!("{}{}{}", SHM_PREFIX, name, suffix)).map_err(|_| {
        HatchError::InvalidName {
            name: name.to_string(),
        }
    })
}

/// Handle to a mapped shared memory segment
pub struct SharedSegment {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    is_owner: bool,
}

// SAFETY: the mapping is valid for the lifetime of the handle and all access
// to it goes through positioned copies or atomics; cross-thread and
// cross-process ordering is the caller's protocol (length word + notifier).
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Create a new segment of `total_size` bytes and stamp its descriptor
    ///
    /// Fails with `SegmentAlreadyExists` if the name is already registered
    /// with the OS. The creating handle owns the name and unlinks it on drop;
    /// attached handles in other processes keep their live mappings.
    ///
    /// The region is mapped read-write: the creator must be able to write the
    /// descriptor before any attacher can observe the buffer.
    pub fn create(name: &str, total_size: usize) -> Result<Self> {
        let c_name = object_name(name, "")?;
        if total_size < HEADER_SIZE {
            return Err(HatchError::InvalidDescriptor {
                name: name.to_string(),
                total_size: total_size as u64,
            });
        }

        let fd = shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH,
        )
        .map_err(|e| {
            if e == Errno::EXIST {
                HatchError::SegmentAlreadyExists {
                    name: name.to_string(),
                }
            } else {
                HatchError::SegmentCreate {
                    name: name.to_string(),
                    source: e.into(),
                }
            }
        })?;

        // From here on the name is registered with the OS; a failure before
        // the handle exists must retire it again or the name stays squatted
        // and every retry reports `SegmentAlreadyExists` with no segment
        // behind it.
        if let Err(e) = ftruncate(&fd, total_size as u64) {
            let _ = shm_unlink(c_name.as_c_str());
            return Err(HatchError::Truncate(e.into()));
        }

        let mapped = unsafe {
            mmap(
                std::ptr::null_mut(),
                total_size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        };
        let addr = match mapped {
            Ok(addr) => addr,
            Err(e) => {
                let _ = shm_unlink(c_name.as_c_str());
                return Err(HatchError::Mmap(e.into()));
            }
        };

        let addr = NonNull::new(addr.cast::<u8>()).expect("mmap returned null");

        // Zero the region, then publish the geometry for future attachers.
        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, total_size);
            std::ptr::write(
                addr.as_ptr() as *mut SegmentDescriptor,
                SegmentDescriptor {
                    total_size: total_size as u64,
                },
            );
        }

        tracing::debug!("created shared segment '{}' ({} bytes)", name, total_size);

        Ok(Self {
            fd,
            addr,
            size: total_size,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Open an existing segment by name
    ///
    /// Two-phase: maps only the descriptor prefix first to learn the agreed
    /// size, then maps the full region. The descriptor is authoritative for
    /// geometry; the backing object merely has to be large enough to hold it,
    /// otherwise the open fails with `InvalidDescriptor` (a zero descriptor
    /// means the owner has not finished initializing yet).
    pub fn open(name: &str, access: AccessMode) -> Result<Self> {
        let c_name = object_name(name, "")?;

        let oflags = match access {
            AccessMode::ReadOnly => ShmOFlags::RDONLY,
            AccessMode::ReadWrite => ShmOFlags::RDWR,
        };

        let fd = shm_open(c_name.as_c_str(), oflags, Mode::empty()).map_err(|e| {
            if e == Errno::NOENT {
                HatchError::SegmentNotFound {
                    name: name.to_string(),
                }
            } else {
                HatchError::SegmentOpen {
                    name: name.to_string(),
                    source: e.into(),
                }
            }
        })?;

        // Touching pages past the end of the backing object faults, so the
        // object must already hold a full descriptor before we map anything.
        let backing = fstat(&fd).map_err(|e| HatchError::SegmentOpen {
            name: name.to_string(),
            source: e.into(),
        })?;
        if (backing.st_size as u64) < HEADER_SIZE as u64 {
            return Err(HatchError::InvalidDescriptor {
                name: name.to_string(),
                total_size: backing.st_size as u64,
            });
        }

        // Phase one: read the descriptor through a header-sized mapping.
        let descriptor = unsafe {
            let prefix = mmap(
                std::ptr::null_mut(),
                HEADER_SIZE,
                ProtFlags::READ,
                MapFlags::SHARED,
                &fd,
                0,
            )
            .map_err(|e| HatchError::Mmap(e.into()))?;

            let descriptor = std::ptr::read(prefix as *const SegmentDescriptor);
            let _ = munmap(prefix, HEADER_SIZE);
            descriptor
        };

        let total_size = descriptor.total_size;
        if total_size < HEADER_SIZE as u64 || total_size > backing.st_size as u64 {
            return Err(HatchError::InvalidDescriptor {
                name: name.to_string(),
                total_size,
            });
        }
        let total_size = total_size as usize;

        // Phase two: map the full region for steady-state use.
        let prot = match access {
            AccessMode::ReadOnly => ProtFlags::READ,
            AccessMode::ReadWrite => ProtFlags::READ | ProtFlags::WRITE,
        };

        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                total_size,
                prot,
                MapFlags::SHARED,
                &fd,
                0,
            )
            .map_err(|e| HatchError::Mmap(e.into()))?
        };

        let addr = NonNull::new(addr.cast::<u8>()).expect("mmap returned null");

        tracing::debug!("attached shared segment '{}' ({} bytes)", name, total_size);

        Ok(Self {
            fd,
            addr,
            size: total_size,
            name: name.to_string(),
            is_owner: false,
        })
    }

    /// Copy `data` into the mapping at `offset`
    ///
    /// The mapping must be writable; offsets are a crate invariant.
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.size, "write past end of mapping");
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.addr.as_ptr().add(offset), data.len());
        }
    }

    /// Copy bytes from the mapping at `offset` into `buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= self.size, "read past end of mapping");
        unsafe {
            std::ptr::copy_nonoverlapping(self.addr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
    }

    /// View four bytes of the mapping at `offset` as an atomic word
    pub fn atomic_u32_at(&self, offset: usize) -> &AtomicU32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "misaligned or out-of-range atomic access"
        );
        unsafe { &*(self.addr.as_ptr().add(offset) as *const AtomicU32) }
    }

    /// The descriptor stamped into the segment
    pub fn descriptor(&self) -> SegmentDescriptor {
        SegmentDescriptor {
            total_size: self.size as u64,
        }
    }

    /// Total mapped size in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The user-supplied segment name (without the OS prefix)
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle created the segment
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }

        // The creator retires the name; live mappings elsewhere survive.
        if self.is_owner {
            if let Ok(c_name) = object_name(&self.name, "") {
                let _ = shm_unlink(c_name.as_c_str());
            }
        }
    }
}
