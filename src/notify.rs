//! Cross-process wake notifier backed by a futex word in shared memory
//!
//! Each segment gets a companion object named after it with an `-event`
//! suffix, holding a single sequence word. [`Notifier::signal`] bumps the
//! word and wakes one waiter; a signal sent while nobody waits leaves only
//! the bump behind and wakes no one later. That mirrors an auto-reset event
//! and is exactly the contract the endpoint protocol is written against.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};

use crate::error::{HatchError, Result};
use crate::segment::{object_name, EVENT_SUFFIX};

/// Mapped size of the notifier object, one page for a four-byte word
const NOTIFIER_SIZE: usize = 4096;

/// One endpoint's handle on the shared wake word
pub struct Notifier {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    name: String,
    unlink_on_drop: bool,
}

// SAFETY: the mapping stays valid for the handle's lifetime and the wake word
// is only touched through atomic operations and the futex syscall.
unsafe impl Send for Notifier {}
unsafe impl Sync for Notifier {}

impl Notifier {
    /// Open the notifier for `name`, creating the OS object if needed
    ///
    /// Either side may get here first, so creation is not exclusive; a fresh
    /// object starts zeroed, which is a valid sequence word. The mapping is
    /// always read-write because even a read-only endpoint bumps the word
    /// when it shuts its listener down. When `owner` is set the OS name is
    /// unlinked on drop, alongside the segment it belongs to.
    pub fn open_or_create(name: &str, owner: bool) -> Result<Self> {
        let c_name = object_name(name, EVENT_SUFFIX)?;

        let fd = shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH,
        )
        .map_err(|e| HatchError::NotifierUnavailable {
            name: name.to_string(),
            source: e.into(),
        })?;

        // Harmless when the object already has its size.
        ftruncate(&fd, NOTIFIER_SIZE as u64).map_err(|e| HatchError::NotifierUnavailable {
            name: name.to_string(),
            source: e.into(),
        })?;

        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                NOTIFIER_SIZE,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
            .map_err(|e| HatchError::NotifierUnavailable {
                name: name.to_string(),
                source: e.into(),
            })?
        };

        let addr = NonNull::new(addr.cast::<u8>()).expect("mmap returned null");

        Ok(Self {
            fd,
            addr,
            name: name.to_string(),
            unlink_on_drop: owner,
        })
    }

    #[inline(always)]
    fn seq(&self) -> &AtomicU32 {
        // SAFETY: offset 0 of the mapping is reserved for the wake word and
        // the mapping outlives the returned reference.
        unsafe { &*(self.addr.as_ptr() as *const AtomicU32) }
    }

    /// Wake one waiter, if any is parked right now
    ///
    /// The sequence bump happens before the wake, so a waiter racing between
    /// its snapshot and its sleep still notices the signal.
    pub fn signal(&self) {
        self.seq().fetch_add(1, Ordering::Release);
        unsafe {
            futex(self.addr.as_ptr(), libc::FUTEX_WAKE, 1);
        }
    }

    /// Wake every current and in-flight waiter
    ///
    /// Used for shutdown: the bump also flushes waiters that have taken their
    /// snapshot but not yet reached the kernel.
    pub fn signal_all(&self) {
        self.seq().fetch_add(1, Ordering::Release);
        unsafe {
            futex(self.addr.as_ptr(), libc::FUTEX_WAKE, libc::c_int::MAX as u32);
        }
    }

    /// Current value of the sequence word
    ///
    /// Take a snapshot, re-check whatever condition the wait is for, then
    /// hand the snapshot to [`Notifier::wait_from`]; a signal arriving
    /// anywhere in between moves the word and the wait returns immediately
    /// instead of sleeping through it.
    pub fn snapshot(&self) -> u32 {
        self.seq().load(Ordering::Acquire)
    }

    /// Block until the sequence word moves past `seen`
    ///
    /// Returns on a wake or right away when the word has already moved;
    /// callers must re-check their own state either way. Interruptions by
    /// signals are retried.
    pub fn wait_from(&self, seen: u32) {
        loop {
            let rc = unsafe { futex(self.addr.as_ptr(), libc::FUTEX_WAIT, seen) };
            if rc == 0 {
                return;
            }
            match std::io::Error::last_os_error().raw_os_error() {
                // The word moved before we parked; that is the wake.
                Some(libc::EAGAIN) => return,
                Some(libc::EINTR) => continue,
                other => {
                    tracing::warn!(
                        "notifier '{}': futex wait failed (errno {:?})",
                        self.name,
                        other
                    );
                    return;
                }
            }
        }
    }

    /// Block until the next signal
    pub fn wait(&self) {
        self.wait_from(self.snapshot());
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), NOTIFIER_SIZE);
        }
        if self.unlink_on_drop {
            if let Ok(c_name) = object_name(&self.name, EVENT_SUFFIX) {
                let _ = shm_unlink(c_name.as_c_str());
            }
        }
    }
}

/// Thin wrapper over the futex syscall on the notifier word
///
/// No `FUTEX_PRIVATE_FLAG`: the word is shared across processes.
unsafe fn futex(word: *mut u8, op: libc::c_int, val: u32) -> libc::c_long {
    libc::syscall(
        libc::SYS_futex,
        word as *mut u32,
        op,
        val,
        std::ptr::null::<libc::timespec>(),
        std::ptr::null_mut::<u32>(),
        0,
    )
}
