//! Scoped adjustment of the open file descriptor limit.
//!
//! Re-encoding many entries at once can exhaust the soft `RLIMIT_NOFILE`.
//! [`FdLimitGuard::bump`] raises it for the lifetime of the guard and puts the
//! previous value back on drop, whatever path the caller leaves by. The limit
//! is process-wide, so guards are serialized through a global mutex.

use std::sync::{Mutex, MutexGuard};

/// Extra descriptors requested on top of the entry count.
pub const FD_MARGIN: u64 = 128;

static FD_LIMIT_LOCK: Mutex<()> = Mutex::new(());

/// Restores the previous soft descriptor limit when dropped.
#[derive(Debug)]
pub struct FdLimitGuard {
    previous: Option<u64>,
    _lock: MutexGuard<'static, ()>,
}

impl FdLimitGuard {
    /// Raises the soft limit by `count + FD_MARGIN`, capped at the hard limit.
    ///
    /// Failure to adjust the limit is logged and otherwise ignored; the guard
    /// then restores nothing.
    pub fn bump(count: usize) -> Self {
        let lock = FD_LIMIT_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let wanted = (count as u64).saturating_add(FD_MARGIN);
        let previous = match sys::raise_soft_limit(wanted) {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("could not raise the open file limit: {e}");
                None
            }
        };
        Self {
            previous,
            _lock: lock,
        }
    }

    /// Returns `true` if the limit was changed and will be restored.
    pub fn is_active(&self) -> bool {
        self.previous.is_some()
    }
}

impl Drop for FdLimitGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = sys::set_soft_limit(previous) {
                log::warn!("could not restore the open file limit to {previous}: {e}");
            }
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::io;

    fn get() -> io::Result<libc::rlimit> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `limit` is a valid, writable rlimit.
        if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(limit)
    }

    fn set(limit: &libc::rlimit) -> io::Result<()> {
        // SAFETY: `limit` points to a valid rlimit.
        if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Returns the previous soft limit if it was changed.
    pub(super) fn raise_soft_limit(extra: u64) -> io::Result<Option<u64>> {
        let current = get()?;
        let previous = current.rlim_cur as u64;
        let hard = current.rlim_max as u64;
        let target = previous.saturating_add(extra).min(hard);
        if target <= previous {
            return Ok(None);
        }
        set(&libc::rlimit {
            rlim_cur: target as libc::rlim_t,
            rlim_max: current.rlim_max,
        })?;
        log::debug!("raised open file limit from {previous} to {target}");
        Ok(Some(previous))
    }

    pub(super) fn set_soft_limit(value: u64) -> io::Result<()> {
        let current = get()?;
        set(&libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: current.rlim_max,
        })
    }

    #[cfg(test)]
    pub(super) fn soft_limit() -> u64 {
        get().map(|l| l.rlim_cur as u64).unwrap_or(0)
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;

    pub(super) fn raise_soft_limit(_extra: u64) -> io::Result<Option<u64>> {
        Ok(None)
    }

    pub(super) fn set_soft_limit(_value: u64) -> io::Result<()> {
        Ok(())
    }
}
