//! Thread affinity for Linux.
//!
//! Latency-sensitive deployments pin processor threads to dedicated cores
//! so busy-spin waits do not migrate across caches.

use std::io;

/// Pin the calling thread to one CPU core.
///
/// Fails when `core` does not name a configured CPU or the scheduler
/// rejects the mask.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core: usize) -> io::Result<()> {
    let configured = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if configured < 0 {
        return Err(io::Error::last_os_error());
    }
    if core >= configured as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core {} out of range, {} configured", core, configured),
        ));
    }

    // An all-zero mask with a single bit set for `core`.
    let mut mask = unsafe { std::mem::zeroed::<libc::cpu_set_t>() };
    unsafe {
        libc::CPU_SET(core, &mut mask);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mask) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Pin the calling thread to one CPU core.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "core pinning requires Linux",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_pin_to_core_zero() {
        // Core 0 exists on any machine the tests run on.
        pin_to_core(0).unwrap();
    }

    #[test]
    fn test_pin_to_unconfigured_core_fails() {
        let err = pin_to_core(usize::MAX / 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
