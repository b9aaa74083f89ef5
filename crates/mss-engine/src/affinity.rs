//! Binding worker threads to logical cores.

#![allow(unsafe_code)]

use crate::config::ConfigError;

/// Bind the calling thread to `core`.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(core: usize) -> Result<(), ConfigError> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(ConfigError::AffinityFailed {
            core,
            reason: format!("core id exceeds CPU_SETSIZE ({})", libc::CPU_SETSIZE),
        });
    }
    // SAFETY: cpu_set_t is plain data and valid when zeroed; core is below
    // CPU_SETSIZE; pid 0 names the calling thread.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(ConfigError::AffinityFailed {
            core,
            reason: std::io::Error::last_os_error().to_string(),
        })
    }
}

/// Thread binding is not supported here; the call succeeds without effect.
#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_thread(core: usize) -> Result<(), ConfigError> {
    tracing::debug!(core, "thread pinning unsupported on this platform");
    Ok(())
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_core_is_rejected() {
        let err = pin_current_thread(usize::MAX).unwrap_err();
        assert!(matches!(err, ConfigError::AffinityFailed { .. }));
    }
}
