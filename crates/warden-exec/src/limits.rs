//! rlimit application for a spawned child, applied via `pre_exec` on Unix.
//!
//! Limits are best-effort: if `setrlimit` fails the child still dies (it
//! runs before `exec`, so a hard failure here becomes a spawn error), but a
//! limit that the kernel silently caps lower than requested is not treated
//! as fatal.

/// Resource ceilings applied to a spawned child process.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// CPU time budget in whole seconds (soft == hard).
    pub cpu_seconds: u64,
    /// Address-space ceiling in bytes (soft == hard).
    pub memory_bytes: u64,
    /// Maximum open file descriptors.
    pub max_open_files: u64,
}

#[cfg(unix)]
pub(crate) fn apply(limits: ResourceLimits) -> std::io::Result<()> {
    // Safety: setrlimit is async-signal-safe and this runs post-fork,
    // pre-exec, with no other threads in the child.
    unsafe {
        set_rlimit(libc::RLIMIT_CPU, limits.cpu_seconds)?;
        set_rlimit(libc::RLIMIT_AS, limits.memory_bytes)?;
        set_rlimit(libc::RLIMIT_NOFILE, limits.max_open_files)?;
        set_rlimit(libc::RLIMIT_CORE, 0)?;
        libc::nice(10);
    }
    Ok(())
}

#[cfg(unix)]
unsafe fn set_rlimit(resource: libc::c_int, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value,
        rlim_max: value,
    };
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply(_limits: ResourceLimits) -> std::io::Result<()> {
    Ok(())
}
