//! Queries about where the current thread runs
//!
//! These are thin wrappers over the Linux scheduler API. On other operating
//! systems, they report that the information is unavailable.

use crate::cpu::cpuset::CpuSet;
#[cfg(target_os = "linux")]
use crate::errors;
use crate::errors::RawOsError;

/// Logical CPU the calling thread is currently running on
///
/// This is only a snapshot: the thread may migrate at any point unless it has
/// been pinned to a single CPU. `None` means the OS cannot tell.
pub fn current_cpu() -> Option<usize> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sched_getcpu has no safety precondition
        let result = unsafe { libc::sched_getcpu() };
        usize::try_from(result).ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Set of CPUs the calling thread is allowed to run on
///
/// # Errors
///
/// - [`RawOsError`] if the OS refused the query, or does not support it.
#[cfg(target_os = "linux")]
pub fn current_thread_cpuset() -> Result<CpuSet, RawOsError> {
    // SAFETY: cpu_set_t is a plain bitmask, all-zeroes is a valid empty set
    let mut raw = unsafe { std::mem::zeroed::<libc::cpu_set_t>() };
    errors::call_libc_int("sched_getaffinity", || {
        // SAFETY: raw is a valid cpu_set_t of the advertised size, and pid 0
        //         designates the calling thread
        unsafe { libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut raw) }
    })?;
    let max_cpus = usize::try_from(libc::CPU_SETSIZE).unwrap_or(0);
    Ok((0..max_cpus)
        // SAFETY: cpu is below CPU_SETSIZE
        .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &raw) })
        .collect())
}

/// Set of CPUs the calling thread is allowed to run on
///
/// # Errors
///
/// - [`RawOsError`] if the OS refused the query, or does not support it.
#[cfg(not(target_os = "linux"))]
pub fn current_thread_cpuset() -> Result<CpuSet, RawOsError> {
    Err(RawOsError {
        api: "sched_getaffinity",
        errno: None,
    })
}
