//! Generic error handling primitives
//!
//! While we do not shy away from using context-specific error types that
//! provide higher-quality error messages, for some common patterns we do emit
//! generic error types, which are implemented in this module.
//
// At the implementation level, this is also the place where all the low-level
// handling of OS errors is implemented.

#[cfg(doc)]
use crate::affinity::AffinityRegistry;
use crate::affinity::{irq::IrqCategory, pool::PoolKind};
use errno::Errno;
use std::{ffi::c_int, fmt::Debug};
use thiserror::Error;

/// Do something with errno checking
///
/// Call a user-provided callback, which tells if symptoms of an OS-side error
/// were observed. If so, check for appearance of nonzero errno values and
/// report them.
///
/// When this function returns, errno is back to the state where it was before
/// the user callback was invoked.
fn check_errno<R>(callback: impl FnOnce() -> (R, bool)) -> (R, Option<Errno>) {
    let old_errno = errno::errno();
    errno::set_errno(Errno(0));

    let (result, should_check_errno) = callback();

    let mut new_errno = None;
    if should_check_errno {
        let errno = errno::errno();
        if errno != Errno(0) {
            new_errno = Some(errno);
        }
    }
    errno::set_errno(old_errno);

    (result, new_errno)
}

/// Raw error emitted by an OS entry point that follows the usual convention
/// of returning -1 on failure and setting errno
#[derive(Copy, Clone, Debug, Error, Eq, Hash, PartialEq)]
#[error("OS API {api} failed with errno {errno:?}")]
pub struct RawOsError {
    /// OS entry point that failed
    pub api: &'static str,

    /// Observed errno value, if errno was set
    pub errno: Option<Errno>,
}

/// Call an OS entry point that returns an `int` where negative values signal
/// failure
#[allow(unused)]
pub(crate) fn call_libc_int(
    api: &'static str,
    call: impl FnOnce() -> c_int,
) -> Result<c_int, RawOsError> {
    let (result, errno) = check_errno(|| {
        let result = call();
        (result, result < 0)
    });
    if result < 0 {
        Err(RawOsError { api, errno })
    } else {
        Ok(result)
    }
}

/// A method was passed an invalid parameter
///
/// This generic error type is only used when there is only a single way a
/// function parameter can be invalid, and the fact that it is invalid does
/// not depend on the value of another parameter. Otherwise, a more descriptive
/// dedicated error type will be used.
#[derive(Copy, Clone, Debug, Default, Eq, Error, Hash, PartialEq)]
#[error("parameter {0:?} is not valid for this operation")]
pub struct ParameterError<Parameter: Debug>(pub Parameter);
//
impl<Parameter: Debug> From<Parameter> for ParameterError<Parameter> {
    fn from(value: Parameter) -> Self {
        Self(value)
    }
}

/// Error emitted by the allocation entry points of [`AffinityRegistry`]
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum AffinityError {
    /// A CPU pool had no member to hand out
    ///
    /// Device attachment never produces an empty default pool, so this
    /// typically means that a receive context other than the control context
    /// was armed on a device that was attached with a single receive queue.
    #[error("the {pool} CPU pool of NUMA node {node} has no CPU to allocate")]
    AllocationFailure {
        /// NUMA node whose pool was queried
        node: usize,

        /// Pool that was queried
        pool: PoolKind,
    },

    /// An interrupt of a category that has no placement rule was armed
    #[error("IRQ vector {vector} has category {category}, which cannot be placed")]
    InvalidCategory {
        /// Interrupt vector number
        vector: u32,

        /// Offending category
        category: IrqCategory,
    },

    /// An interrupt was armed or released on a node with no affinity entry,
    /// i.e. before the owning device attached
    #[error("no affinity entry for NUMA node {0}, has the device been attached?")]
    NoEntryForNode(usize),

    /// Every candidate CPU is already allocated to some process
    #[error("no CPU is available for process placement")]
    NoCpuAvailable,
}
