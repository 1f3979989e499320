//! Internal error type for the core subsystems.
//!
//! Every fallible internal operation returns `Result<T, KernelError>`.
//! Public, C-ABI-shaped entry points (`vm_map`, `alloc_page`, `task_create`,
//! ...) are thin wrappers that collapse this into the sentinel values the
//! external interface promises — the collapse happens in exactly one place
//! per function, never scattered through the call chain.

/// The three error kinds the core can produce. `SecurityViolation` is never
/// returned to a caller: it is consumed by `kernel_panic` at the point of
/// detection and the function that detected it never returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    OutOfMemory,
    InvalidArgument(&'static str),
    SecurityViolation(&'static str),
}

impl KernelError {
    pub fn reason(self) -> &'static str {
        match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::InvalidArgument(why) => why,
            KernelError::SecurityViolation(why) => why,
        }
    }
}

/// Collapse a `Result<(), KernelError>` into the `0 | -1` sentinel used at
/// the `VM`/`Sched` external boundary, logging non-fatal failures.
pub fn to_sentinel(result: Result<(), KernelError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            crate::warn!("{}", e.reason());
            -1
        }
    }
}
