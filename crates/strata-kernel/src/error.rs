//! Kernel-specific error types.

use strata_types::error::StrataError;
use thiserror::Error;

/// Kernel error type wrapping StrataError with boot context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped StrataError.
    #[error(transparent)]
    Strata(#[from] StrataError),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
