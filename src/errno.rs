//! System error numbers.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// The error type for the coalesced write control plane.
///
/// The values of these error numbers are the same as in Linux.
/// See [`asm-generic/errno-base.h`] and [`asm-generic/errno.h`] for details.
///
/// [`asm-generic/errno-base.h`]: https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git/tree/include/uapi/asm-generic/errno-base.h?h=v6.15
/// [`asm-generic/errno.h`]: https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git/tree/include/uapi/asm-generic/errno.h?h=v6.15
#[derive(Error, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(i32)]
pub enum Errno {
	/// No such file or directory
	#[doc(alias = "ENOENT")]
	#[error("No such file or directory")]
	Noent = 2,

	/// Out of memory
	#[doc(alias = "ENOMEM")]
	#[error("Out of memory")]
	Nomem = 12,

	/// Invalid argument
	#[doc(alias = "EINVAL")]
	#[error("Invalid argument")]
	Inval = 22,

	/// No space left on device
	#[doc(alias = "ENOSPC")]
	#[error("No space left on device")]
	Nospc = 28,
}

impl From<alloc::collections::TryReserveError> for Errno {
	fn from(_: alloc::collections::TryReserveError) -> Self {
		Self::Nomem
	}
}
