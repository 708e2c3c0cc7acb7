//! Page-granular backing memory shared with the controlling process.

use alloc::alloc::{alloc_zeroed, dealloc};
use core::alloc::Layout;
use core::ptr::NonNull;

use align_address::Align;
use volatile::VolatileRef;
use zerocopy::{AsBytes, FromBytes};

use crate::config::PAGE_SIZE;
use crate::errno::Errno;

/// Zero-initialized, page-aligned memory that is mapped into the controlling process.
///
/// The memory is freed when the `SharedPage` is dropped.
pub struct SharedPage {
	ptr: NonNull<u8>,
	layout: Layout,
}

// SAFETY: `SharedPage` exclusively owns its allocation. Concurrent access to
// the contents goes through atomics and volatile operations of the users.
unsafe impl Send for SharedPage {}
unsafe impl Sync for SharedPage {}

impl SharedPage {
	/// Allocates a single zeroed page.
	pub fn new() -> Result<Self, Errno> {
		Self::with_size(PAGE_SIZE)
	}

	/// Allocates zeroed memory for `size` bytes, rounded up to whole pages.
	pub fn with_size(size: usize) -> Result<Self, Errno> {
		if size == 0 {
			return Err(Errno::Inval);
		}

		let size = size.align_up(PAGE_SIZE);
		let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| Errno::Inval)?;
		// SAFETY: `layout` has a non-zero size.
		let ptr = unsafe { alloc_zeroed(layout) };
		let Some(ptr) = NonNull::new(ptr) else {
			error!("Unable to allocate {size:#x} bytes of shared memory");
			return Err(Errno::Nomem);
		};
		debug_assert_eq!(ptr.as_ptr().addr().align_down(PAGE_SIZE), ptr.as_ptr().addr());

		trace!("Allocated shared memory at {ptr:p} ({size:#x} bytes)");
		Ok(Self { ptr, layout })
	}

	/// Size of the allocation in bytes.
	pub fn len(&self) -> usize {
		self.layout.size()
	}

	/// Number of pages backing this allocation.
	pub fn pages(&self) -> usize {
		self.layout.size() / PAGE_SIZE
	}

	/// Returns the start of the memory, e.g. for mapping it into the
	/// controlling process.
	///
	/// The pointer is valid as long as `self` is alive.
	pub fn as_non_null(&self) -> NonNull<u8> {
		self.ptr
	}

	fn field<T>(&self, offset: usize) -> Result<NonNull<T>, Errno> {
		let end = offset.checked_add(size_of::<T>()).ok_or(Errno::Inval)?;
		if end > self.len() || offset % align_of::<T>() != 0 {
			return Err(Errno::Inval);
		}
		// SAFETY: `offset + size_of::<T>()` is in bounds of the allocation.
		Ok(unsafe { self.ptr.add(offset) }.cast::<T>())
	}

	/// Reads a `T` at byte `offset` with a volatile load.
	///
	/// Fails with [`Errno::Inval`] if the value is out of bounds or misaligned.
	pub fn read<T: FromBytes + Copy>(&self, offset: usize) -> Result<T, Errno> {
		let ptr = self.field::<T>(offset)?;
		// SAFETY: `ptr` is aligned and in bounds, and every bit pattern is a valid `T`.
		let value = unsafe { VolatileRef::new(ptr) }.as_ptr().read();
		Ok(value)
	}

	/// Writes `value` at byte `offset` with a volatile store.
	///
	/// Fails with [`Errno::Inval`] if the value is out of bounds or misaligned.
	pub fn write<T: AsBytes + Copy>(&self, offset: usize, value: T) -> Result<(), Errno> {
		let ptr = self.field::<T>(offset)?;
		// SAFETY: `ptr` is aligned and in bounds. The memory is shared with the
		// controlling process and only ever accessed with volatile or atomic
		// operations.
		unsafe { VolatileRef::new(ptr) }.as_mut_ptr().write(value);
		Ok(())
	}
}

impl Drop for SharedPage {
	fn drop(&mut self) {
		trace!("Freeing shared memory at {:p}", self.ptr);
		// SAFETY: `ptr` was allocated with `layout` in `with_size`.
		unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
	}
}
