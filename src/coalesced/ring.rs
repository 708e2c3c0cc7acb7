//! The coalesced write ring.
//!
//! The ring lives in a [`SharedPage`] and is laid out exactly as the
//! controlling process expects it:
//!
//! ```text
//! +-------+------+-----------------------------------------+
//! | first | last | entries[RING_MAX] (24 bytes each)       |
//! +-------+------+-----------------------------------------+
//!  u32     u32
//! ```
//!
//! Producers append at `last` under the producer lock. The single consumer
//! removes at `first`. `first == last` means empty and one slot always stays
//! unused, so the ring is full when `last + 1 == first` (mod `RING_MAX`).

use core::iter;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering, fence};

use crossbeam_utils::CachePadded;
use hermit_sync::{TicketMutex, TicketMutexGuard};
use volatile::VolatileRef;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::bus::{Access, BusKind};
use crate::config::{MAX_PAYLOAD, PAGE_SIZE, RING_MAX};
use crate::errno::Errno;
use crate::mm::SharedPage;

/// Cursors at the start of the ring page.
#[repr(C)]
pub struct RingHeader {
	first: AtomicU32,
	last: AtomicU32,
}

/// One ring slot as seen by the controlling process.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct RawEntry {
	phys_addr: u64,
	len: u32,
	pio: u32,
	data: [u8; MAX_PAYLOAD],
}

#[repr(C)]
struct RawRing {
	header: RingHeader,
	entries: [RawEntry; RING_MAX],
}

const _: () = assert!(size_of::<RawRing>() <= PAGE_SIZE);
const _: () = assert!(RING_MAX >= 2);

/// A write that was queued on the ring.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CoalescedWrite {
	pub addr: u64,
	pub len: u32,
	pub data: [u8; MAX_PAYLOAD],
	pub kind: BusKind,
}

impl CoalescedWrite {
	/// The written bytes.
	pub fn data(&self) -> &[u8] {
		&self.data[..(self.len as usize).min(MAX_PAYLOAD)]
	}
}

impl From<RawEntry> for CoalescedWrite {
	fn from(raw: RawEntry) -> Self {
		Self {
			addr: raw.phys_addr,
			len: raw.len,
			data: raw.data,
			kind: if raw.pio != 0 {
				BusKind::Pio
			} else {
				BusKind::Mmio
			},
		}
	}
}

/// Free slots between the producer cursor `last` and the consumer cursor `first`.
fn available(first: usize, last: usize) -> usize {
	(first + RING_MAX - last - 1) % RING_MAX
}

/// The ring and the locks of both of its ends.
pub struct Ring {
	page: SharedPage,
	raw: NonNull<RawRing>,
	producer: CachePadded<TicketMutex<()>>,
	consumer: CachePadded<TicketMutex<()>>,
}

// SAFETY: The ring memory is owned by `page`. The cursors are atomics, and
// slots are only touched through volatile accesses under the producer lock or
// the consumer lock according to the cursor protocol.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
	/// Allocates an empty ring.
	pub fn new() -> Result<Self, Errno> {
		let page = SharedPage::with_size(size_of::<RawRing>())?;
		let raw = page.as_non_null().cast::<RawRing>();
		debug!(
			"Created coalesced ring with {RING_MAX} slots in {} page(s)",
			page.pages()
		);

		Ok(Self {
			page,
			raw,
			producer: CachePadded::new(TicketMutex::new(())),
			consumer: CachePadded::new(TicketMutex::new(())),
		})
	}

	/// Number of slots, including the one that always stays empty.
	pub const fn capacity(&self) -> usize {
		RING_MAX
	}

	/// Number of pages the controlling process has to map.
	pub fn pages(&self) -> usize {
		self.page.pages()
	}

	/// The memory backing the ring, as seen by the controlling process.
	pub fn shared_page(&self) -> &SharedPage {
		&self.page
	}

	fn header(&self) -> &RingHeader {
		// SAFETY: `raw` points to a live, zero-initialized `RawRing`. The header
		// only consists of atomics, so shared references to it are fine.
		unsafe { &(*self.raw.as_ptr()).header }
	}

	fn slot(&self, index: usize) -> VolatileRef<'_, RawEntry> {
		assert!(index < RING_MAX);
		// SAFETY: `index` is in bounds of the entry array inside the page.
		unsafe {
			let entries = NonNull::new_unchecked(&raw mut (*self.raw.as_ptr()).entries);
			VolatileRef::new(entries.cast::<RawEntry>().add(index))
		}
	}

	/// Number of queued writes.
	pub fn len(&self) -> usize {
		let header = self.header();
		let first = header.first.load(Ordering::Acquire) as usize;
		let last = header.last.load(Ordering::Acquire) as usize;
		(last + RING_MAX - first % RING_MAX) % RING_MAX
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Appends a write to the ring.
	///
	/// Returns [`Access::Unhandled`] if `data` does not fit into a slot or if
	/// the ring is full. The caller then performs the write synchronously.
	pub fn offer(&self, addr: u64, data: &[u8], kind: BusKind) -> Access {
		if data.len() > MAX_PAYLOAD {
			trace!("{}-byte write at {addr:#x} does not fit into a ring slot", data.len());
			return Access::Unhandled;
		}

		let _guard = self.producer.lock();
		let header = self.header();
		let last = header.last.load(Ordering::Relaxed) as usize;
		let first = header.first.load(Ordering::Acquire) as usize;
		if last >= RING_MAX || first >= RING_MAX || available(first, last) == 0 {
			trace!("Coalesced ring full, write at {addr:#x} takes the slow path");
			return Access::Unhandled;
		}

		let mut entry = RawEntry::new_zeroed();
		entry.phys_addr = addr;
		entry.len = data.len() as u32;
		entry.pio = kind.is_pio().into();
		entry.data[..data.len()].copy_from_slice(data);
		self.slot(last).as_mut_ptr().write(entry);

		// The slot has to be visible before the new cursor.
		fence(Ordering::Release);
		header
			.last
			.store(((last + 1) % RING_MAX) as u32, Ordering::Release);

		Access::Handled
	}

	/// Returns the consumer end of the ring, waiting for a concurrent consumer to finish.
	pub fn consumer(&self) -> RingConsumer<'_> {
		RingConsumer {
			ring: self,
			_guard: self.consumer.lock(),
		}
	}

	/// Returns the consumer end of the ring if no other consumer is active.
	pub fn try_consumer(&self) -> Option<RingConsumer<'_>> {
		let guard = self.consumer.try_lock()?;
		Some(RingConsumer {
			ring: self,
			_guard: guard,
		})
	}
}

/// Exclusive access to the consumer end of a [`Ring`].
pub struct RingConsumer<'a> {
	ring: &'a Ring,
	_guard: TicketMutexGuard<'a, ()>,
}

impl RingConsumer<'_> {
	/// Removes the oldest write from the ring.
	pub fn pop(&mut self) -> Option<CoalescedWrite> {
		let header = self.ring.header();
		let first = header.first.load(Ordering::Relaxed) as usize;
		let last = header.last.load(Ordering::Acquire) as usize;
		if first == last || first >= RING_MAX {
			return None;
		}

		let entry = self.ring.slot(first).as_ptr().read();
		header
			.first
			.store(((first + 1) % RING_MAX) as u32, Ordering::Release);

		Some(entry.into())
	}

	/// Removes writes until the ring is empty.
	pub fn drain(&mut self) -> impl Iterator<Item = CoalescedWrite> + '_ {
		iter::from_fn(move || self.pop())
	}

	/// Number of queued writes.
	pub fn len(&self) -> usize {
		self.ring.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ring.is_empty()
	}

	/// Number of writes that can still be queued.
	pub fn available(&self) -> usize {
		RING_MAX - 1 - self.len()
	}
}
