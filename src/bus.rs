//! Guest I/O buses.
//!
//! A bus maps guest address ranges to [`IoDevice`]s. Each VM has one bus for
//! memory-mapped I/O and one for port I/O.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hermit_sync::RwSpinLock;

use crate::config::MAX_BUS_DEVICES;
use crate::errno::Errno;

/// Address space of a guest access.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BusKind {
	/// Memory-mapped I/O
	Mmio,
	/// Port I/O
	Pio,
}

impl BusKind {
	pub fn is_pio(self) -> bool {
		self == Self::Pio
	}
}

/// Outcome of offering a write to a device.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[must_use]
pub enum Access {
	/// The device consumed the write.
	Handled,
	/// The device did not take the write. The caller falls back to the slow path.
	Unhandled,
}

impl Access {
	pub fn is_handled(self) -> bool {
		self == Self::Handled
	}
}

/// A device that can be attached to an [`IoBus`].
pub trait IoDevice: Send + Sync {
	/// Offers a guest write of `data` at `addr`.
	fn write(&self, addr: u64, data: &[u8]) -> Access;
}

struct BusRange {
	base: u64,
	len: u64,
	dev: Arc<dyn IoDevice>,
}

impl BusRange {
	fn contains(&self, addr: u64, len: u64) -> bool {
		let Some(end) = addr.checked_add(len) else {
			return false;
		};
		addr >= self.base && u128::from(end) <= u128::from(self.base) + u128::from(self.len)
	}
}

/// A table of device ranges, kept sorted by `(base, len)`.
pub struct IoBus {
	kind: BusKind,
	ranges: RwSpinLock<Vec<BusRange>>,
}

impl IoBus {
	pub const fn new(kind: BusKind) -> Self {
		Self {
			kind,
			ranges: RwSpinLock::new(Vec::new()),
		}
	}

	/// Number of attached devices.
	pub fn len(&self) -> usize {
		self.ranges.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Attaches `dev` to `[base, base + len)`.
	///
	/// Ranges may overlap. Fails with [`Errno::Nospc`] if the bus is full and
	/// with [`Errno::Nomem`] if the table cannot grow.
	pub fn register(&self, base: u64, len: u64, dev: Arc<dyn IoDevice>) -> Result<(), Errno> {
		let mut ranges = self.ranges.write();
		if ranges.len() >= MAX_BUS_DEVICES {
			debug!("{:?} bus is full, cannot attach {base:#x}+{len:#x}", self.kind);
			return Err(Errno::Nospc);
		}
		ranges.try_reserve(1)?;

		let pos = ranges.partition_point(|r| (r.base, r.len) <= (base, len));
		ranges.insert(pos, BusRange { base, len, dev });
		Ok(())
	}

	/// Detaches all of `devs` in a single update.
	///
	/// Devices are compared by identity. Fails with [`Errno::Noent`] and leaves
	/// the bus untouched if any of them is not attached.
	pub fn unregister_all(&self, devs: &[Arc<dyn IoDevice>]) -> Result<(), Errno> {
		let mut ranges = self.ranges.write();
		let attached = |dev: &Arc<dyn IoDevice>| ranges.iter().any(|r| Arc::ptr_eq(&r.dev, dev));
		if !devs.iter().all(attached) {
			return Err(Errno::Noent);
		}

		ranges.retain(|r| !devs.iter().any(|dev| Arc::ptr_eq(&r.dev, dev)));
		Ok(())
	}

	/// Offers a write to every device whose range fully contains it.
	///
	/// Devices are tried in address order; the first one to handle the write wins.
	pub fn write(&self, addr: u64, data: &[u8]) -> Access {
		let len = data.len() as u64;
		let ranges = self.ranges.read();
		let handled = ranges
			.iter()
			.take_while(|r| r.base <= addr)
			.filter(|r| r.contains(addr, len))
			.any(|r| r.dev.write(addr, data).is_handled());

		if handled {
			Access::Handled
		} else {
			Access::Unhandled
		}
	}
}

/// The MMIO and PIO buses of a VM.
#[derive(Debug)]
pub struct IoBuses {
	mmio: IoBus,
	pio: IoBus,
}

impl IoBuses {
	pub const fn new() -> Self {
		Self {
			mmio: IoBus::new(BusKind::Mmio),
			pio: IoBus::new(BusKind::Pio),
		}
	}

	pub fn bus(&self, kind: BusKind) -> &IoBus {
		match kind {
			BusKind::Mmio => &self.mmio,
			BusKind::Pio => &self.pio,
		}
	}
}

impl Default for IoBuses {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for IoBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IoBus")
			.field("kind", &self.kind)
			.field("devices", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use core::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	struct Counter {
		writes: AtomicUsize,
		accept: bool,
	}

	impl IoDevice for Counter {
		fn write(&self, _addr: u64, _data: &[u8]) -> Access {
			self.writes.fetch_add(1, Ordering::Relaxed);
			if self.accept {
				Access::Handled
			} else {
				Access::Unhandled
			}
		}
	}

	fn counter(accept: bool) -> Arc<Counter> {
		Arc::new(Counter {
			writes: AtomicUsize::new(0),
			accept,
		})
	}

	#[test]
	fn write_requires_full_containment() {
		let bus = IoBus::new(BusKind::Mmio);
		let dev = counter(true);
		bus.register(0x1000, 0x100, dev.clone()).unwrap();

		assert_eq!(bus.write(0x10fc, &[0; 4]), Access::Handled);
		assert_eq!(bus.write(0x10fd, &[0; 4]), Access::Unhandled);
		assert_eq!(bus.write(0x0fff, &[0; 2]), Access::Unhandled);
		assert_eq!(bus.write(u64::MAX, &[0; 2]), Access::Unhandled);
		assert_eq!(dev.writes.load(Ordering::Relaxed), 1);
	}

	#[test]
	fn falls_through_to_next_device() {
		let bus = IoBus::new(BusKind::Pio);
		let declines = counter(false);
		let accepts = counter(true);
		bus.register(0x60, 0x10, declines.clone()).unwrap();
		bus.register(0x64, 0x4, accepts.clone()).unwrap();

		assert!(bus.write(0x64, &[1]).is_handled());
		assert_eq!(declines.writes.load(Ordering::Relaxed), 1);
		assert_eq!(accepts.writes.load(Ordering::Relaxed), 1);
	}

	#[test]
	fn unregister_is_all_or_nothing() {
		let bus = IoBus::new(BusKind::Mmio);
		let a: Arc<dyn IoDevice> = counter(true);
		let b: Arc<dyn IoDevice> = counter(true);
		let stranger: Arc<dyn IoDevice> = counter(true);
		bus.register(0x1000, 0x10, a.clone()).unwrap();
		bus.register(0x2000, 0x10, b.clone()).unwrap();

		assert_eq!(bus.unregister_all(&[a.clone(), stranger]), Err(Errno::Noent));
		assert_eq!(bus.len(), 2);

		bus.unregister_all(&[a, b]).unwrap();
		assert!(bus.is_empty());
		assert_eq!(bus.write(0x1000, &[0]), Access::Unhandled);
	}

	#[test]
	fn bus_capacity_is_bounded() {
		let bus = IoBus::new(BusKind::Mmio);
		let dev = counter(true);
		for i in 0..MAX_BUS_DEVICES as u64 {
			bus.register(i * 8, 8, dev.clone()).unwrap();
		}
		assert_eq!(bus.register(0, 8, dev), Err(Errno::Nospc));
	}
}
