//! A VM instance as far as coalesced I/O is concerned.

use alloc::vec::Vec;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bus::{Access, BusKind, IoBuses};
use crate::coalesced::CoalescedMmio;
use crate::coalesced::ring::Ring;
use crate::coalesced::zone::Zone;
use crate::config::COALESCED_MMIO_PAGE_OFFSET;
use crate::errno::Errno;

/// Capabilities that can be queried with [`Vm::check_extension`].
///
/// The values match the Linux KVM API.
#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(u32)]
pub enum Capability {
	CoalescedMmio = 15,
	CoalescedPio = 162,
}

/// Owns the I/O buses and the coalesced write ring of one guest.
///
/// Dropping the VM detaches all zones and frees the ring.
pub struct Vm {
	buses: IoBuses,
	coalesced: CoalescedMmio,
}

impl Vm {
	/// Creates a VM with empty buses and an empty ring.
	///
	/// Fails with [`Errno::Nomem`] if the ring page cannot be allocated.
	pub fn new() -> Result<Self, Errno> {
		let coalesced = CoalescedMmio::new()?;
		info!(
			"Coalesced ring: {} slots at page offset {COALESCED_MMIO_PAGE_OFFSET}",
			coalesced.ring().capacity()
		);

		Ok(Self {
			buses: IoBuses::new(),
			coalesced,
		})
	}

	pub fn buses(&self) -> &IoBuses {
		&self.buses
	}

	/// The ring that the controlling process drains.
	pub fn ring(&self) -> &Ring {
		self.coalesced.ring()
	}

	pub fn coalesced_zones(&self) -> Vec<Zone> {
		self.coalesced.zones()
	}

	/// Returns the value of `cap`, which is `0` for unsupported capabilities.
	pub fn check_extension(&self, cap: Capability) -> u32 {
		match cap {
			Capability::CoalescedMmio => COALESCED_MMIO_PAGE_OFFSET,
			Capability::CoalescedPio => 1,
		}
	}

	/// Like [`Vm::check_extension`], but for a raw capability number.
	pub fn check_extension_raw(&self, cap: u32) -> u32 {
		Capability::try_from(cap).map_or(0, |cap| self.check_extension(cap))
	}

	pub fn register_coalesced_mmio(&self, zone: Zone) -> Result<(), Errno> {
		self.coalesced.register(&self.buses, zone)
	}

	/// Removes all coalesced zones of the same kind inside `range`.
	///
	/// Succeeds even if nothing matched.
	pub fn unregister_coalesced_mmio(&self, range: Zone) -> Result<(), Errno> {
		self.coalesced.unregister(&self.buses, range);
		Ok(())
	}

	/// Handles a guest MMIO write.
	///
	/// [`Access::Unhandled`] means that the write has to exit to the controlling process.
	pub fn mmio_write(&self, addr: u64, data: &[u8]) -> Access {
		self.buses.bus(BusKind::Mmio).write(addr, data)
	}

	/// Handles a guest port write.
	pub fn pio_write(&self, port: u16, data: &[u8]) -> Access {
		self.buses.bus(BusKind::Pio).write(port.into(), data)
	}
}

impl Drop for Vm {
	fn drop(&mut self) {
		self.coalesced.clear(&self.buses);
	}
}
