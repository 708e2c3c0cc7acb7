//! Coalesced MMIO and PIO.
//!
//! Writes to registered zones are not forwarded to the controlling process one
//! by one. Instead, they are queued on a [`Ring`] that the controlling process
//! drains whenever it has to observe device state.

mod device;
pub mod ring;
pub mod zone;

use alloc::sync::Arc;
use alloc::vec::Vec;

use hermit_sync::SpinMutex;
use smallvec::SmallVec;

use self::device::ZoneDevice;
use self::ring::Ring;
use self::zone::Zone;
use crate::bus::{BusKind, IoBuses, IoDevice};
use crate::errno::Errno;

/// The coalesced write ring of a VM together with its zone registry.
pub struct CoalescedMmio {
	ring: Arc<Ring>,
	zones: SpinMutex<Vec<Arc<ZoneDevice>>>,
}

impl CoalescedMmio {
	/// Allocates the ring page. No zones are registered.
	pub fn new() -> Result<Self, Errno> {
		Ok(Self {
			ring: Arc::new(Ring::new()?),
			zones: SpinMutex::new(Vec::new()),
		})
	}

	pub fn ring(&self) -> &Ring {
		&self.ring
	}

	/// Returns the currently registered zones in registration order.
	pub fn zones(&self) -> Vec<Zone> {
		self.zones.lock().iter().map(|dev| *dev.zone()).collect()
	}

	/// Attaches `zone` to the bus of its kind.
	///
	/// Zones may overlap. On error nothing stays attached.
	pub fn register(&self, buses: &IoBuses, zone: Zone) -> Result<(), Errno> {
		let mut zones = self.zones.lock();
		zones.try_reserve(1)?;

		let dev = Arc::new(ZoneDevice::new(zone, self.ring.clone()));
		buses
			.bus(zone.kind)
			.register(zone.base, zone.size, dev.clone())?;
		zones.push(dev);

		debug!(
			"Registered coalesced {:?} zone {:#x}+{:#x}",
			zone.kind, zone.base, zone.size
		);
		Ok(())
	}

	/// Removes every zone of the same kind that lies inside `range`.
	///
	/// All matching zones are detached from the bus in one update before they
	/// are dropped. Returns the number of removed zones.
	pub fn unregister(&self, buses: &IoBuses, range: Zone) -> usize {
		let mut zones = self.zones.lock();
		let matching = zones
			.iter()
			.filter(|dev| range.covers(dev.zone()))
			.map(|dev| Arc::clone(dev) as Arc<dyn IoDevice>)
			.collect::<SmallVec<[_; 4]>>();
		if matching.is_empty() {
			return 0;
		}

		if let Err(err) = buses.bus(range.kind).unregister_all(&matching) {
			// Every registered zone is attached, so this means the bus was
			// modified behind our back. Keep the registry as it is.
			error!(
				"Unable to detach coalesced zones inside {:#x}+{:#x}: {err}",
				range.base, range.size
			);
			return 0;
		}

		zones.retain(|dev| !range.covers(dev.zone()));
		debug!(
			"Unregistered {} coalesced {:?} zone(s) inside {:#x}+{:#x}",
			matching.len(),
			range.kind,
			range.base,
			range.size
		);
		matching.len()
	}

	/// Detaches all zones from the buses.
	pub fn clear(&self, buses: &IoBuses) {
		let mut zones = self.zones.lock();
		for kind in [BusKind::Mmio, BusKind::Pio] {
			let devs = zones
				.iter()
				.filter(|dev| dev.zone().kind == kind)
				.map(|dev| Arc::clone(dev) as Arc<dyn IoDevice>)
				.collect::<SmallVec<[_; 4]>>();
			if let Err(err) = buses.bus(kind).unregister_all(&devs) {
				error!("Unable to detach coalesced {kind:?} zones: {err}");
			}
		}

		if !zones.is_empty() {
			debug!("Removed {} coalesced zone(s)", zones.len());
		}
		zones.clear();
	}
}
