use alloc::sync::Arc;

use crate::bus::{Access, IoDevice};
use crate::coalesced::ring::Ring;
use crate::coalesced::zone::Zone;

/// Bus device for one registered zone.
///
/// All zone devices of a VM append to the same ring.
pub(crate) struct ZoneDevice {
	zone: Zone,
	ring: Arc<Ring>,
}

impl ZoneDevice {
	pub fn new(zone: Zone, ring: Arc<Ring>) -> Self {
		Self { zone, ring }
	}

	pub fn zone(&self) -> &Zone {
		&self.zone
	}
}

impl IoDevice for ZoneDevice {
	fn write(&self, addr: u64, data: &[u8]) -> Access {
		if !self.zone.contains(addr, data.len() as u64) {
			return Access::Unhandled;
		}

		self.ring.offer(addr, data, self.zone.kind)
	}
}
