use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::bus::BusKind;
use crate::errno::Errno;

/// A guest address range whose writes may be coalesced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Zone {
	pub base: u64,
	pub size: u64,
	pub kind: BusKind,
}

impl Zone {
	pub const fn mmio(base: u64, size: u64) -> Self {
		Self {
			base,
			size,
			kind: BusKind::Mmio,
		}
	}

	pub const fn pio(base: u64, size: u64) -> Self {
		Self {
			base,
			size,
			kind: BusKind::Pio,
		}
	}

	/// One past the last address, which may lie beyond `u64::MAX`.
	fn end(&self) -> u128 {
		u128::from(self.base) + u128::from(self.size)
	}

	/// Returns `true` if the access `[addr, addr + len)` lies entirely inside this zone.
	///
	/// Accesses whose end does not fit into `u64` never match.
	pub fn contains(&self, addr: u64, len: u64) -> bool {
		let Some(end) = addr.checked_add(len) else {
			return false;
		};
		addr >= self.base && u128::from(end) <= self.end()
	}

	/// Returns `true` if `other` has the same kind and lies entirely inside this zone.
	pub fn covers(&self, other: &Zone) -> bool {
		self.kind == other.kind && other.base >= self.base && other.end() <= self.end()
	}
}

/// Zone descriptor as passed in by the controlling process.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct RawZone {
	pub addr: u64,
	pub size: u32,
	/// `1` for port I/O, `0` for MMIO.
	pub pio: u32,
}

impl TryFrom<RawZone> for Zone {
	type Error = Errno;

	fn try_from(raw: RawZone) -> Result<Self, Self::Error> {
		let kind = match raw.pio {
			0 => BusKind::Mmio,
			1 => BusKind::Pio,
			_ => return Err(Errno::Inval),
		};

		Ok(Self {
			base: raw.addr,
			size: raw.size.into(),
			kind,
		})
	}
}

impl TryFrom<&[u8]> for Zone {
	type Error = Errno;

	fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
		RawZone::read_from(bytes).ok_or(Errno::Inval)?.try_into()
	}
}
