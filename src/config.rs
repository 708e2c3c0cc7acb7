use crate::coalesced::ring::{RawEntry, RingHeader};

pub const PAGE_SIZE: usize = 0x1000;

/// Largest single write a ring slot can carry.
pub const MAX_PAYLOAD: usize = 8;

/// Number of slots in the coalesced ring. One slot always stays empty.
pub const RING_MAX: usize = (PAGE_SIZE - size_of::<RingHeader>()) / size_of::<RawEntry>();

/// Page offset of the ring inside the VM file mapping.
pub const COALESCED_MMIO_PAGE_OFFSET: u32 = 1;

/// Maximum number of devices on one I/O bus.
pub const MAX_BUS_DEVICES: usize = 1000;
