//! Coalesced MMIO and PIO for a hypervisor.
//!
//! Guest writes to registered [zones](coalesced::zone::Zone) do not exit to the
//! controlling process one by one. They are appended to a ring in a shared page
//! instead, which the controlling process drains whenever it needs to observe
//! device state. When the ring is full, or a write does not fit, the write
//! takes the slow path.
//!
//! ```
//! use coalesced_mmio::coalesced::zone::Zone;
//! use coalesced_mmio::vm::Vm;
//!
//! let vm = Vm::new().unwrap();
//! vm.register_coalesced_mmio(Zone::mmio(0x1000, 0x100)).unwrap();
//!
//! assert!(vm.mmio_write(0x1050, &[0xaa, 0xbb]).is_handled());
//! let write = vm.ring().consumer().pop().unwrap();
//! assert_eq!(write.data(), &[0xaa, 0xbb]);
//! ```

#![warn(clippy::all)]
#![allow(clippy::len_without_is_empty)]
#![no_std]

extern crate alloc;
#[macro_use]
extern crate log;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod bus;
pub mod coalesced;
pub mod config;
pub mod errno;
pub mod logging;
pub mod mm;
pub mod vm;

pub use crate::bus::Access;
pub use crate::errno::Errno;
