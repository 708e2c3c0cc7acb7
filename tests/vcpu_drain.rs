//! vCPUs write into coalesced zones while the controlling process drains the ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use coalesced_mmio::bus::BusKind;
use coalesced_mmio::coalesced::zone::{RawZone, Zone};
use coalesced_mmio::vm::Vm;
use coalesced_mmio::{Access, Errno};

const VCPUS: u64 = 4;
const WRITES: u64 = 5000;

#[test]
fn drain_while_vcpus_write() {
	let vm = Arc::new(Vm::new().unwrap());
	vm.register_coalesced_mmio(Zone::mmio(0xfee0_0000, 0x1000)).unwrap();
	vm.register_coalesced_mmio(Zone::pio(0x3f8, 8)).unwrap();

	let slow_path = Arc::new(AtomicU64::new(0));
	let done = Arc::new(AtomicBool::new(false));

	let vcpus: Vec<_> = (0..VCPUS)
		.map(|id| {
			let vm = vm.clone();
			let slow_path = slow_path.clone();
			thread::spawn(move || {
				for seq in 0..WRITES {
					let mut data = [0; 8];
					data[..4].copy_from_slice(&(seq as u32).to_le_bytes());
					data[4] = id as u8;
					let access = if seq % 2 == 0 {
						vm.mmio_write(0xfee0_0000 + id * 8, &data)
					} else {
						vm.pio_write(0x3f8, &data)
					};
					if access == Access::Unhandled {
						slow_path.fetch_add(1, Ordering::Relaxed);
					}
				}
			})
		})
		.collect();

	let consumer = {
		let vm = vm.clone();
		let done = done.clone();
		thread::spawn(move || {
			let mut last_seq = [None::<u32>; VCPUS as usize];
			let mut drained = 0u64;
			loop {
				let finished = done.load(Ordering::Acquire);
				if let Some(mut consumer) = vm.ring().try_consumer() {
					for write in consumer.drain() {
						let seq = u32::from_le_bytes(write.data[..4].try_into().unwrap());
						let id = usize::from(write.data[4]);
						let expected = if seq % 2 == 0 {
							BusKind::Mmio
						} else {
							BusKind::Pio
						};
						assert_eq!(write.kind, expected);
						assert!(last_seq[id].is_none_or(|last| last < seq));
						last_seq[id] = Some(seq);
						drained += 1;
					}
				}
				if finished {
					return drained;
				}
				thread::yield_now();
			}
		})
	};

	for vcpu in vcpus {
		vcpu.join().unwrap();
	}
	done.store(true, Ordering::Release);
	let drained = consumer.join().unwrap();

	assert!(vm.ring().is_empty());
	assert_eq!(drained + slow_path.load(Ordering::Relaxed), VCPUS * WRITES);
}

#[test]
fn zones_from_raw_descriptors() {
	let vm = Vm::new().unwrap();
	let raw = RawZone {
		addr: 0xd000_0000,
		size: 0x100,
		pio: 0,
	};
	vm.register_coalesced_mmio(raw.try_into().unwrap()).unwrap();
	assert!(vm.mmio_write(0xd000_00fc, &[1, 2, 3, 4]).is_handled());

	let invalid = RawZone { pio: 7, ..raw };
	assert_eq!(Zone::try_from(invalid), Err(Errno::Inval));
	assert_eq!(i32::from(Errno::Inval), 22);
}

#[test]
fn dropping_the_vm_releases_the_ring() {
	let vm = Vm::new().unwrap();
	for i in 0..16 {
		vm.register_coalesced_mmio(Zone::mmio(i * 0x1000, 0x1000)).unwrap();
		vm.register_coalesced_mmio(Zone::pio(i * 8, 8)).unwrap();
	}
	assert!(vm.mmio_write(0x3000, &[0]).is_handled());
	assert_eq!(vm.buses().bus(BusKind::Mmio).len(), 16);
	assert_eq!(vm.buses().bus(BusKind::Pio).len(), 16);
	drop(vm);
}
