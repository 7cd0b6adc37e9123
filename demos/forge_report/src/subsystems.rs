/*!

Stand-ins for collector subsystems. Each one allocates its bookkeeping through the forge the way the real subsystem
would: work packets during marking, a remembered set that outlives a cycle, and finalization records.

*/

use std::ptr::NonNull;

use gc_forge::{
  callsite,
  forge_construct,
  forge_destroy,
  log::warning,
  AllocationCategory,
  Forge
};

const PACKET_SLOTS: usize = 254;
const CYCLES      : usize = 32;

/// A fixed-size stack of object references handed between marking threads.
pub struct WorkPacket {
  slots: [usize; PACKET_SLOTS],
  top  : usize,
}

impl WorkPacket {
  fn new() -> Self {
    WorkPacket { slots: [0; PACKET_SLOTS], top: 0 }
  }

  fn push(&mut self, reference: usize) -> bool {
    if self.top == PACKET_SLOTS {
      return false;
    }
    self.slots[self.top] = reference;
    self.top += 1;
    true
  }

  /// Scans the packet, returning how many references it held.
  fn drain(&mut self) -> usize {
    let traced = self.slots[..self.top].iter().filter(|reference| **reference != 0).count();
    self.top   = 0;
    traced
  }
}

pub struct FinalizeRecord {
  object : usize,
  pending: bool,
}

/// Fills, drains and releases work packets, and grows a per-marker remembered set that is released at the end.
/// Returns the number of references traced.
pub fn run_marker(forge: &Forge, id: usize) -> usize {
  let mut remembered: Vec<NonNull<[usize]>> = Vec::new();
  let mut traced = 0;

  for cycle in 0..CYCLES {
    let Some(packet) = forge_construct!(forge, AllocationCategory::WorkPackets, WorkPacket::new()) else {
      warning!(1, "marker {} skips cycle {}: no work packet", id, cycle);
      continue;
    };

    let packet_mut = unsafe { &mut *packet.as_ptr() };
    let mut reference = id * 1_000_000 + cycle;
    while packet_mut.push(reference) {
      reference += 8;
    }
    traced += packet_mut.drain();

    let card_count = 16 + (id + cycle) % 48;
    if let Some(cards) = forge.construct_array(AllocationCategory::RememberedSet, callsite!(), card_count, |i| i) {
      remembered.push(cards);
    }

    unsafe { forge_destroy!(forge, packet.as_ptr()) };
  }

  for cards in remembered {
    unsafe { forge.destroy_array(cards.as_ptr()) };
  }
  traced
}

/// Registers finalization records and retires every other one, leaving the rest for the next collection.
pub fn run_finalizer(forge: &Forge) {
  let mut records = Vec::new();

  for object in 0..CYCLES * 4 {
    match forge_construct!(forge, AllocationCategory::Finalize, FinalizeRecord { object, pending: true }) {
      Some(record) => records.push(record),
      None         => warning!(1, "finalizer dropped object {}", object),
    }
  }

  for record in records {
    let finalized = unsafe { !(*record.as_ptr()).pending || (*record.as_ptr()).object % 2 == 0 };
    if finalized {
      unsafe { forge_destroy!(forge, record.as_ptr()) };
    }
  }
}
