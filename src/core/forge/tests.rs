use std::{
  cell::Cell,
  panic::{catch_unwind, AssertUnwindSafe},
  ptr::NonNull,
  rc::Rc,
  sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
    MutexGuard
  },
  thread
};

use rand::Rng;

use crate::core::{
  forge::*,
  Void
};
use crate::core::forge::AllocationCategory::*;
use crate::log::capture_log;

/// Refuses every request, like a service under memory pressure.
struct ExhaustedService;

impl AllocationService for ExhaustedService {
  fn allocate(&self, _bytes: usize, _callsite: &'static str) -> Option<NonNull<Void>> {
    None
  }

  unsafe fn free(&self, _memory: NonNull<Void>, _bytes: usize) {
    panic!("ExhaustedService never hands out memory");
  }
}

struct FailingMonitor;

impl Monitor for FailingMonitor {
  type Guard<'a> = () where Self: 'a;

  fn create(name: &'static str) -> Result<Self, ForgeError> {
    Err(ForgeError::LockCreation { name, reason: "no monitors left".to_string() })
  }

  fn enter(&self) {}
}

thread_local! {
  static LIVE_MONITORS: Cell<usize> = const { Cell::new(0) };
}

/// A mutex that counts how many instances are alive on the current thread.
struct CountingMonitor(Mutex<()>);

impl Monitor for CountingMonitor {
  type Guard<'a> = MutexGuard<'a, ()> where Self: 'a;

  fn create(_name: &'static str) -> Result<Self, ForgeError> {
    LIVE_MONITORS.with(|live| live.set(live.get() + 1));
    Ok(CountingMonitor(Mutex::new(())))
  }

  fn enter(&self) -> Self::Guard<'_> {
    self.0.lock().unwrap()
  }
}

impl Drop for CountingMonitor {
  fn drop(&mut self) {
    LIVE_MONITORS.with(|live| live.set(live.get() - 1));
  }
}

/// Counts how many times values sharing the counter are dropped.
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
  fn drop(&mut self) {
    self.0.set(self.0.get() + 1);
  }
}

fn assert_all_zero(forge: &Forge) {
  for statistics in forge.current_statistics().snapshot() {
    assert_eq!(statistics.allocated, 0, "{}", statistics);
  }
}


#[test]
fn free_keeps_the_highwater_mark() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let first  = forge.allocate(100, WorkPackets, crate::callsite!()).unwrap();
  let second = forge.allocate(50, WorkPackets, crate::callsite!()).unwrap();
  unsafe { forge.free(first.as_ptr()) };

  let statistics = forge.current_statistics()[WorkPackets].snapshot();
  assert_eq!(statistics.allocated, 50);
  assert_eq!(statistics.highwater, 150);

  unsafe { forge.free(second.as_ptr()) };
  assert_eq!(forge.current_statistics()[WorkPackets].highwater(), 150);
  assert_all_zero(&forge);

  forge.tear_down();
  assert_eq!(service.live_bytes(), 0);
}

#[test]
fn exhausted_service_yields_none_and_leaves_counters_alone() {
  let service   = ExhaustedService;
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  assert!(forge.allocate(128, RememberedSet, crate::callsite!()).is_none());
  for statistics in forge.current_statistics() {
    assert_eq!(statistics.allocated(), 0);
    assert_eq!(statistics.highwater(), 0);
  }

  forge.tear_down();
}

#[test]
fn oversized_request_is_refused_and_logged() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let output = capture_log(|| {
    assert!(forge.allocate(usize::MAX, ManagedHeap, crate::callsite!()).is_none());
  });

  assert!(output.contains("allocation request could not be satisfied"), "{}", output);
  assert!(output.contains("category=ManagedHeap"), "{}", output);
  assert_eq!(forge.current_statistics()[ManagedHeap].highwater(), 0);
  assert_eq!(service.failures(), 0);

  forge.tear_down();
}

#[test]
fn tear_down_reports_statistics_only_when_asked() {
  let service   = SystemAllocationService::new();

  let mut quiet: Forge = Forge::new();
  quiet.initialize(&service).unwrap();
  let output = capture_log(|| quiet.tear_down());
  assert!(!output.contains("total:"), "{}", output);

  let mut verbose: Forge = Forge::new();
  verbose.set_show_statistics(true);
  verbose.initialize(&service).unwrap();
  let block = verbose.allocate(96, Diagnostic, crate::callsite!()).unwrap();
  unsafe { verbose.free(block.as_ptr()) };
  let output = capture_log(|| verbose.tear_down());
  assert!(output.contains("Diagnostic"), "{}", output);
  assert!(output.contains("total: 0 bytes allocated, sum of highwater marks 96 bytes"), "{}", output);
}

#[test]
fn limited_service_fails_without_touching_counters() {
  let service   = SystemAllocationService::with_limit(HEADER_SIZE + 64);
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let block = forge.allocate(64, Finalize, crate::callsite!()).unwrap();
  assert!(forge.allocate(1, Finalize, crate::callsite!()).is_none());
  assert!(forge.allocate(1, Diagnostic, crate::callsite!()).is_none());

  let statistics = forge.current_statistics();
  assert_eq!(statistics[Finalize].allocated(), 64);
  assert_eq!(statistics[Finalize].highwater(), 64);
  assert_eq!(statistics[Diagnostic].highwater(), 0);
  assert_eq!(service.failures(), 2);

  unsafe { forge.free(block.as_ptr()) };
  forge.tear_down();
}

#[test]
fn allocated_is_allocations_minus_frees() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let mut rng       = rand::thread_rng();
  let mut live      = Vec::new();
  let mut expected  = [0usize; AllocationCategory::COUNT];
  let mut highwater = [0usize; AllocationCategory::COUNT];

  for _ in 0..2000 {
    if live.is_empty() || rng.gen_bool(0.6) {
      let category = AllocationCategory::ALL[rng.gen_range(0..AllocationCategory::COUNT)];
      let bytes    = rng.gen_range(0..512);
      let memory   = forge.allocate(bytes, category, crate::callsite!()).unwrap();
      expected[category.index()] += bytes;
      live.push((memory, bytes, category));
    } else {
      let (memory, bytes, category) = live.swap_remove(rng.gen_range(0..live.len()));
      unsafe { forge.free(memory.as_ptr()) };
      expected[category.index()] -= bytes;
    }

    for statistics in forge.current_statistics() {
      let i = statistics.category().index();
      assert_eq!(statistics.allocated(), expected[i]);
      assert!(statistics.highwater() >= highwater[i]);
      assert!(statistics.highwater() >= statistics.allocated());
      highwater[i] = statistics.highwater();
    }
  }

  for (memory, _, _) in live {
    unsafe { forge.free(memory.as_ptr()) };
  }
  assert_all_zero(&forge);
  forge.tear_down();
}

#[test]
fn concurrent_traffic_loses_no_updates() {
  const THREADS   : usize = 8;
  const ITERATIONS: usize = 1000;

  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.set_show_statistics(false);
  forge.initialize(&service).unwrap();

  // Thread t allocates (t + 1) * 8 + i % 64 bytes in category (t + i) % COUNT and keeps every third block.
  let size_of_request = |t: usize, i: usize| (t + 1) * 8 + i % 64;
  let category_of     = |t: usize, i: usize| AllocationCategory::ALL[(t + i) % AllocationCategory::COUNT];
  let mut expected    = [0usize; AllocationCategory::COUNT];
  for t in 0..THREADS {
    for i in (0..ITERATIONS).filter(|i| i % 3 == 0) {
      expected[category_of(t, i).index()] += size_of_request(t, i);
    }
  }

  let done   = AtomicBool::new(false);
  let shared = &forge;
  thread::scope(|scope| {
    let observer = scope.spawn(|| {
      let mut previous = [0usize; AllocationCategory::COUNT];
      while !done.load(Ordering::Acquire) {
        for statistics in shared.current_statistics() {
          let snapshot = statistics.snapshot();
          assert!(snapshot.highwater >= snapshot.allocated, "{}", snapshot);
          assert!(snapshot.highwater >= previous[snapshot.category.index()]);
          previous[snapshot.category.index()] = snapshot.highwater;
        }
      }
    });

    let workers: Vec<_> = (0..THREADS).map(|t| {
      scope.spawn(move || {
        let mut kept = Vec::new();
        for i in 0..ITERATIONS {
          let memory = shared.allocate(size_of_request(t, i), category_of(t, i), crate::callsite!()).unwrap();
          if i % 3 == 0 {
            kept.push(memory.as_ptr() as usize);
          } else {
            unsafe { shared.free(memory.as_ptr()) };
          }
        }
        kept
      })
    }).collect();

    let kept: Vec<usize> = workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect();
    done.store(true, Ordering::Release);
    observer.join().unwrap();

    for (category, expected) in AllocationCategory::ALL.iter().zip(expected) {
      assert_eq!(shared.current_statistics()[*category].allocated(), expected);
    }

    for memory in kept {
      unsafe { shared.free(memory as *mut Void) };
    }
  });

  assert_eq!(forge.current_statistics().total_allocated(), 0);
  assert_eq!(service.live_blocks(), 0);
  forge.tear_down();
}

#[test]
#[should_panic(expected = "not a valid allocation category")]
fn allocate_by_index_rejects_out_of_range_categories() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  forge.allocate_by_index(16, AllocationCategory::COUNT, crate::callsite!());
}

#[test]
fn allocate_by_index_accepts_valid_categories() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let memory = forge.allocate_by_index(24, ManagedHeap.index(), crate::callsite!()).unwrap();
  assert_eq!(forge.current_statistics()[ManagedHeap].allocated(), 24);

  unsafe { forge.free(memory.as_ptr()) };
  forge.tear_down();
}

#[test]
fn initialize_then_tear_down_releases_the_lock() {
  let service = SystemAllocationService::new();
  let mut forge: Forge<CountingMonitor> = Forge::new();
  assert_eq!(LIVE_MONITORS.with(Cell::get), 0);

  forge.initialize(&service).unwrap();
  assert!(forge.is_initialized());
  assert_eq!(LIVE_MONITORS.with(Cell::get), 1);

  forge.tear_down();
  assert!(!forge.is_initialized());
  assert_eq!(LIVE_MONITORS.with(Cell::get), 0);
  assert_eq!(service.live_bytes(), 0);
}

#[test]
fn lock_creation_failure_leaves_the_forge_inert() {
  let service = SystemAllocationService::new();
  let mut forge: Forge<FailingMonitor> = Forge::new();

  let result = forge.initialize(&service);
  assert!(matches!(result, Err(ForgeError::LockCreation { name: "gc_forge", .. })));
  assert!(!forge.is_initialized());
  assert!(forge.allocate(8, Other, crate::callsite!()).is_none());
  assert_eq!(service.live_blocks(), 0);
}

#[test]
fn torn_down_forge_refuses_allocation() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  assert!(forge.allocate(8, Fixed, crate::callsite!()).is_none());

  forge.initialize(&service).unwrap();
  forge.tear_down();

  assert!(forge.allocate(8, Fixed, crate::callsite!()).is_none());
  assert_eq!(service.live_blocks(), 0);
}

#[test]
fn statistics_follow_enumeration_order() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let statistics = forge.current_statistics();
  assert_eq!(statistics.len(), AllocationCategory::COUNT);
  for (i, entry) in statistics.iter().enumerate() {
    assert_eq!(entry.category(), AllocationCategory::ALL[i]);
    assert_eq!(entry.category().index(), i);
  }

  forge.tear_down();
}

#[test]
fn free_of_null_is_ignored() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  unsafe { forge.free(std::ptr::null_mut()) };
  assert_all_zero(&forge);

  forge.tear_down();
}

#[test]
fn memory_is_aligned_and_writable() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let blocks: Vec<_> = (0..40usize).map(|bytes| {
    let memory = forge.allocate(bytes, Diagnostic, crate::callsite!()).unwrap();
    assert_eq!(memory.as_ptr() as usize % BLOCK_ALIGN, 0);
    unsafe { memory.as_ptr().write_bytes(0xAB, bytes) };
    memory
  }).collect();

  assert_eq!(forge.current_statistics()[Diagnostic].allocated(), (0..40).sum::<usize>());
  assert_eq!(service.live_bytes(), (0..40).sum::<usize>() + 40 * HEADER_SIZE);

  for memory in blocks {
    unsafe { forge.free(memory.as_ptr()) };
  }
  forge.tear_down();
}

#[test]
fn construct_and_destroy_run_drop_once() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();
  let drops = Rc::new(Cell::new(0));

  let value = crate::forge_construct!(forge, References, DropCounter(drops.clone())).unwrap();
  assert_eq!(forge.current_statistics()[References].allocated(), size_of::<DropCounter>());
  assert_eq!(drops.get(), 0);

  unsafe { crate::forge_destroy!(forge, value.as_ptr()) };
  assert_eq!(drops.get(), 1);
  assert_eq!(forge.current_statistics()[References].allocated(), 0);

  unsafe { forge.destroy(std::ptr::null_mut::<DropCounter>()) };
  assert_eq!(drops.get(), 1);

  forge.tear_down();
}

#[test]
fn construct_attributes_the_callsite() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  let value  = crate::forge_construct!(forge, Fixed, [0u64; 4]).unwrap();
  let report = service.callsite_report();
  assert_eq!(report.len(), 1);
  assert!(report[0].0.contains("tests.rs"), "{}", report[0].0);
  assert_eq!(report[0].1.live_bytes, 32 + HEADER_SIZE);

  unsafe { forge.destroy(value.as_ptr()) };
  forge.tear_down();
}

#[test]
fn failed_construction_drops_the_value() {
  let service   = ExhaustedService;
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();
  let drops = Rc::new(Cell::new(0));

  assert!(forge.construct(Finalize, crate::callsite!(), DropCounter(drops.clone())).is_none());
  assert_eq!(drops.get(), 1);
  assert_all_zero(&forge);

  forge.tear_down();
}

#[test]
fn over_aligned_types_are_refused() {
  #[repr(align(64))]
  struct CacheLine([u8; 64]);

  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();

  assert!(forge.construct(Other, crate::callsite!(), CacheLine([0; 64])).is_none());
  assert_eq!(service.live_blocks(), 0);

  forge.tear_down();
}

#[test]
fn construct_array_and_destroy_array() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();
  let drops = Rc::new(Cell::new(0));

  let squares = forge.construct_array(WorkPackets, crate::callsite!(), 10, |i| i * i).unwrap();
  assert_eq!(unsafe { squares.as_ref() }, &[0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
  assert_eq!(forge.current_statistics()[WorkPackets].allocated(), 10 * size_of::<usize>());

  let counters = forge.construct_array(Finalize, crate::callsite!(), 5, |_| DropCounter(drops.clone())).unwrap();
  unsafe {
    forge.destroy_array(counters.as_ptr());
    forge.destroy_array(squares.as_ptr());
  }

  assert_eq!(drops.get(), 5);
  assert_all_zero(&forge);
  forge.tear_down();
}

#[test]
fn panicking_initializer_releases_the_array() {
  let service   = SystemAllocationService::new();
  let mut forge: Forge = Forge::new();
  forge.initialize(&service).unwrap();
  let drops = Rc::new(Cell::new(0));

  let result = catch_unwind(AssertUnwindSafe(|| {
    forge.construct_array(RememberedSet, crate::callsite!(), 8, |i| {
      if i == 3 {
        panic!("initializer failed");
      }
      DropCounter(drops.clone())
    })
  }));

  assert!(result.is_err());
  assert_eq!(drops.get(), 3);
  assert_eq!(forge.current_statistics()[RememberedSet].allocated(), 0);
  assert_eq!(forge.current_statistics()[RememberedSet].highwater(), 8 * size_of::<DropCounter>());
  assert_eq!(service.live_blocks(), 0);

  forge.tear_down();
}
