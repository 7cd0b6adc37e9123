mod subsystems;

use std::thread;

use gc_forge::{
  log::{info, set_global_logging_threshold},
  Forge,
  SystemAllocationService
};

use crate::subsystems::{run_finalizer, run_marker};

const MARKERS: usize = 4;

fn main() {
  set_global_logging_threshold(1);

  // The collector owns the service and exactly one forge for its lifetime.
  let service = SystemAllocationService::with_limit(64 * 1024 * 1024);
  let mut forge: Forge = Forge::new();
  forge.set_show_statistics(true);
  if let Err(e) = forge.initialize(&service) {
    eprintln!("cannot start the collector: {}", e);
    return;
  }

  let shared = &forge;
  let traced: usize = thread::scope(|scope| {
    let markers: Vec<_> = (0..MARKERS).map(|id| scope.spawn(move || run_marker(shared, id))).collect();
    scope.spawn(move || run_finalizer(shared));

    markers.into_iter().map(|marker| marker.join().unwrap_or(0)).sum()
  });
  println!("traced {} references", traced);

  for statistics in forge.current_statistics() {
    println!("{}", statistics.snapshot());
  }
  #[cfg(feature = "gc_debug")]
  forge.dump_statistics();

  for (callsite, usage) in service.callsite_report() {
    info!(1, "still live from {}: {} bytes in {} blocks", callsite, usage.live_bytes, usage.live_blocks);
  }

  forge.tear_down();
}
