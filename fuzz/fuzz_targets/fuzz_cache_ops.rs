#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use holdwire_cache::{Backing, CacheConfig, Completion, KeyedCache, ManualClock, Requested};
use holdwire_core::FetchError;
use libfuzzer_sys::fuzz_target;
use parking_lot::Mutex;
use web_time::Duration;

#[derive(Arbitrary, Debug)]
enum CacheOp {
    Fetch { key: u8 },
    Advance { ms: u16 },
    Succeed { slot: u8, ttl_ms: u16 },
    Fail { slot: u8 },
    Abandon { slot: u8 },
    Invalidate { key: u8 },
    Clear,
}

#[derive(Arbitrary, Debug)]
struct Input {
    single_flight: bool,
    ops: Vec<CacheOp>,
}

#[derive(Clone, Default)]
struct Parked {
    completions: Arc<Mutex<Vec<Completion<u8, u32>>>>,
}

impl Backing<u8, u32> for Parked {
    fn request(&self, _key: &u8, completion: Completion<u8, u32>) {
        self.completions.lock().push(completion);
    }
}

impl Parked {
    fn take(&self, slot: u8) -> Option<Completion<u8, u32>> {
        let mut completions = self.completions.lock();
        if completions.is_empty() {
            return None;
        }
        let index = usize::from(slot) % completions.len();
        Some(completions.swap_remove(index))
    }
}

fuzz_target!(|input: Input| {
    let clock = ManualClock::new();
    let backing = Parked::default();
    let cache = KeyedCache::with_backing(backing.clone())
        .with_clock(clock.clone())
        .with_config(CacheConfig::default().with_single_flight(input.single_flight));

    for op in input.ops.into_iter().take(512) {
        match op {
            CacheOp::Fetch { key } => {
                let holder = cache.fetch(&(key % 8));
                if let Some(fresh) = cache.peek(&(key % 8)) {
                    assert_eq!(holder.get(), Some(fresh.into_value()));
                }
            }
            CacheOp::Advance { ms } => clock.advance(Duration::from_millis(u64::from(ms))),
            CacheOp::Succeed { slot, ttl_ms } => {
                if let Some(completion) = backing.take(slot) {
                    let value = u32::from(*completion.key());
                    completion.succeed(Requested::expiring_in(
                        value,
                        clock.now(),
                        Duration::from_millis(u64::from(ttl_ms)),
                    ));
                }
            }
            CacheOp::Fail { slot } => {
                if let Some(completion) = backing.take(slot) {
                    completion.fail(FetchError::failed("fuzz"));
                }
            }
            CacheOp::Abandon { slot } => drop(backing.take(slot)),
            CacheOp::Invalidate { key } => {
                cache.invalidate(&(key % 8));
            }
            CacheOp::Clear => cache.clear(),
        }
        assert!(cache.len() <= 8);
    }
});
