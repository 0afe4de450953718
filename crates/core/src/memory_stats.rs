//! Cross-thread buffer-store statistics registry.
//!
//! Each Boron thread owns a private buffer store (spec §3.3); this module
//! gives a diagnostics frontend (or a SIGQUIT-style handler, as the teacher
//! crate's `memory_stats` module is used for) visibility into every
//! thread's store size without taking a lock on the thread's own data. Each
//! thread claims an exclusive slot on first use and only ever writes its
//! own slot; aggregation just scans all slots.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of worker threads this registry can track.
const MAX_THREADS: usize = 64;

/// Per-thread buffer-store statistics.
#[derive(Debug)]
pub struct StoreSlot {
    /// Thread id (0 = slot is free).
    pub thread_id: AtomicU64,
    pub buffer_count: AtomicU64,
    pub bytes_used: AtomicU64,
    pub peak_bytes: AtomicU64,
}

impl StoreSlot {
    const fn new() -> Self {
        Self {
            thread_id: AtomicU64::new(0),
            buffer_count: AtomicU64::new(0),
            bytes_used: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
        }
    }
}

/// Global registry of per-thread store statistics.
pub struct StoreStatsRegistry {
    slots: Box<[StoreSlot]>,
    pub overflow_count: AtomicU64,
}

impl StoreStatsRegistry {
    fn new(capacity: usize) -> Self {
        let slots: Vec<StoreSlot> = (0..capacity).map(|_| StoreSlot::new()).collect();
        Self { slots: slots.into_boxed_slice(), overflow_count: AtomicU64::new(0) }
    }

    /// Claim a free slot for the current thread. Returns `None` if full.
    pub fn register(&self) -> Option<usize> {
        let thread_id = current_thread_id();
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.thread_id.compare_exchange(0, thread_id, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                return Some(idx);
            }
        }
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn update(&self, slot_idx: usize, buffer_count: usize, bytes_used: usize) {
        if let Some(slot) = self.slots.get(slot_idx) {
            slot.buffer_count.store(buffer_count as u64, Ordering::Relaxed);
            let bytes = bytes_used as u64;
            slot.bytes_used.store(bytes, Ordering::Relaxed);

            let mut peak = slot.peak_bytes.load(Ordering::Relaxed);
            while bytes > peak {
                match slot.peak_bytes.compare_exchange_weak(peak, bytes, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(current) => peak = current,
                }
            }
        }
    }

    pub fn aggregate(&self) -> AggregateStoreStats {
        let mut active_threads = 0;
        let mut total_buffers: u64 = 0;
        let mut total_bytes: u64 = 0;
        let mut peak_bytes: u64 = 0;

        for slot in self.slots.iter() {
            if slot.thread_id.load(Ordering::Acquire) > 0 {
                active_threads += 1;
                total_buffers += slot.buffer_count.load(Ordering::Relaxed);
                total_bytes += slot.bytes_used.load(Ordering::Relaxed);
                peak_bytes += slot.peak_bytes.load(Ordering::Relaxed);
            }
        }

        AggregateStoreStats {
            active_threads,
            total_buffers,
            total_bytes,
            peak_bytes,
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateStoreStats {
    pub active_threads: usize,
    pub total_buffers: u64,
    pub total_bytes: u64,
    pub peak_bytes: u64,
    pub overflow_count: u64,
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THIS_THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    static SLOT_INDEX: std::cell::Cell<Option<usize>> = const { std::cell::Cell::new(None) };
}

fn current_thread_id() -> u64 {
    THIS_THREAD_ID.with(|&id| id)
}

static REGISTRY: OnceLock<StoreStatsRegistry> = OnceLock::new();

pub fn registry() -> &'static StoreStatsRegistry {
    REGISTRY.get_or_init(|| StoreStatsRegistry::new(MAX_THREADS))
}

pub fn get_or_register_slot() -> Option<usize> {
    SLOT_INDEX.with(|cell| {
        if let Some(idx) = cell.get() {
            Some(idx)
        } else {
            let idx = registry().register();
            cell.set(idx);
            idx
        }
    })
}

/// Report this thread's current store size. Call after `gen`/`recycle`.
pub fn update_store_stats(buffer_count: usize, bytes_used: usize) {
    if let Some(idx) = SLOT_INDEX.with(|cell| cell.get()) {
        registry().update(idx, buffer_count, bytes_used);
    }
}
