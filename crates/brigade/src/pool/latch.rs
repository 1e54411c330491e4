use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

/// A countdown latch that elects exactly one finalizer.
///
/// The latch starts at the number of workers. Every worker calls
/// [`arrive`](Self::arrive) exactly once as it exits. The arrival that brings
/// the count to zero, and only that arrival, gets `true` back and must run the
/// batch's one-time finalize action.
///
/// The decrement uses `AcqRel`, so the finalizer observes every write the other
/// workers made before arriving (in particular, all their published results).
pub struct CompletionLatch {
    #[cfg(feature = "cache-padded")]
    remaining: crossbeam_utils::CachePadded<AtomicUsize>,
    #[cfg(not(feature = "cache-padded"))]
    remaining: AtomicUsize,
    fired: AtomicBool,
    finalizations: AtomicUsize,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            remaining: crossbeam_utils::CachePadded::new(AtomicUsize::new(count)),
            #[cfg(not(feature = "cache-padded"))]
            remaining: AtomicUsize::new(count),
            fired: AtomicBool::new(false),
            finalizations: AtomicUsize::new(0),
        }
    }

    /// Records one worker exit. Returns `true` for the single caller that
    /// must finalize.
    pub fn arrive(&self) -> bool {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match prev {
            Ok(1) => self.fire(),
            Ok(_) => false,
            // Already at zero: more arrivals than workers. Never finalize twice.
            Err(_) => false,
        }
    }

    fn fire(&self) -> bool {
        let won = self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.finalizations.fetch_add(1, Ordering::Relaxed);
        }
        won
    }

    /// Number of workers that have not arrived yet.
    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Returns `true` once the finalizer has been elected.
    #[cfg(test)]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// How many times a finalizer was elected. Always `0` or `1`.
    pub fn finalizations(&self) -> usize {
        self.finalizations.load(Ordering::Relaxed)
    }
}
