use parking_lot::Mutex;
use std::collections::VecDeque;

/// The shared queue workers claim jobs from.
///
/// The whole batch is enqueued before any worker starts, so an empty queue
/// means "exhausted": a worker that finds nothing to claim can exit. Each job
/// keeps the index it was submitted at so results can be matched back to their
/// input.
pub struct JobQueue<J> {
    #[cfg(feature = "cache-padded")]
    slots: crossbeam_utils::CachePadded<Mutex<VecDeque<(usize, J)>>>,
    #[cfg(not(feature = "cache-padded"))]
    slots: Mutex<VecDeque<(usize, J)>>,
}

impl<J> JobQueue<J> {
    /// Builds a queue holding every job of the batch, in submission order.
    pub fn new(jobs: impl IntoIterator<Item = J>) -> Self {
        let slots = jobs.into_iter().enumerate().collect::<VecDeque<_>>();
        Self {
            #[cfg(feature = "cache-padded")]
            slots: crossbeam_utils::CachePadded::new(Mutex::new(slots)),
            #[cfg(not(feature = "cache-padded"))]
            slots: Mutex::new(slots),
        }
    }

    /// Atomically claims the next job, or returns `None` once the queue is
    /// exhausted. No two callers ever receive the same job.
    pub fn claim(&self) -> Option<(usize, J)> {
        self.slots.lock().pop_front()
    }

    /// Removes and returns every job that was never claimed.
    pub fn drain(&self) -> Vec<(usize, J)> {
        self.slots.lock().drain(..).collect()
    }

    /// Number of jobs still waiting to be claimed.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
