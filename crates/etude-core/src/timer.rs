use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("timer queue full ({0} entries)")]
    QueueFull(usize),
}

/// Owned cancellation handle for a scheduled entry. Cancelling is
/// idempotent and safe after the entry has fired or been dropped.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

struct TimerEntry<T> {
    id: TimerId,
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
    payload: T,
}

/// Bounded, poll-driven timer queue. The host pumps `poll_due` from its
/// tick loop; nothing blocks and nothing fires from another thread.
pub struct TimerQueue<T> {
    entries: Vec<TimerEntry<T>>,
    capacity: usize,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn schedule(
        &mut self,
        now: Instant,
        delay: Duration,
        payload: T,
    ) -> Result<TimerHandle, ScheduleError> {
        self.entries
            .retain(|entry| !entry.cancelled.load(Ordering::Relaxed));
        if self.entries.len() >= self.capacity {
            return Err(ScheduleError::QueueFull(self.capacity));
        }

        let id = TimerId(self.next_id);
        self.next_id += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries.push(TimerEntry {
            id,
            deadline: now + delay,
            cancelled: cancelled.clone(),
            payload,
        });
        Ok(TimerHandle { id, cancelled })
    }

    /// Cancel and drop the entry. Returns whether it was still pending.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        handle.cancel();
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != handle.id);
        self.entries.len() != before
    }

    /// Pop payloads whose deadline has passed, in deadline order,
    /// skipping anything cancelled through a handle in the meantime.
    pub fn poll_due(&mut self, now: Instant) -> Vec<T> {
        let mut fired: Vec<TimerEntry<T>> = Vec::new();
        let mut remaining: Vec<TimerEntry<T>> = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            if entry.cancelled.load(Ordering::Relaxed) {
                continue;
            }
            if entry.deadline <= now {
                fired.push(entry);
            } else {
                remaining.push(entry);
            }
        }

        self.entries = remaining;
        fired.sort_by_key(|entry| (entry.deadline, entry.id.0));
        fired.into_iter().map(|entry| entry.payload).collect()
    }

    pub fn clear(&mut self) {
        for entry in &self.entries {
            entry.cancelled.store(true, Ordering::Relaxed);
        }
        self.entries.clear();
    }

    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.cancelled.load(Ordering::Relaxed))
            .count()
    }
}

/// Last-call-wins slot: at most one outstanding timer per logical purpose.
/// Re-scheduling cancels the previous pending entry and restarts the delay
/// with the latest payload, so a burst of requests produces one firing.
#[derive(Default)]
pub struct DebounceSlot {
    pending: Option<TimerHandle>,
}

impl DebounceSlot {
    pub fn schedule<T>(
        &mut self,
        queue: &mut TimerQueue<T>,
        now: Instant,
        delay: Duration,
        payload: T,
    ) -> Result<TimerId, ScheduleError> {
        if let Some(prev) = self.pending.take() {
            queue.cancel(&prev);
        }
        let handle = queue.schedule(now, delay, payload)?;
        let id = handle.id();
        self.pending = Some(handle);
        Ok(id)
    }

    pub fn cancel<T>(&mut self, queue: &mut TimerQueue<T>) -> bool {
        match self.pending.take() {
            Some(handle) => queue.cancel(&handle),
            None => false,
        }
    }

    /// Forget the handle after its entry fired; the queue no longer holds it.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
