use crate::domain::entities::job::Priority;
use crate::domain::value_objects::ids::JobId;
use metrics::gauge;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// One unit of dispatchable work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub priority: Priority,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueDepths {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}

#[derive(Default)]
struct Lanes {
    lanes: [VecDeque<QueueEntry>; 3],
    queued: HashSet<JobId>,
    /// Per lane, dequeues served from a higher lane while this one waited.
    passed_over: [u32; 3],
    next_sequence: u64,
}

impl Lanes {
    fn pick_lane(&self, starvation_limit: u32) -> Option<usize> {
        // Starved lower lanes first, normal before low.
        for lane in 1..3 {
            if !self.lanes[lane].is_empty() && self.passed_over[lane] >= starvation_limit {
                return Some(lane);
            }
        }
        (0..3).find(|&lane| !self.lanes[lane].is_empty())
    }

    fn record_served(&mut self, served: usize) {
        self.passed_over[served] = 0;
        for lane in served + 1..3 {
            if self.lanes[lane].is_empty() {
                self.passed_over[lane] = 0;
            } else {
                self.passed_over[lane] = self.passed_over[lane].saturating_add(1);
            }
        }
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            high: self.lanes[0].len(),
            normal: self.lanes[1].len(),
            low: self.lanes[2].len(),
        }
    }
}

/// Three-lane dispatch queue with a starvation guard.
///
/// Lanes are served in priority order, FIFO within a lane. A lower lane that
/// has been passed over `starvation_limit` times while non-empty is served
/// next. A job has at most one entry queued at any time.
pub struct PriorityDispatchQueue {
    state: Mutex<Lanes>,
    notify: Notify,
    starvation_limit: u32,
}

impl PriorityDispatchQueue {
    pub fn new(starvation_limit: u32) -> Self {
        Self {
            state: Mutex::new(Lanes::default()),
            notify: Notify::new(),
            starvation_limit: starvation_limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        // A panic while holding the lock leaves the lanes consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `job_id` to the tail of its lane with a fresh sequence number.
    ///
    /// Returns `false` without queuing when the job already has an entry.
    pub fn enqueue(&self, job_id: JobId, priority: Priority) -> bool {
        let depths = {
            let mut state = self.lock();
            if !state.queued.insert(job_id) {
                return false;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.lanes[priority.lane()].push_back(QueueEntry {
                job_id,
                priority,
                sequence,
            });
            state.depths()
        };

        publish_depths(depths);
        self.notify.notify_one();
        true
    }

    /// Take the next entry without waiting.
    pub fn try_dequeue(&self) -> Option<QueueEntry> {
        let (entry, depths) = {
            let mut state = self.lock();
            let lane = state.pick_lane(self.starvation_limit)?;
            let entry = state.lanes[lane].pop_front()?;
            state.queued.remove(&entry.job_id);
            state.record_served(lane);
            (entry, state.depths())
        };

        publish_depths(depths);
        Some(entry)
    }

    /// Take the next entry, waiting until one is available.
    pub async fn dequeue(&self) -> QueueEntry {
        loop {
            if let Some(entry) = self.try_dequeue() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    /// Drop the queued entry for `job_id`, if any.
    pub fn remove(&self, job_id: JobId) -> bool {
        let depths = {
            let mut state = self.lock();
            if !state.queued.remove(&job_id) {
                return false;
            }
            for lane in state.lanes.iter_mut() {
                lane.retain(|entry| entry.job_id != job_id);
            }
            state.depths()
        };

        publish_depths(depths);
        true
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.lock().queued.contains(&job_id)
    }

    pub fn depths(&self) -> QueueDepths {
        self.lock().depths()
    }

    pub fn is_empty(&self) -> bool {
        self.depths().total() == 0
    }

    /// Re-publish the per-lane depth gauges.
    pub fn publish_gauges(&self) {
        publish_depths(self.depths());
    }
}

fn publish_depths(depths: QueueDepths) {
    gauge!("queue_depth", "lane" => "high").set(depths.high as f64);
    gauge!("queue_depth", "lane" => "normal").set(depths.normal as f64);
    gauge!("queue_depth", "lane" => "low").set(depths.low as f64);
}
