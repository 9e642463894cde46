//! Deferred actions keyed by frame timestamp
//!
//! Replaces fire-and-forget timers. Every task names its target by slot plus
//! the generation it was scheduled against, so a task that outlives a reset
//! is recognised as stale and ignored.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskAction {
    /// Fully reset an exploded shape and bring it back into the scene
    RespawnShape { slot: usize, generation: u64 },
    /// Restore glow and color saved when a collision flash started
    EndFlash {
        slot: usize,
        generation: u64,
        flash: u64,
    },
}

impl TaskAction {
    pub fn slot(&self) -> usize {
        match *self {
            TaskAction::RespawnShape { slot, .. } | TaskAction::EndFlash { slot, .. } => slot,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledTask {
    pub due_ms: f64,
    pub action: TaskAction,
    seq: u64,
}

impl Eq for ScheduledTask {}

impl Ord for ScheduledTask {
    // Min-heap on due time; insertion order breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .total_cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct Scheduler {
    queue: BinaryHeap<ScheduledTask>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: f64, action: TaskAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledTask { due_ms, action, seq });
    }

    /// Move every task due at or before `now_ms` into `out`, earliest first.
    pub fn drain_due(&mut self, now_ms: f64, out: &mut Vec<TaskAction>) {
        while let Some(task) = self.queue.peek() {
            if task.due_ms > now_ms {
                break;
            }
            if let Some(task) = self.queue.pop() {
                out.push(task.action);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop pending tasks the predicate rejects.
    pub fn retain(&mut self, mut keep: impl FnMut(&TaskAction) -> bool) {
        self.queue.retain(|task| keep(&task.action));
    }

    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
