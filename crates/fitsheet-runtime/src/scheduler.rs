#![forbid(unsafe_code)]

//! Cooperative main-loop scheduler.
//!
//! [`MainLoop`] is a cloneable handle to a single-threaded task queue with its
//! own clock. Sheet code uses it for the two kinds of suspension it needs:
//! a next-turn hop (`post`) and time-based hops (`post_after`, animation
//! frames). Nothing here blocks or spawns threads.
//!
//! The clock is virtual: it only moves when the owner calls [`MainLoop::advance`]
//! (tests, deterministic replays) or [`MainLoop::drive_realtime`] (follows the
//! wall clock through `web-time`).
//!
//! # Invariants
//!
//! 1. `post` never runs the task synchronously; it runs on the next turn.
//! 2. Tasks run in due-time order; ties run in scheduling (FIFO) order.
//! 3. Tasks scheduled by a running task never run in the same turn.
//! 4. A cancelled task never runs.
//!
//! # Failure Modes
//!
//! - A task that re-posts itself with zero delay forever would starve
//!   `advance`; the loop gives up after `MAX_TURNS_PER_ADVANCE` turns and
//!   logs a warning.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

/// Upper bound on turns processed by one `advance` call.
const MAX_TURNS_PER_ADVANCE: usize = 100_000;

/// Handle for a scheduled task, usable with [`MainLoop::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw ID value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

struct Scheduled {
    id: TaskId,
    due: Duration,
    task: Box<dyn FnOnce()>,
}

struct LoopState {
    now: Duration,
    next_id: u64,
    queue: Vec<Scheduled>,
    turns: u64,
}

/// Single-threaded event loop with a virtual clock.
#[derive(Clone)]
pub struct MainLoop {
    state: Rc<RefCell<LoopState>>,
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MainLoop {
    /// Create an idle loop at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState {
                now: Duration::ZERO,
                next_id: 1,
                queue: Vec::new(),
                turns: 0,
            })),
        }
    }

    /// Current loop time (elapsed since creation).
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of turns processed so far.
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.state.borrow().turns
    }

    /// Schedule `task` for the next turn.
    pub fn post(&self, task: impl FnOnce() + 'static) -> TaskId {
        self.post_after(Duration::ZERO, task)
    }

    /// Schedule `task` to run once `delay` has elapsed.
    pub fn post_after(&self, delay: Duration, task: impl FnOnce() + 'static) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        let due = state.now + delay;
        state.queue.push(Scheduled {
            id,
            due,
            task: Box::new(task),
        });
        tracing::trace!(task = id.0, due_ms = due.as_millis() as u64, "task scheduled");
        id
    }

    /// Cancel a pending task. Returns `false` if it already ran or was cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.queue.len();
        state.queue.retain(|t| t.id != id);
        state.queue.len() != before
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Whether no tasks are waiting.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state.borrow().queue.is_empty()
    }

    /// Due time of the earliest pending task.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.state.borrow().queue.iter().map(|t| t.due).min()
    }

    /// Run one turn: every task due at the current time that was queued
    /// before the turn started.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<TaskId> = {
            let mut state = self.state.borrow_mut();
            state.turns += 1;
            let now = state.now;
            let mut due: Vec<(Duration, TaskId)> = state
                .queue
                .iter()
                .filter(|t| t.due <= now)
                .map(|t| (t.due, t.id))
                .collect();
            due.sort_unstable();
            due.into_iter().map(|(_, id)| id).collect()
        };

        let mut ran = 0;
        for id in batch {
            let task = {
                let mut state = self.state.borrow_mut();
                state
                    .queue
                    .iter()
                    .position(|t| t.id == id)
                    .map(|idx| state.queue.remove(idx))
            };
            // Cancelled by an earlier task in this turn.
            if let Some(scheduled) = task {
                (scheduled.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Move the clock forward by `dt`, running every task that comes due.
    ///
    /// Returns the number of tasks run.
    pub fn advance(&self, dt: Duration) -> usize {
        let deadline = self.now() + dt;
        self.advance_to(deadline)
    }

    /// Move the clock to `deadline` (never backwards), running due tasks.
    pub fn advance_to(&self, deadline: Duration) -> usize {
        let mut ran = 0;
        let mut turns = 0;
        while let Some(next) = self.next_due() {
            if next > deadline {
                break;
            }
            if turns >= MAX_TURNS_PER_ADVANCE {
                tracing::warn!(turns, "main loop starved by zero-delay tasks");
                break;
            }
            {
                let mut state = self.state.borrow_mut();
                if next > state.now {
                    state.now = next;
                }
            }
            ran += self.run_turn();
            turns += 1;
        }
        let mut state = self.state.borrow_mut();
        if deadline > state.now {
            state.now = deadline;
        }
        ran
    }

    /// Run pending work until the queue is empty or `limit` of loop time
    /// has elapsed.
    pub fn run_until_idle(&self, limit: Duration) -> usize {
        let stop = self.now() + limit;
        let mut ran = 0;
        while let Some(next) = self.next_due() {
            if next > stop {
                break;
            }
            ran += self.advance_to(next);
        }
        ran
    }

    /// Follow the wall clock for at most `budget`, sleeping between due tasks.
    ///
    /// Returns early once the loop is idle.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn drive_realtime(&self, budget: Duration) -> usize {
        let start = Instant::now();
        let base = self.now();
        let mut ran = 0;
        while let Some(next) = self.next_due() {
            let elapsed = start.elapsed();
            if elapsed >= budget {
                break;
            }
            let target = base + elapsed;
            if next > target {
                std::thread::sleep((next - target).min(budget - elapsed));
            }
            ran += self.advance_to(base + start.elapsed().min(budget));
        }
        ran
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MainLoop")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .field("turns", &state.turns)
            .finish()
    }
}
