use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::lock;
use crate::interface::instruction::{Instruction, InstructionId};

/// An instruction together with the id it was given at enqueue time.
#[derive(Debug)]
pub(crate) struct Queued {
    pub id: InstructionId,
    pub instruction: Instruction,
}

struct Inner {
    items: VecDeque<Queued>,
    // Monotonic; ids are never handed out twice by the same queue.
    next_id: u64,
}

/// What the worker should do next.
#[derive(Debug)]
pub(crate) enum Next {
    Run(Queued),
    /// The idle interval elapsed with nothing queued.
    IdleTick,
    Exit,
}

/// FIFO of pending instructions shared between callers and the worker.
pub(crate) struct InstructionQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                next_id: 1,
            }),
            available: Condvar::new(),
        }
    }

    pub fn enqueue(&self, instruction: Instruction) -> InstructionId {
        let id = {
            let mut inner = lock(&self.inner);
            let id = InstructionId(inner.next_id);
            inner.next_id += 1;
            inner.items.push_back(Queued { id, instruction });
            id
        };
        self.available.notify_one();
        id
    }

    /// Remove a pending instruction. Returns `false` if it is not queued
    /// (unknown, cancelled, executing or already executed).
    pub fn cancel(&self, id: InstructionId) -> bool {
        let mut inner = lock(&self.inner);
        match inner.items.iter().position(|q| q.id == id) {
            Some(pos) => inner.items.remove(pos).is_some(),
            None => false,
        }
    }

    pub fn pending(&self) -> Vec<InstructionId> {
        lock(&self.inner).items.iter().map(|q| q.id).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    /// Drop everything still queued, returning how many were discarded.
    pub fn discard_all(&self) -> usize {
        let mut inner = lock(&self.inner);
        let n = inner.items.len();
        inner.items.clear();
        n
    }

    /// Wake a worker blocked in [`next`](Self::next) so it re-checks the
    /// exit flag.
    ///
    /// Taking the lock orders this against the worker's check-then-wait, so a
    /// flag stored before calling `wake` cannot be missed.
    pub fn wake(&self) {
        drop(lock(&self.inner));
        self.available.notify_all();
    }

    /// Block until there is an instruction to run, `exit` is set, or
    /// `idle` passes with an empty queue.
    ///
    /// The exit flag wins over pending instructions.
    pub fn next(&self, exit: &AtomicBool, idle: Option<Duration>) -> Next {
        let deadline = idle.map(|d| Instant::now() + d);
        let mut inner = lock(&self.inner);
        loop {
            if exit.load(Ordering::SeqCst) {
                return Next::Exit;
            }
            if let Some(queued) = inner.items.pop_front() {
                return Next::Run(queued);
            }
            inner = match deadline {
                None => self
                    .available
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Next::IdleTick;
                    }
                    self.available
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}
