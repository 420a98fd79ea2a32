//! Bounded worker pool with FIFO submission and handle-based collection.
//!
//! At most K workers run at once. Workers are spawned on demand when a task
//! is queued and a slot is free, and exit when the queue drains; queue and
//! worker counter live under a single mutex. `None` capacity selects the
//! unbounded default executor (the rayon global pool). Submission order is
//! the only order callers can observe: results come back through handles
//! joined one by one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use anyhow::Context;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    running: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    capacity: usize,
}

pub struct WorkerPool {
    shared: Option<Arc<Shared>>,
}

impl WorkerPool {
    /// `threads = None` selects the unbounded default executor.
    pub fn new(threads: Option<usize>) -> Self {
        let shared = threads.map(|capacity| {
            Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    running: 0,
                }),
                capacity: capacity.max(1),
            })
        });
        Self { shared }
    }

    /// Queues a task without blocking. The handle yields the result once a
    /// worker has run the task.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let job: Job = Box::new(move || {
            // The receiver may already be gone; nothing left to do then.
            let _ = sender.send(task());
        });
        match &self.shared {
            Some(shared) => enqueue(shared, job),
            None => rayon::spawn(job),
        }
        TaskHandle { receiver }
    }
}

fn enqueue(shared: &Arc<Shared>, job: Job) {
    let spawn_worker = {
        let mut state = shared.state.lock().unwrap();
        state.queue.push_back(job);
        if state.running < shared.capacity {
            state.running += 1;
            true
        } else {
            false
        }
    };
    if spawn_worker {
        let shared = Arc::clone(shared);
        thread::spawn(move || worker_loop(&shared));
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        // Popping and retiring happen under the same lock, so a submission
        // racing with a retiring worker always sees an accurate count.
        let job = {
            let mut state = shared.state.lock().unwrap();
            match state.queue.pop_front() {
                Some(job) => job,
                None => {
                    state.running -= 1;
                    return;
                }
            }
        };
        job();
    }
}

pub struct TaskHandle<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has produced its result.
    pub fn join(self) -> anyhow::Result<T> {
        self.receiver
            .recv()
            .context("worker terminated before delivering a result")
    }
}
