// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fan-out of per-frame work across a fixed set of worker threads.
//!
//! The provider owns `num_threads - 1` persistent workers; the thread that
//! created it (the master) always takes part in the work as well.

use crate::error::PipelineError;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// How long [`Drop`] waits for workers to acknowledge shutdown.
pub const MAX_WORKER_EXIT_WAIT: Duration = Duration::from_millis(4000);

/// An action invoked once per atomic index by [`ParallelizationProvider::execute`].
pub type AtomicAction = Arc<dyn Fn(usize) -> Result<(), PipelineError> + Send + Sync>;

/// An action invoked once per thread by [`ParallelizationProvider::invoke_on_all`].
pub type ThreadAction = Arc<dyn Fn() -> Result<(), PipelineError> + Send + Sync>;

struct BlockWork {
    action: AtomicAction,
    block_size: usize,
    remaining: AtomicIsize,
}

impl BlockWork {
    /// Reserves and runs full blocks until none are left.
    fn drain(&self) -> Result<(), PipelineError> {
        loop {
            let block = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
            if block < 0 {
                return Ok(());
            }
            let start = block as usize * self.block_size;
            for index in start..start + self.block_size {
                if let Err(err) = (self.action)(index) {
                    self.abort();
                    return Err(err);
                }
            }
        }
    }

    /// Stops other threads from reserving further blocks.
    fn abort(&self) {
        self.remaining.store(isize::MIN / 2, Ordering::Release);
    }
}

enum Job {
    Blocks(Arc<BlockWork>),
    All(ThreadAction),
    Exit,
}

type WorkerReport = Result<(), PipelineError>;

#[derive(Debug)]
struct Worker {
    jobs: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

/// Runs work on the master thread plus a pool of persistent workers.
///
/// `execute` and `invoke_on_all` block until every participating thread is
/// done, so work never outlives the call that started it.
#[derive(Debug)]
pub struct ParallelizationProvider {
    num_threads: usize,
    force_single_threaded: AtomicBool,
    owner: ThreadId,
    workers: Vec<Worker>,
    reports: Receiver<WorkerReport>,
    exits: Receiver<()>,
}

impl ParallelizationProvider {
    /// Starts `num_threads - 1` workers; the calling thread becomes the master.
    ///
    /// ## Arguments
    /// * `num_threads` - Total threads including the caller. Values below 1 are raised to 1.
    ///
    /// ## Errors
    /// Returns [`PipelineError::WorkerSpawn`] if a worker thread could not be started.
    pub fn new(num_threads: usize) -> Result<Self, PipelineError> {
        let num_threads = num_threads.max(1);
        let (report_tx, reports) = crossbeam_channel::unbounded();
        let (exit_tx, exits) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(num_threads - 1);

        for index in 0..num_threads - 1 {
            let (jobs, job_rx) = crossbeam_channel::unbounded();
            let report_tx = report_tx.clone();
            let exit_tx = exit_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("vesper-worker-{index}"))
                .spawn(move || worker_loop(job_rx, report_tx, exit_tx))
                .map_err(PipelineError::WorkerSpawn)?;
            workers.push(Worker {
                jobs,
                handle: Some(handle),
            });
        }

        log::debug!("Parallelization provider started with {num_threads} threads.");
        Ok(Self {
            num_threads,
            force_single_threaded: AtomicBool::new(false),
            owner: thread::current().id(),
            workers,
            reports,
            exits,
        })
    }

    /// Threads taking part in parallel work, including the master.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Whether work is currently confined to the master thread.
    pub fn force_single_threaded(&self) -> bool {
        self.force_single_threaded.load(Ordering::Acquire)
    }

    /// Confines (or stops confining) work to the master thread.
    pub fn set_force_single_threaded(&self, single_threaded: bool) {
        self.force_single_threaded.store(single_threaded, Ordering::Release);
    }

    /// Whether the calling thread created this provider.
    pub fn is_master_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Invokes `action` once for every index in `0..num_atomics`.
    ///
    /// Indices are handed out in blocks of `block_size`. The master first runs
    /// the odd-sized tail block, then every thread reserves full blocks until
    /// none remain.
    ///
    /// ## Errors
    /// Returns the first error raised by `action` (the master's takes
    /// precedence), or [`PipelineError::NotOnMasterThread`] when called from
    /// another thread.
    ///
    /// ## Panics
    /// A panic in `action` on the master is re-raised once every worker has
    /// reported back.
    pub fn execute<F>(
        &self,
        num_atomics: usize,
        block_size: usize,
        action: F,
    ) -> Result<(), PipelineError>
    where
        F: Fn(usize) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        self.ensure_master("execute")?;
        let block_size = block_size.max(1);
        let num_full_blocks = num_atomics / block_size;
        let work = Arc::new(BlockWork {
            action: Arc::new(action),
            block_size,
            remaining: AtomicIsize::new(num_full_blocks as isize),
        });

        let (dispatched, sent) = if self.force_single_threaded() {
            (0, Ok(()))
        } else {
            self.dispatch(|| Job::Blocks(work.clone()))
        };

        let master = panic::catch_unwind(AssertUnwindSafe(|| {
            (num_full_blocks * block_size..num_atomics)
                .try_for_each(|index| (work.action)(index))
                .and_then(|()| work.drain())
        }));
        if !matches!(master, Ok(Ok(()))) {
            work.abort();
        }
        let workers = self.gather(dispatched);
        let master = master.unwrap_or_else(|payload| panic::resume_unwind(payload));
        master.and(sent).and(workers)
    }

    /// Invokes `action` once on every worker, and on the master too when
    /// `include_master` is set.
    ///
    /// In single-threaded mode only the master runs it (and only when
    /// `include_master` is set).
    pub fn invoke_on_all<F>(&self, action: F, include_master: bool) -> Result<(), PipelineError>
    where
        F: Fn() -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        self.ensure_master("invoke_on_all")?;
        let action: ThreadAction = Arc::new(action);
        let (dispatched, sent) = if self.force_single_threaded() {
            (0, Ok(()))
        } else {
            self.dispatch(|| Job::All(action.clone()))
        };
        let master = if include_master {
            panic::catch_unwind(AssertUnwindSafe(|| action()))
        } else {
            Ok(Ok(()))
        };
        let workers = self.gather(dispatched);
        let master = master.unwrap_or_else(|payload| panic::resume_unwind(payload));
        master.and(sent).and(workers)
    }

    fn ensure_master(&self, operation: &'static str) -> Result<(), PipelineError> {
        if self.is_master_thread() {
            Ok(())
        } else {
            Err(PipelineError::NotOnMasterThread {
                operation,
                owner: "parallelization provider",
            })
        }
    }

    fn dispatch(&self, job: impl Fn() -> Job) -> (usize, Result<(), PipelineError>) {
        let mut dispatched = 0;
        for worker in &self.workers {
            if worker.jobs.send(job()).is_err() {
                return (dispatched, Err(PipelineError::WorkerDisconnected));
            }
            dispatched += 1;
        }
        (dispatched, Ok(()))
    }

    fn gather(&self, dispatched: usize) -> Result<(), PipelineError> {
        let mut first = None;
        for _ in 0..dispatched {
            match self.reports.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first.get_or_insert(err);
                }
                Err(_) => return Err(PipelineError::WorkerDisconnected),
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Drop for ParallelizationProvider {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.jobs.send(Job::Exit);
        }

        let deadline = Instant::now() + MAX_WORKER_EXIT_WAIT;
        let mut exited = 0;
        while exited < self.workers.len() {
            let timeout = deadline.saturating_duration_since(Instant::now());
            if self.exits.recv_timeout(timeout).is_err() {
                break;
            }
            exited += 1;
        }

        if exited < self.workers.len() {
            log::warn!(
                "{} worker thread(s) did not exit cleanly within {}ms.",
                self.workers.len() - exited,
                MAX_WORKER_EXIT_WAIT.as_millis()
            );
            return;
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(jobs: Receiver<Job>, reports: Sender<WorkerReport>, exits: Sender<()>) {
    while let Ok(job) = jobs.recv() {
        let report = match job {
            Job::Exit => break,
            Job::Blocks(work) => run_guarded(|| work.drain(), || work.abort()),
            Job::All(action) => run_guarded(|| action(), || {}),
        };
        if reports.send(report).is_err() {
            break;
        }
    }
    log::debug!(
        "Worker thread {} has exited normally.",
        thread::current().name().unwrap_or("<unnamed>")
    );
    let _ = exits.send(());
}

fn run_guarded(
    work: impl FnOnce() -> WorkerReport,
    on_panic: impl FnOnce(),
) -> WorkerReport {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(report) => report,
        Err(_) => {
            on_panic();
            Err(PipelineError::WorkerPanicked)
        }
    }
}
