//! Multi-threaded nonce search engine
//!
//! A `MiningEngine` runs one session at a time. Each `start` creates a new
//! session generation: worker threads share only that session's state
//! (stop flag, hash counter, solution latch), so a worker left over from a
//! previous generation can never write into a newer one. Starting again or
//! cancelling stops the current generation and joins its workers first.
//!
//! Worker `i` of `n` searches `start_nonce + i, start_nonce + i + n, ...`
//! until the stride would wrap past `u32::MAX`.

use crate::argon2id::{Argon2Config, Argon2Hasher};
use crate::error::{HasherError, MinerError};
use crate::hashrate::{calculate_hashrate, format_hashrate};
use crate::mining::{build_hasher, HashAlgorithm, HasherFactory};
use crate::target::{passes_target, set_nonce, NONCE_SIZE, TARGET_SIZE};
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Sessions shorter than this report a hash rate of zero.
const MIN_RATE_WINDOW: Duration = Duration::from_millis(1);

// =============================================================================
// Job, Solution, Status
// =============================================================================

/// Work description handed to `MiningEngine::start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningJob {
    /// Buffer to hash; copied into every worker.
    pub input: Vec<u8>,
    /// Position of the 4-byte big-endian nonce field inside `input`.
    pub nonce_offset: usize,
    /// Big-endian 256-bit threshold a digest must not exceed.
    pub target: [u8; TARGET_SIZE],
    /// Number of worker threads (default 1).
    pub threads: u32,
    /// First nonce of the search (default 0).
    pub start_nonce: u32,
}

impl MiningJob {
    pub fn new(input: impl Into<Vec<u8>>, nonce_offset: usize, target: [u8; TARGET_SIZE]) -> Self {
        Self {
            input: input.into(),
            nonce_offset,
            target,
            threads: 1,
            start_nonce: 0,
        }
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn start_nonce(mut self, nonce: u32) -> Self {
        self.start_nonce = nonce;
        self
    }

    /// Check the job can be mined: nonce field inside the input, at least one thread.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.threads == 0 {
            return Err(MinerError::ZeroThreads);
        }
        match self.nonce_offset.checked_add(NONCE_SIZE) {
            Some(end) if end <= self.input.len() => Ok(()),
            _ => Err(MinerError::NonceOutOfBounds {
                offset: self.nonce_offset,
                len: self.input.len(),
            }),
        }
    }
}

/// The winning nonce of a session, latched at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u32,
    /// Full input with `nonce` embedded.
    pub input: Vec<u8>,
    /// Digest of `input`.
    pub hash: [u8; TARGET_SIZE],
}

/// Lifecycle state of the engine's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session has been started.
    Idle,
    Running,
    Solved,
    Cancelled,
    /// Every worker ran out of nonces without a solution.
    Exhausted,
    /// Every worker failed to build or run its hasher.
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Solved => "solved",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Exhausted => "exhausted",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Notifications delivered to the channel registered with `with_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum MinerEvent {
    Solved {
        session: u64,
        solution: Solution,
    },
    WorkerFailed {
        session: u64,
        worker: usize,
        error: HasherError,
    },
    /// Sent once per session when it leaves `Running`.
    Finished {
        session: u64,
        status: SessionStatus,
        hashes: u64,
    },
}

// =============================================================================
// Session State
// =============================================================================

/// State shared by the workers of one session generation.
struct Session {
    id: u64,
    job: MiningJob,
    stop: AtomicBool,
    hash_count: AtomicU64,
    active_workers: AtomicUsize,
    failed_workers: AtomicUsize,
    solution: OnceLock<Solution>,
    /// Single writer for every status transition; `done` is signalled on
    /// leaving `Running`.
    status: Mutex<SessionStatus>,
    done: Condvar,
    started_at: Instant,
    finished_at: OnceLock<Instant>,
    /// Attempts counted when the session left `Running`; later hashes by
    /// losing workers are not part of the session.
    final_hashes: OnceLock<u64>,
    last_error: Mutex<Option<HasherError>>,
    events: Option<mpsc::Sender<MinerEvent>>,
}

impl Session {
    fn new(id: u64, job: MiningJob, events: Option<mpsc::Sender<MinerEvent>>) -> Self {
        let threads = job.threads as usize;
        Self {
            id,
            job,
            stop: AtomicBool::new(false),
            hash_count: AtomicU64::new(0),
            active_workers: AtomicUsize::new(threads),
            failed_workers: AtomicUsize::new(0),
            solution: OnceLock::new(),
            status: Mutex::new(SessionStatus::Running),
            done: Condvar::new(),
            started_at: Instant::now(),
            finished_at: OnceLock::new(),
            final_hashes: OnceLock::new(),
            last_error: Mutex::new(None),
            events,
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, SessionStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> SessionStatus {
        *self.lock_status()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn emit(&self, event: MinerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Move out of `Running`. Callers hold the status lock and have checked
    /// the session is still running.
    fn conclude(&self, status: &mut SessionStatus, next: SessionStatus) {
        *status = next;
        let hashes = self.hash_count.load(Ordering::Acquire);
        let _ = self.final_hashes.set(hashes);
        let _ = self.finished_at.set(Instant::now());
        self.done.notify_all();

        info!(
            "Session {} {}: {} hashes, {}",
            self.id,
            next,
            hashes,
            format_hashrate(self.hash_rate())
        );
        self.emit(MinerEvent::Finished {
            session: self.id,
            status: next,
            hashes,
        });
    }

    /// Latch `solution` if the session is still running. Only the first
    /// caller succeeds.
    fn try_latch(&self, worker_id: usize, solution: Solution) -> bool {
        let mut status = self.lock_status();
        if *status != SessionStatus::Running {
            return false;
        }
        if self.solution.set(solution.clone()).is_err() {
            return false;
        }
        self.stop.store(true, Ordering::Release);

        info!(
            "Session {} solved by worker {}: nonce={} hash={}",
            self.id,
            worker_id,
            solution.nonce,
            hex::encode(solution.hash)
        );
        self.emit(MinerEvent::Solved {
            session: self.id,
            solution,
        });
        self.conclude(&mut status, SessionStatus::Solved);
        true
    }

    fn cancel(&self) {
        {
            let mut status = self.lock_status();
            if *status == SessionStatus::Running {
                self.conclude(&mut status, SessionStatus::Cancelled);
            }
        }
        self.stop.store(true, Ordering::Release);
    }

    fn record_failure(&self, worker_id: usize, error: HasherError) {
        warn!("Session {} worker {} failed: {}", self.id, worker_id, error);
        self.failed_workers.fetch_add(1, Ordering::AcqRel);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        self.emit(MinerEvent::WorkerFailed {
            session: self.id,
            worker: worker_id,
            error,
        });
    }

    /// Account for `count` workers that will never run. The last one out
    /// settles a still-running session as exhausted or failed.
    fn workers_exited(&self, count: usize) {
        if self.active_workers.fetch_sub(count, Ordering::AcqRel) != count {
            return;
        }
        let mut status = self.lock_status();
        if *status != SessionStatus::Running {
            return;
        }
        let failed = self.failed_workers.load(Ordering::Acquire);
        let next = if failed == self.job.threads as usize {
            SessionStatus::Failed
        } else {
            SessionStatus::Exhausted
        };
        self.conclude(&mut status, next);
    }

    /// Mark a session whose workers could not all be spawned.
    fn abandon(&self, unspawned: usize) {
        {
            let mut status = self.lock_status();
            if *status == SessionStatus::Running {
                self.conclude(&mut status, SessionStatus::Failed);
            }
        }
        self.stop.store(true, Ordering::Release);
        self.active_workers.fetch_sub(unspawned, Ordering::AcqRel);
    }

    fn wait(&self, timeout: Duration) {
        let status = self.lock_status();
        let _ = self
            .done
            .wait_timeout_while(status, timeout, |s| *s == SessionStatus::Running);
    }

    fn hashes(&self) -> u64 {
        match self.final_hashes.get() {
            Some(&n) => n,
            None => self.hash_count.load(Ordering::Relaxed),
        }
    }

    fn hash_rate(&self) -> f64 {
        let end = self.finished_at.get().copied().unwrap_or_else(Instant::now);
        let elapsed = end.saturating_duration_since(self.started_at);
        if elapsed < MIN_RATE_WINDOW {
            return 0.0;
        }
        calculate_hashrate(self.hashes(), elapsed.as_secs_f64())
    }
}

// =============================================================================
// Workers
// =============================================================================

/// Decrements the session's live worker count however the worker exits.
struct WorkerExit<'a>(&'a Session);

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        self.0.workers_exited(1);
    }
}

fn worker_main(session: &Session, factory: &HasherFactory, worker_id: usize) {
    let _exit = WorkerExit(session);

    let mut hasher = match build_hasher(factory, worker_id) {
        Ok(h) => h,
        Err(e) => {
            session.record_failure(worker_id, e);
            return;
        }
    };
    debug!(
        "Session {} worker {} ready ({})",
        session.id,
        worker_id,
        hasher.name()
    );

    if let Err(e) = search(session, &mut *hasher, worker_id) {
        session.record_failure(worker_id, e);
    }
}

/// Hash this worker's nonce sub-sequence until stopped, solved, or exhausted.
fn search(
    session: &Session,
    hasher: &mut dyn HashAlgorithm,
    worker_id: usize,
) -> Result<(), HasherError> {
    let job = &session.job;
    let stride = job.threads;
    let mut blob = job.input.clone();

    let Some(mut nonce) = job.start_nonce.checked_add(worker_id as u32) else {
        return Ok(());
    };

    loop {
        if session.stop_requested() {
            return Ok(());
        }

        set_nonce(&mut blob, job.nonce_offset, nonce);
        let hash = hasher.hash(&blob)?;
        session.hash_count.fetch_add(1, Ordering::Relaxed);

        if passes_target(&hash, &job.target) {
            session.try_latch(
                worker_id,
                Solution {
                    nonce,
                    input: blob,
                    hash,
                },
            );
            return Ok(());
        }

        nonce = match nonce.checked_add(stride) {
            Some(n) => n,
            None => {
                debug!(
                    "Session {} worker {} exhausted its nonces",
                    session.id, worker_id
                );
                return Ok(());
            }
        };
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Default)]
struct Lifecycle {
    sessions: u64,
    handles: Vec<thread::JoinHandle<()>>,
}

/// Mining engine managing worker threads across repeated sessions.
///
/// All methods take `&self`; the engine can be shared between threads and
/// `start`/`cancel` may race safely.
pub struct MiningEngine {
    factory: Arc<HasherFactory>,
    events: Option<mpsc::Sender<MinerEvent>>,
    /// Serializes `start` and `cancel`; owns the current generation's threads.
    lifecycle: Mutex<Lifecycle>,
    current: RwLock<Option<Arc<Session>>>,
}

impl MiningEngine {
    /// Create an engine whose workers build hashers with `create_hasher`.
    ///
    /// `create_hasher` is called once per worker, inside the worker thread,
    /// with the worker index.
    pub fn new<F>(create_hasher: F) -> Self
    where
        F: Fn(usize) -> Result<Box<dyn HashAlgorithm>, HasherError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(create_hasher),
            events: None,
            lifecycle: Mutex::new(Lifecycle::default()),
            current: RwLock::new(None),
        }
    }

    /// Engine backed by per-worker Argon2id hashers.
    pub fn argon2(config: Argon2Config) -> Self {
        Self::new(move |_| Ok(Box::new(Argon2Hasher::new(&config)?) as Box<dyn HashAlgorithm>))
    }

    /// Deliver `MinerEvent`s for every later session to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<MinerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Begin a new session, cancelling and joining any previous one first.
    ///
    /// Returns as soon as the workers are spawned. An invalid job is
    /// rejected before the previous session is touched.
    pub fn start(&self, job: MiningJob) -> Result<(), MinerError> {
        job.validate()?;

        let mut lifecycle = self.lock_lifecycle();
        self.stop_and_join(&mut lifecycle);

        lifecycle.sessions += 1;
        let threads = job.threads as usize;
        info!(
            "Session {} starting: {} thread(s), {}-byte input, nonce offset {}, start nonce {}",
            lifecycle.sessions,
            threads,
            job.input.len(),
            job.nonce_offset,
            job.start_nonce
        );
        let session = Arc::new(Session::new(lifecycle.sessions, job, self.events.clone()));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&session));

        for worker_id in 0..threads {
            let worker_session = Arc::clone(&session);
            let factory = Arc::clone(&self.factory);
            let spawned = thread::Builder::new()
                .name(format!("miner-{}-{}", session.id, worker_id))
                .spawn(move || worker_main(&worker_session, &*factory, worker_id));

            match spawned {
                Ok(handle) => lifecycle.handles.push(handle),
                Err(e) => {
                    warn!("Session {} could not spawn worker {}: {}", session.id, worker_id, e);
                    session.abandon(threads - worker_id);
                    self.stop_and_join(&mut lifecycle);
                    return Err(MinerError::Spawn(e));
                }
            }
        }
        Ok(())
    }

    /// Stop the current session and join all its workers. No-op when idle.
    pub fn cancel(&self) {
        let mut lifecycle = self.lock_lifecycle();
        self.stop_and_join(&mut lifecycle);
    }

    /// Block until the current session leaves `Running` or `timeout` elapses.
    ///
    /// Mining continues after a timeout. Returns `solution_available()`.
    pub fn wait_for_answer(&self, timeout: Duration) -> bool {
        let Some(session) = self.current() else {
            return false;
        };
        if !timeout.is_zero() {
            session.wait(timeout);
        }
        session.solution.get().is_some()
    }

    pub fn solution_available(&self) -> bool {
        self.with_solution(|_| ()).is_some()
    }

    pub fn solution(&self) -> Option<Solution> {
        self.with_solution(Solution::clone)
    }

    pub fn solution_nonce(&self) -> Option<u32> {
        self.with_solution(|s| s.nonce)
    }

    pub fn solution_hash(&self) -> Option<[u8; TARGET_SIZE]> {
        self.with_solution(|s| s.hash)
    }

    pub fn solution_input(&self) -> Option<Vec<u8>> {
        self.with_solution(|s| s.input.clone())
    }

    /// Average hashes per second of the current (or last) session.
    ///
    /// Measured up to the moment the session ended, so it stays meaningful
    /// after a solution or `cancel`.
    pub fn hash_rate(&self) -> f64 {
        self.current().map_or(0.0, |s| s.hash_rate())
    }

    /// Hash attempts made by the current (or last) session, up to the
    /// moment it left `Running`.
    pub fn hash_count(&self) -> u64 {
        self.current().map_or(0, |s| s.hashes())
    }

    /// True while the current session is searching.
    ///
    /// False as soon as a solution is latched, even if losing workers are
    /// still finishing their last hash.
    pub fn is_running(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    pub fn status(&self) -> SessionStatus {
        self.current().map_or(SessionStatus::Idle, |s| s.status())
    }

    /// Most recent worker failure of the current session.
    pub fn last_error(&self) -> Option<HasherError> {
        self.current().and_then(|s| {
            s.last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Generation number of the current session (0 before the first start).
    pub fn session_id(&self) -> u64 {
        self.current().map_or(0, |s| s.id)
    }

    fn current(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_solution<T>(&self, f: impl FnOnce(&Solution) -> T) -> Option<T> {
        self.current().and_then(|s| s.solution.get().map(f))
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_and_join(&self, lifecycle: &mut Lifecycle) {
        if let Some(session) = self.current() {
            session.cancel();
        }
        for handle in lifecycle.handles.drain(..) {
            if handle.join().is_err() {
                warn!("A mining worker panicked");
            }
        }
    }
}

impl Default for MiningEngine {
    fn default() -> Self {
        Self::argon2(Argon2Config::default())
    }
}

impl Drop for MiningEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}
