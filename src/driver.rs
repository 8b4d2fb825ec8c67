//! The request engine: one process-wide multi handle driving every
//! in-flight transfer.
//!
//! A tick ([`perform`]) runs three phases under the engine lock: drain the
//! submission queue onto the multi handle, let the transport make progress
//! and classify its completion events (enforcing the response-idle
//! timeout), then detach finished transfers and fire their completion
//! callbacks. [`wait_activity`] sleeps until the engine plausibly has work;
//! [`Performer`] wraps both in a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use curl::easy::Easy2;
use curl::multi::{Easy2Handle, Multi};

use crate::error::Error;
use crate::metrics;
use crate::queue::SUBMIT;
use crate::request::Request;
use crate::state::{Bridge, RequestState};

/// One transfer registered with the multi handle. The easy handle is owned
/// here between attach and harvest; its handler holds the state alive.
struct Active {
    handle: Easy2Handle<Bridge>,
    state: Arc<RequestState>,
}

/// Engine interior: the multi handle plus the active-transfer registry.
struct Engine {
    multi: Multi,
    active: Vec<Active>,
}

// The multi handle and its registered easy handles are only ever touched
// with the engine mutex held, so accesses never overlap even when the lock
// is taken from different threads. libcurl permits moving handles between
// threads under exactly that condition.
unsafe impl Send for Engine {}

static ENGINE: OnceLock<Mutex<Engine>> = OnceLock::new();

fn engine() -> MutexGuard<'static, Engine> {
    ENGINE
        .get_or_init(|| {
            curl::init();
            Mutex::new(Engine {
                multi: Multi::new(),
                active: Vec::new(),
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    /// Phase 1: move queued submissions onto the multi handle.
    fn drain_submissions(&mut self) {
        while let Some(state) = SUBMIT.try_pop() {
            if !state.is_pending() {
                // Cancelled while still queued; never touched the transport.
                state.run_callback();
                continue;
            }
            match self.attach(&state) {
                Ok(handle) => {
                    metrics::REQUESTS_ACTIVE.increment();
                    self.active.push(Active { handle, state });
                }
                Err(err) => {
                    state.fail_message(err.to_string());
                    state.run_callback();
                }
            }
        }
    }

    fn attach(&self, state: &Arc<RequestState>) -> Result<Easy2Handle<Bridge>, Error> {
        let mut easy = Easy2::new(Bridge::new(state.clone()));
        state.configure(&mut easy)?;
        Ok(self.multi.add2(easy)?)
    }

    /// Phase 2: drive the transport, classify completions, enforce the
    /// response-idle timeout.
    fn drive(&mut self) -> Result<(), Error> {
        self.multi.perform()?;

        let Engine { multi, active } = self;
        multi.messages(|message| {
            for entry in active.iter_mut() {
                let Some(result) = message.result_for2(&entry.handle) else {
                    continue;
                };
                match result {
                    Ok(()) => seal(entry),
                    Err(err) => {
                        entry.state.fail(&err);
                    }
                }
                break;
            }
        });

        let now = Instant::now();
        for entry in &self.active {
            if entry.state.idle_expired(now) {
                entry.state.fail_timeout();
            }
        }
        Ok(())
    }

    /// Phase 3: detach finished transfers and fire their callbacks.
    fn harvest(&mut self) {
        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].state.is_pending() {
                index += 1;
                continue;
            }
            let Active { handle, state } = self.active.remove(index);
            let _ = self.multi.remove2(handle);
            metrics::REQUESTS_ACTIVE.decrement();
            state.run_callback();
        }
    }
}

/// Read the final URL and HTTP code off a finished transfer and seal the
/// request. A transfer the transport reports as successful but that carries
/// no HTTP code never produced a response.
fn seal(entry: &mut Active) {
    let url = match entry.handle.effective_url() {
        Ok(Some(url)) => url.to_string(),
        _ => {
            entry
                .state
                .fail_message(String::from("transfer finished without an effective URL"));
            return;
        }
    };
    match entry.handle.response_code() {
        Ok(code) if code != 0 => {
            entry.state.complete(&url, code as u16);
        }
        _ => {
            entry
                .state
                .fail_message(String::from("transfer finished without an HTTP status code"));
        }
    }
}

/// Run one engine tick.
///
/// Safe to call from any thread; ticks are serialized by the engine lock.
/// Transport callbacks and completion callbacks run on the calling thread.
pub fn perform() -> Result<(), Error> {
    let mut engine = engine();
    engine.drain_submissions();
    engine.drive()?;
    engine.harvest();
    Ok(())
}

/// Block until the engine plausibly has work, up to `timeout`.
///
/// With no active transfer this waits for a new submission; with no queued
/// submission it waits on the transport's socket set; with both populated
/// it returns immediately.
pub fn wait_activity(timeout: Duration) -> Result<(), Error> {
    let engine = engine();
    if engine.active.is_empty() {
        SUBMIT.wait_for(timeout);
    } else if SUBMIT.is_empty() {
        engine.multi.wait(&mut [], timeout)?;
    }
    Ok(())
}

/// Cancel every request the engine knows about: queued submissions first,
/// then every active transfer. Each affected request gets its completion
/// callback exactly once, with status `Cancelled`.
pub fn cancel_all_pending_requests() {
    while let Some(state) = SUBMIT.try_pop() {
        state.cancel();
        state.run_callback();
    }

    let mut engine = engine();
    let Engine { multi, active } = &mut *engine;
    for entry in active.drain(..) {
        entry.state.cancel();
        let _ = multi.remove2(entry.handle);
        metrics::REQUESTS_ACTIVE.decrement();
        entry.state.run_callback();
    }
}

/// Snapshot a handle for every queued and active request, so a caller can
/// await or cancel work it did not submit itself.
pub fn get_all_pending_requests() -> Vec<Request> {
    let mut states = Vec::new();
    SUBMIT.snapshot_into(&mut states);
    {
        let engine = engine();
        states.extend(engine.active.iter().map(|entry| entry.state.clone()));
    }
    states.into_iter().map(Request::new).collect()
}

/// Background thread that ticks the engine until dropped.
///
/// Convenience for callers that do not want to drive [`perform`] and
/// [`wait_activity`] themselves. Tick errors are swallowed: a transport
/// failure already surfaces on the affected request's status.
pub struct Performer {
    done: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Performer {
    /// Spawn with the default 100 ms activity wait.
    pub fn new() -> Result<Self, Error> {
        Self::with_interval(Duration::from_millis(100))
    }

    /// Spawn with a custom activity wait.
    pub fn with_interval(interval: Duration) -> Result<Self, Error> {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let thread = thread::Builder::new()
            .name(String::from("reqline-performer"))
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    let _ = perform();
                    let _ = wait_activity(interval);
                }
            })?;
        Ok(Performer {
            done,
            thread: Some(thread),
        })
    }
}

impl Drop for Performer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
