//! Process-wide cleanup on every exit path
//!
//! Callbacks registered here release slots and remove locks. They fire from
//! whichever path ends the process first:
//! - normal return, through [`LifecycleGuard`]'s drop
//! - `std::process::exit`, through a libc `atexit` hook
//! - SIGINT, SIGTERM and SIGHUP, through the ctrlc handler
//! - a control-channel stop whose workload does not return in time, through
//!   the stop watchdog
//!
//! Each callback is taken out of the registry before it runs, so it runs at
//! most once even when two paths fire together. A path that finds a drain in
//! progress waits for it to finish, so no path ends the process while a
//! callback is still running.

use crate::control::StopSignal;
use crate::error::{SlotError, SlotResult};
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

type Callback = Box<dyn FnOnce() -> SlotResult<()> + Send>;

struct Entry {
    name: String,
    callback: Callback,
}

#[derive(Default)]
pub struct CleanupRegistry {
    entries: Mutex<Vec<Entry>>,
    /// Held for a whole drain
    draining: Mutex<()>,
}

thread_local! {
    // Set while this thread drains, so a callback that exits the process
    // does not wait on its own drain from the atexit hook
    static IN_DRAIN: Cell<bool> = const { Cell::new(false) };
}

static CLEANUP: LazyLock<CleanupRegistry> = LazyLock::new(CleanupRegistry::new);
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// The registry the signal and exit hooks drain.
pub fn global() -> &'static CleanupRegistry {
    &CLEANUP
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> SlotResult<()> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!("lifecycle - Registered cleanup '{}'", name);
        self.entries().push(Entry {
            name,
            callback: Box::new(callback),
        });
    }

    pub fn pending(&self) -> usize {
        self.entries().len()
    }

    /// Run every pending callback in registration order. Returns how many ran.
    ///
    /// Errors and panics are logged and do not stop later callbacks. If
    /// another thread is draining, this waits until it is done.
    pub fn run_all(&self, reason: &str) -> usize {
        if IN_DRAIN.with(Cell::get) {
            return 0;
        }
        let _drain = self.draining.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        IN_DRAIN.with(|flag| flag.set(true));

        let mut ran = 0;
        loop {
            let entry = {
                let mut entries = self.entries();
                if entries.is_empty() {
                    break;
                }
                entries.remove(0)
            };
            ran += 1;
            match catch_unwind(AssertUnwindSafe(entry.callback)) {
                Ok(Ok(())) => tracing::debug!("lifecycle - Cleanup '{}' done ({})", entry.name, reason),
                Ok(Err(e)) => tracing::error!("lifecycle - Cleanup '{}' failed ({}): {}", entry.name, reason, e),
                Err(_) => tracing::error!("lifecycle - Cleanup '{}' panicked ({})", entry.name, reason),
            }
        }

        IN_DRAIN.with(|flag| flag.set(false));
        ran
    }
}

extern "C" fn run_at_exit() {
    global().run_all("process exit");
}

/// Hook the global registry into signals and `atexit`, and register the
/// witness callback. Only the first call does anything.
pub fn install(script_name: &str) -> SlotResult<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let witness = script_name.to_string();
    global().register("exit witness", move || {
        tracing::info!("lifecycle - {} is exiting, running cleanup", witness);
        Ok(())
    });

    ctrlc::set_handler(|| {
        tracing::warn!("lifecycle - Termination signal received");
        global().run_all("signal");
        std::process::exit(0);
    })
    .map_err(|e| SlotError::Io(std::io::Error::other(format!("cannot install signal handler: {}", e))))?;

    // SAFETY: `run_at_exit` is a plain extern "C" fn with no arguments that
    // stays valid for the life of the process.
    if unsafe { libc::atexit(run_at_exit) } != 0 {
        tracing::warn!("lifecycle - atexit registration failed, relying on guard and signals");
    }
    Ok(())
}

/// Runs the global cleanup when dropped, i.e. when the workload returns.
pub struct LifecycleGuard {
    registry: &'static CleanupRegistry,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::with_registry(global())
    }

    pub fn with_registry(registry: &'static CleanupRegistry) -> Self {
        Self { registry }
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.registry.run_all("normal exit");
    }
}

/// Once `stop` triggers, give the workload `grace` to return, then run the
/// pending cleanup and, if `exit_process`, end the process.
///
/// The thread's result says whether it had to force cleanup.
pub fn arm_stop_watchdog(
    stop: StopSignal,
    grace: Duration,
    registry: &'static CleanupRegistry,
    exit_process: bool,
) -> SlotResult<JoinHandle<bool>> {
    let handle = std::thread::Builder::new()
        .name("stop-watchdog".to_string())
        .spawn(move || {
            while !stop.sleep(Duration::from_secs(3600)) {}
            std::thread::sleep(grace);
            if registry.pending() == 0 {
                // A drain may still be running its last callback
                registry.run_all("stop grace elapsed");
                return false;
            }
            tracing::warn!(
                "lifecycle - Workload still running {}ms after stop, forcing cleanup",
                grace.as_millis()
            );
            registry.run_all("stop grace elapsed");
            if exit_process {
                std::process::exit(0);
            }
            true
        })?;
    Ok(handle)
}
