//! Script session: what every managed script runs at startup
//!
//! `setup_script` takes a launching process from nothing to a placed window
//! with its cleanup armed on every exit path and its control channel open.

use crate::allocator::{Acquisition, ReleaseTarget, SlotAllocator};
use crate::control::{ControlServer, StopSignal};
use crate::error::SlotResult;
use crate::lifecycle::{self, CleanupRegistry};
use crate::wm::{Role, SecondaryWindow, WindowGeometry};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Accepted,
    Denied,
    /// Slot reserved, window not placed (yet)
    Claimed,
    Placed,
    Running,
    Released,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

pub struct SessionOptions {
    pub role_hint: Role,
    /// Overrides the port registered in scripts.yaml
    pub control_port: Option<u16>,
    /// Receives every control-channel line other than stop
    pub on_message: Option<MessageHandler>,
    pub registry: &'static CleanupRegistry,
    /// Install the signal and `atexit` hooks; off in tests
    pub install_hooks: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            role_hint: Role::Accepted,
            control_port: None,
            on_message: None,
            registry: lifecycle::global(),
            install_hooks: true,
        }
    }
}

/// One-shot latch the workload waits on before it starts its main loop.
#[derive(Clone, Default)]
pub struct Readiness {
    inner: Arc<(Mutex<Option<bool>>, Condvar)>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    fn done() -> Self {
        let readiness = Self::new();
        readiness.set(true);
        readiness
    }

    pub fn set(&self, all_placed: bool) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|p| p.into_inner());
        if state.is_none() {
            *state = Some(all_placed);
            cvar.notify_all();
        }
    }

    pub fn is_ready(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Block until set. Returns whether every window was placed.
    pub fn wait(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if let Some(all_placed) = *state {
                return all_placed;
            }
            state = cvar.wait(state).unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Like `wait`, `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let (lock, cvar) = &*self.inner;
        let state = lock.lock().unwrap_or_else(|p| p.into_inner());
        let (state, _) = cvar
            .wait_timeout_while(state, timeout, |s| s.is_none())
            .unwrap_or_else(|p| p.into_inner());
        *state
    }
}

pub struct ScriptSession {
    name: String,
    allocator: Arc<SlotAllocator>,
    acquisition: Acquisition,
    state: SessionState,
    stop: StopSignal,
    control: Option<ControlServer>,
    registry: &'static CleanupRegistry,
}

/// Start a managed script: classify, reserve and place its window, arm
/// cleanup and open its control channel.
pub fn setup_script(
    name: &str,
    allocator: Arc<SlotAllocator>,
    options: SessionOptions,
) -> SlotResult<ScriptSession> {
    let registry = options.registry;
    if options.install_hooks {
        lifecycle::install(name)?;
    }

    let mut state = SessionState::Starting;
    let acquisition = allocator.acquire(options.role_hint, name)?;

    match acquisition.role {
        Role::Accepted => transition(name, &mut state, SessionState::Accepted),
        Role::Denied => transition(name, &mut state, SessionState::Denied),
        Role::Server => {}
    }

    match (acquisition.role, acquisition.slot) {
        (Role::Accepted, Some(_)) => {
            // Accepted means `acquire` created the lock for this process
            let (alloc, owner) = (allocator.clone(), name.to_string());
            registry.register(format!("remove lock of {}", name), move || {
                alloc.locks().remove(&owner).map(|_| ())
            });
            let (alloc, owner) = (allocator.clone(), name.to_string());
            registry.register(format!("release slots of {}", name), move || {
                alloc.release(&ReleaseTarget::Owner(owner)).map(|_| ())
            });
        }
        (Role::Denied, Some(index)) => {
            let alloc = allocator.clone();
            registry.register(format!("release denied slot {}", index), move || {
                alloc.release(&ReleaseTarget::DeniedSlot(index)).map(|_| ())
            });
        }
        _ => {}
    }
    if acquisition.slot.is_some() {
        transition(name, &mut state, SessionState::Claimed);
    }
    if acquisition.placed {
        transition(name, &mut state, SessionState::Placed);
    }

    // The control port belongs to the accepted instance
    let stop = StopSignal::new();
    let port = options
        .control_port
        .or_else(|| allocator.registry().get(name).map(|entry| entry.port))
        .filter(|_| acquisition.role == Role::Accepted);
    let control = match port {
        Some(port) => {
            let handler = options.on_message;
            let owner = name.to_string();
            Some(ControlServer::start(port, stop.clone(), move |message| match &handler {
                Some(handler) => handler(message),
                None => tracing::info!("script - {} ignoring message: {}", owner, message),
            })?)
        }
        None => {
            tracing::info!("script - {} has no control channel, it can only be stopped by signal", name);
            None
        }
    };

    let grace = Duration::from_millis(allocator.config().stop_grace_ms);
    lifecycle::arm_stop_watchdog(stop.clone(), grace, registry, options.install_hooks)?;

    transition(name, &mut state, SessionState::Running);
    Ok(ScriptSession {
        name: name.to_string(),
        allocator,
        acquisition,
        state,
        stop,
        control,
        registry,
    })
}

fn transition(name: &str, state: &mut SessionState, next: SessionState) {
    tracing::debug!("script - {}: {} -> {}", name, state, next);
    *state = next;
}

impl ScriptSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.acquisition.role
    }

    pub fn slot(&self) -> Option<usize> {
        self.acquisition.slot
    }

    pub fn title(&self) -> &str {
        &self.acquisition.title
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.acquisition.geometry
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn control_port(&self) -> Option<u16> {
        self.control.as_ref().map(|c| c.addr().port())
    }

    /// Lay out `windows` beside the primary window on a worker thread.
    ///
    /// Only accepted sessions own a strip; for any other role the returned
    /// latch is already set.
    pub fn spawn_secondary_layout(&self, windows: Vec<SecondaryWindow>) -> SlotResult<Readiness> {
        let (Role::Accepted, Some(slot)) = (self.acquisition.role, self.acquisition.slot) else {
            tracing::info!("script - {} is {}, skipping secondary windows", self.name, self.role());
            return Ok(Readiness::done());
        };
        if windows.is_empty() {
            return Ok(Readiness::done());
        }

        let readiness = Readiness::new();
        let latch = readiness.clone();
        let allocator = self.allocator.clone();
        let name = self.name.clone();
        std::thread::Builder::new()
            .name(format!("{}-secondary", self.name))
            .spawn(move || {
                let all_placed = match allocator.attach_secondary_windows(slot, &windows) {
                    Ok(geometries) => {
                        tracing::info!("script - {} placed {} secondary windows", name, geometries.len());
                        true
                    }
                    Err(e) => {
                        tracing::error!("script - {} secondary layout incomplete: {}", name, e);
                        false
                    }
                };
                latch.set(all_placed);
            })?;
        Ok(readiness)
    }

    /// Run the registered cleanup now instead of at process exit.
    pub fn finish(mut self) {
        self.registry.run_all("session finished");
        transition(&self.name, &mut self.state, SessionState::Released);
    }
}

impl Drop for ScriptSession {
    fn drop(&mut self) {
        if self.state != SessionState::Released {
            self.registry.run_all("session dropped");
        }
    }
}
