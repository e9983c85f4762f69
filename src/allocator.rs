//! Slot allocator facade
//!
//! Ties the slot store, lock files, layout calculator and window adjuster
//! together. One instance per process; every other process on the host
//! coordinates with it through the shared store only.

use crate::config::{ScriptRegistry, TermslotsConfig};
use crate::control;
use crate::error::{SlotError, SlotResult};
use crate::lock::{self, LockFileManager, is_valid_name};
use crate::paths::{PATH_LOCKS, PATH_SLOTS_DB};
use crate::slots::{Inventory, OccupantRow, SlotStore};
use crate::wm::{
    AdjusterBackend, LayoutCalculator, Role, SecondaryWindow, WindowAdjuster, WindowGeometry,
    adjust_with_retry,
};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Outcome of a successful `acquire`.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub role: Role,
    /// Index in the primary inventory (accepted) or the denied inventory
    /// (denied). `None` for the server.
    pub slot: Option<usize>,
    pub title: String,
    pub geometry: WindowGeometry,
    /// False when the window could not be placed; the slot stays reserved.
    pub placed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseTarget {
    Slot(usize),
    DeniedSlot(usize),
    Owner(String),
}

pub struct SlotAllocator {
    store: Mutex<SlotStore>,
    adjuster: Box<dyn WindowAdjuster>,
    layout: LayoutCalculator,
    locks: LockFileManager,
    config: TermslotsConfig,
    registry: ScriptRegistry,
}

impl SlotAllocator {
    pub fn new(
        store: SlotStore,
        adjuster: Box<dyn WindowAdjuster>,
        locks: LockFileManager,
        config: TermslotsConfig,
        registry: ScriptRegistry,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            adjuster,
            layout: LayoutCalculator::from_config(&config),
            locks,
            config,
            registry,
        }
    }

    /// Open the shared store under the data directory and pick the window
    /// backend from config.
    pub fn open(config: TermslotsConfig, registry: ScriptRegistry) -> SlotResult<Self> {
        crate::paths::ensure_dirs()?;
        let store = SlotStore::open(
            PATH_SLOTS_DB.as_path(),
            config.slot_count,
            config.denied_slot_count,
            Duration::from_millis(config.store_timeout_ms),
        )?;
        let adjuster = AdjusterBackend::from_config(config.window_backend);
        tracing::info!("allocator - Using {} window backend", adjuster.name());
        Ok(Self::new(
            store,
            Box::new(adjuster),
            LockFileManager::new(PATH_LOCKS.as_path()),
            config,
            registry,
        ))
    }

    pub fn config(&self) -> &TermslotsConfig {
        &self.config
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &LockFileManager {
        &self.locks
    }

    pub fn adjuster(&self) -> &dyn WindowAdjuster {
        self.adjuster.as_ref()
    }

    fn store(&self) -> MutexGuard<'_, SlotStore> {
        // Store calls are single transactions, a panic mid-call leaves nothing half done
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.config.probe_timeout_ms)
    }

    pub fn title_for(&self, name: &str) -> String {
        format!("{}{}", self.config.title_prefix, name)
    }

    pub fn denied_title_for(&self, name: &str, index: usize) -> String {
        format!("{}_denied({})", self.title_for(name), index)
    }

    /// Decide the role of a launching script.
    ///
    /// Creating the lock is the decision: whoever creates it is accepted and
    /// owns it. An existing lock denies while its owner answers the control
    /// port or its recorded pid is alive. Otherwise it is stale: it is
    /// reclaimed, or, with `reclaim_stale_locks` off, the launch is denied and
    /// the operator has to `unlock` it. A lock with neither a pid nor a
    /// registered port cannot be checked and is trusted to be live.
    pub fn classify(&self, role_hint: Role, name: &str) -> SlotResult<Role> {
        if role_hint != Role::Accepted {
            return Ok(role_hint);
        }
        if self.locks.create(name)? {
            return Ok(Role::Accepted);
        }

        let holder = self.locks.holder_pid(name)?;
        let port = self.registry.get(name).map(|entry| entry.port);
        if let Some(port) = port
            && control::probe(port, self.probe_timeout())
        {
            tracing::info!("allocator - {} is already running on port {}, denying", name, port);
            return Ok(Role::Denied);
        }
        match holder {
            Some(pid) if lock::pid_alive(pid) => {
                tracing::info!("allocator - {} is locked by running pid {}, denying", name, pid);
                return Ok(Role::Denied);
            }
            None if port.is_none() => {
                tracing::info!("allocator - {} is locked and cannot be checked, denying", name);
                return Ok(Role::Denied);
            }
            _ => {}
        }

        if !self.config.reclaim_stale_locks {
            let stale = SlotError::StaleLock {
                name: name.to_string(),
            };
            tracing::warn!("allocator - {}; starting denied, send '{} unlock' to clear it", stale, name);
            return Ok(Role::Denied);
        }

        let reclaimed = self.store().serialized(|| self.locks.reclaim(name, holder))?;
        if reclaimed {
            tracing::warn!("allocator - Lock of {} was stale (pid {:?}), reclaimed it", name, holder);
            Ok(Role::Accepted)
        } else {
            tracing::info!("allocator - Another launch of {} took its stale lock first, denying", name);
            Ok(Role::Denied)
        }
    }

    /// Classify, reserve a slot and place the window of a launching script.
    ///
    /// An accepted acquisition owns the lock of `name`; the caller removes it
    /// when the script exits. If no slot can be reserved the lock is given
    /// back before the error is returned.
    pub fn acquire(&self, role_hint: Role, name: &str) -> SlotResult<Acquisition> {
        if role_hint != Role::Server && !is_valid_name(name) {
            return Err(SlotError::InvalidName(name.to_string()));
        }
        let role = self.classify(role_hint, name)?;

        let (slot, title) = match role {
            Role::Server => (None, self.config.server_title.clone()),
            Role::Accepted => {
                let title = self.title_for(name);
                let row = self.main_row(&title);
                let claimed = self.store().claim_first_free(name, &row);
                match claimed {
                    Ok(Some(index)) => (Some(index), title),
                    Ok(None) => {
                        self.give_back_lock(name);
                        return Err(SlotError::NoSlotAvailable {
                            inventory: Inventory::Primary,
                        });
                    }
                    Err(e) => {
                        self.give_back_lock(name);
                        return Err(e);
                    }
                }
            }
            Role::Denied => {
                let row = self.main_row(&self.title_for(name));
                let index = self
                    .store()
                    .claim_first_free_denied(name, &row)?
                    .ok_or(SlotError::NoSlotAvailable {
                        inventory: Inventory::Denied,
                    })?;
                (Some(index), self.denied_title_for(name, index))
            }
        };

        let geometry = match self.layout.primary_geometry(role, slot.unwrap_or(0)) {
            Ok(geometry) => geometry,
            Err(e) => {
                if let Some(index) = slot {
                    self.release_quietly(role, index);
                }
                if role == Role::Accepted {
                    self.give_back_lock(name);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.adjuster.set_title(&title) {
            tracing::warn!("allocator - {} could not set title '{}': {}", name, title, e);
        }
        let placed = match adjust_with_retry(self.adjuster.as_ref(), &title, &geometry, &self.config.adjust_retry) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "allocator - {} ({}, slot {:?}) not placed, keeping reservation: {}",
                    name,
                    role,
                    slot,
                    e
                );
                false
            }
        };

        tracing::info!("allocator - {} acquired as {} (slot {:?}) at {}", name, role, slot, geometry);
        Ok(Acquisition {
            role,
            slot,
            title,
            geometry,
            placed,
        })
    }

    fn give_back_lock(&self, name: &str) {
        if let Err(e) = self.locks.remove(name) {
            tracing::warn!("allocator - Could not remove lock of {}: {}", name, e);
        }
    }

    fn main_row(&self, title: &str) -> OccupantRow {
        let l = self.layout.layout();
        OccupantRow::new(title, l.main_width, l.main_height)
    }

    fn release_quietly(&self, role: Role, index: usize) {
        let inventory = match role {
            Role::Denied => Inventory::Denied,
            _ => Inventory::Primary,
        };
        let result = match inventory {
            Inventory::Primary => self.store().release(index),
            Inventory::Denied => self.store().release_denied(index),
        };
        if let Err(e) = result {
            tracing::warn!("allocator - Could not roll back {} slot {}: {}", inventory, index, e);
        }
    }

    /// Record `windows` as rows 1.. of primary `slot` and place each one in
    /// the strip beside the primary window.
    ///
    /// Every window is attempted; the first failure is returned afterwards.
    /// Calling again with the same windows rewrites the same rows.
    pub fn attach_secondary_windows(
        &self,
        slot: usize,
        windows: &[SecondaryWindow],
    ) -> SlotResult<Vec<WindowGeometry>> {
        let geometries = self.layout.secondary_geometry(slot, windows)?;
        let rows: Vec<OccupantRow> = windows
            .iter()
            .map(|w| OccupantRow::new(w.name.clone(), w.width, w.height))
            .collect();
        self.store().occupy_with_rows(slot, &rows, 1)?;

        let mut first_error = None;
        for (window, geometry) in windows.iter().zip(&geometries) {
            if let Err(e) =
                adjust_with_retry(self.adjuster.as_ref(), &window.name, geometry, &self.config.adjust_retry)
            {
                tracing::error!(
                    "allocator - Secondary window '{}' of slot {} not placed: {}",
                    window.name,
                    slot,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(geometries),
        }
    }

    /// Free a reservation. Returns how many slots changed; unknown targets
    /// change nothing.
    pub fn release(&self, target: &ReleaseTarget) -> SlotResult<usize> {
        let result = match target {
            ReleaseTarget::Slot(index) => self.store().release(*index).map(usize::from),
            ReleaseTarget::DeniedSlot(index) => self.store().release_denied(*index).map(usize::from),
            ReleaseTarget::Owner(name) => self.store().release_by_owner_name(name),
        };
        match result {
            Err(SlotError::InvalidSlot { inventory, index, .. }) => {
                tracing::warn!("allocator - Ignoring release of unknown {} slot {}", inventory, index);
                Ok(0)
            }
            other => other,
        }
    }

    pub fn free_all(&self, denied_only: bool) -> SlotResult<usize> {
        let mut store = self.store();
        let mut freed = store.free_all_denied()?;
        if !denied_only {
            freed += store.free_all()?;
        }
        Ok(freed)
    }

    pub fn list_owner_names(&self) -> SlotResult<Vec<String>> {
        self.store().list_owner_names()
    }

    /// Re-apply geometry to every window recorded in the store. Returns how
    /// many windows were placed; missing windows are logged and skipped.
    pub fn refit_all(&self) -> SlotResult<usize> {
        let (primary, denied) = {
            let store = self.store();
            (store.snapshot(Inventory::Primary)?, store.snapshot(Inventory::Denied)?)
        };

        let mut targets: Vec<(String, WindowGeometry)> = Vec::new();
        for slot in primary.iter().filter(|s| !s.is_free()) {
            let Some((main, secondary)) = slot.rows.split_first() else {
                continue;
            };
            targets.push((main.label.clone(), self.layout.primary_geometry(Role::Accepted, slot.index)?));
            let windows: Vec<SecondaryWindow> = secondary
                .iter()
                .map(|row| SecondaryWindow::new(row.label.clone(), row.width, row.height))
                .collect();
            for (window, geometry) in windows.iter().zip(self.layout.secondary_geometry(slot.index, &windows)?) {
                targets.push((window.name.clone(), geometry));
            }
        }
        for slot in denied.iter().filter(|s| !s.is_free()) {
            if let Some(owner) = &slot.owner_name {
                targets.push((
                    self.denied_title_for(owner, slot.index),
                    self.layout.primary_geometry(Role::Denied, slot.index)?,
                ));
            }
        }

        let mut placed = 0;
        for (title, geometry) in &targets {
            match self.adjuster.adjust(title, geometry) {
                Ok(()) => placed += 1,
                Err(e) => tracing::warn!("allocator - Refit skipped '{}': {}", title, e),
            }
        }
        tracing::info!("allocator - Refit {}/{} windows", placed, targets.len());
        Ok(placed)
    }

    pub fn refit_server(&self) -> SlotResult<()> {
        let geometry = self.layout.primary_geometry(Role::Server, 0)?;
        self.adjuster.adjust(&self.config.server_title, &geometry)
    }

    /// Remove the lock of `name` unless a live process answers its control
    /// port. Returns whether a lock file was removed.
    pub fn force_unlock(&self, name: &str) -> SlotResult<bool> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| SlotError::UnknownScript(name.to_string()))?;
        if control::probe(entry.port, self.probe_timeout()) {
            return Err(SlotError::LockHeld {
                name: name.to_string(),
            });
        }
        let removed = self.locks.remove(name)?;
        if removed {
            tracing::warn!("allocator - Removed lock of {}", name);
        }
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{LayoutConfig, RetryConfig, ScriptEntry};
    use crate::control::{ControlServer, StopSignal};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Records every placement; titles in `missing` behave like unmapped windows.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingAdjuster {
        pub calls: Arc<Mutex<Vec<(String, WindowGeometry)>>>,
        pub missing: Arc<Mutex<HashSet<String>>>,
    }

    impl RecordingAdjuster {
        pub fn placed(&self) -> Vec<(String, WindowGeometry)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn hide(&self, title: &str) {
            self.missing.lock().unwrap().insert(title.to_string());
        }
    }

    impl WindowAdjuster for RecordingAdjuster {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn set_title(&self, _title: &str) -> SlotResult<()> {
            Ok(())
        }

        fn adjust(&self, title: &str, geom: &WindowGeometry) -> SlotResult<()> {
            if self.missing.lock().unwrap().contains(title) {
                return Err(SlotError::WindowNotFound {
                    title: title.to_string(),
                });
            }
            self.calls.lock().unwrap().push((title.to_string(), *geom));
            Ok(())
        }
    }

    pub(crate) fn test_config(slots: usize, denied: usize) -> TermslotsConfig {
        TermslotsConfig {
            slot_count: slots,
            denied_slot_count: denied,
            layout: LayoutConfig {
                row_height: 40,
                column_width: 400,
                main_width: 150,
                main_height: 80,
                ..LayoutConfig::default()
            },
            adjust_retry: RetryConfig {
                attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            probe_timeout_ms: 200,
            ..TermslotsConfig::default()
        }
    }

    pub(crate) fn test_allocator(
        dir: &TempDir,
        config: TermslotsConfig,
        registry: ScriptRegistry,
    ) -> (SlotAllocator, RecordingAdjuster) {
        let store = SlotStore::open(
            &dir.path().join("slots.db"),
            config.slot_count,
            config.denied_slot_count,
            Duration::from_secs(2),
        )
        .unwrap();
        let adjuster = RecordingAdjuster::default();
        let allocator = SlotAllocator::new(
            store,
            Box::new(adjuster.clone()),
            LockFileManager::new(dir.path().join("locks")),
            config,
            registry,
        );
        (allocator, adjuster)
    }

    fn registry_with(name: &str, port: u16) -> ScriptRegistry {
        ScriptRegistry {
            scripts: vec![ScriptEntry {
                name: name.to_string(),
                port,
                command: Vec::new(),
                secondary_windows: Vec::new(),
            }],
        }
    }

    /// A port nothing listens on: bind, read the port, drop the listener.
    fn silent_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Leave a lock behind as a crashed owner would: it names a pid that has
    /// already exited.
    pub(crate) fn plant_stale_lock(locks: &LockFileManager, name: &str) -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        std::fs::create_dir_all(locks.dir()).unwrap();
        std::fs::write(locks.path(name).unwrap(), format!("{}\n", pid)).unwrap();
        pid
    }

    #[test]
    fn inventory_of_three_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), ScriptRegistry::default());

        let slots: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| alloc.acquire(Role::Accepted, n).unwrap().slot)
            .collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);

        assert!(matches!(
            alloc.acquire(Role::Accepted, "d"),
            Err(SlotError::NoSlotAvailable {
                inventory: Inventory::Primary
            })
        ));
        assert!(!alloc.locks().exists("d").unwrap());

        assert_eq!(alloc.release(&ReleaseTarget::Slot(1)).unwrap(), 1);
        assert_eq!(alloc.acquire(Role::Accepted, "d").unwrap().slot, Some(1));
    }

    #[test]
    fn accepted_window_is_titled_and_placed() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(3, 2), ScriptRegistry::default());

        alloc.acquire(Role::Accepted, "first").unwrap();
        let acq = alloc.acquire(Role::Accepted, "shopwatcher").unwrap();
        assert_eq!(acq.role, Role::Accepted);
        assert_eq!(acq.title, "tsl_shopwatcher");
        assert_eq!(acq.geometry.top, 40);
        assert!(acq.placed);
        assert_eq!(adjuster.placed().last().unwrap(), &("tsl_shopwatcher".to_string(), acq.geometry));
    }

    #[test]
    fn server_never_takes_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(1, 1), ScriptRegistry::default());

        let acq = alloc.acquire(Role::Server, "server").unwrap();
        assert_eq!(acq.slot, None);
        assert_eq!(acq.title, "tsl_SERVER");
        assert_eq!(acq.geometry, LayoutConfig::default().server);
        assert_eq!(adjuster.placed().len(), 1);
        assert_eq!(alloc.acquire(Role::Accepted, "a").unwrap().slot, Some(0));
    }

    #[test]
    fn failed_adjust_keeps_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(2, 1), ScriptRegistry::default());
        adjuster.hide("tsl_ghost");

        let acq = alloc.acquire(Role::Accepted, "ghost").unwrap();
        assert!(!acq.placed);
        assert_eq!(acq.slot, Some(0));
        assert_eq!(alloc.list_owner_names().unwrap(), vec!["ghost".to_string()]);
    }

    #[test]
    fn live_lock_owner_denies_second_instance() {
        let dir = tempfile::tempdir().unwrap();
        let server = ControlServer::start(0, StopSignal::new(), |_| {}).unwrap();
        let registry = registry_with("robeau", server.addr().port());
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), registry);

        alloc.locks().create("robeau").unwrap();
        let acq = alloc.acquire(Role::Accepted, "robeau").unwrap();
        assert_eq!(acq.role, Role::Denied);
        assert_eq!(acq.slot, Some(0));
        assert_eq!(acq.title, "tsl_robeau_denied(0)");
        assert!(alloc.list_owner_names().unwrap().is_empty());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), registry_with("robeau", silent_port()));

        plant_stale_lock(alloc.locks(), "robeau");
        assert_eq!(alloc.classify(Role::Accepted, "robeau").unwrap(), Role::Accepted);
        assert_eq!(alloc.locks().holder_pid("robeau").unwrap(), Some(std::process::id()));
    }

    #[test]
    fn lock_of_a_starting_owner_denies() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), registry_with("robeau", silent_port()));

        // Control port not open yet, but the pid in the lock is alive
        alloc.locks().create("robeau").unwrap();
        assert_eq!(alloc.classify(Role::Accepted, "robeau").unwrap(), Role::Denied);
        assert!(alloc.locks().exists("robeau").unwrap());
    }

    #[test]
    fn accepted_acquire_owns_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), ScriptRegistry::default());

        assert_eq!(alloc.acquire(Role::Accepted, "robeau").unwrap().role, Role::Accepted);
        assert_eq!(alloc.locks().holder_pid("robeau").unwrap(), Some(std::process::id()));
        let again = alloc.acquire(Role::Accepted, "robeau").unwrap();
        assert_eq!(again.role, Role::Denied);
        assert_eq!(alloc.list_owner_names().unwrap(), vec!["robeau".to_string()]);
    }

    #[test]
    fn simultaneous_launches_accept_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let launches = 6;
        let barrier = Arc::new(std::sync::Barrier::new(launches));
        let handles: Vec<_> = (0..launches)
            .map(|_| {
                // One allocator per launch, sharing the store and lock dir
                let (alloc, _) = test_allocator(&dir, test_config(3, launches), ScriptRegistry::default());
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    alloc.acquire(Role::Accepted, "robeau").unwrap().role
                })
            })
            .collect();

        let roles: Vec<Role> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(roles.iter().filter(|r| **r == Role::Accepted).count(), 1);
        assert_eq!(roles.iter().filter(|r| **r == Role::Denied).count(), launches - 1);

        let (alloc, _) = test_allocator(&dir, test_config(3, launches), ScriptRegistry::default());
        assert_eq!(alloc.list_owner_names().unwrap(), vec!["robeau".to_string()]);
    }

    #[test]
    fn simultaneous_reclaims_of_a_stale_lock_accept_one() {
        let dir = tempfile::tempdir().unwrap();
        let port = silent_port();
        let (seed, _) = test_allocator(&dir, test_config(3, 4), registry_with("robeau", port));
        plant_stale_lock(seed.locks(), "robeau");

        let barrier = Arc::new(std::sync::Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (alloc, _) = test_allocator(&dir, test_config(3, 4), registry_with("robeau", port));
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    alloc.classify(Role::Accepted, "robeau").unwrap()
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r == Role::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }

    #[test]
    fn stale_lock_denies_when_reclaim_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = TermslotsConfig {
            reclaim_stale_locks: false,
            ..test_config(3, 2)
        };
        let (alloc, _) = test_allocator(&dir, config, registry_with("robeau", silent_port()));

        plant_stale_lock(alloc.locks(), "robeau");
        assert_eq!(alloc.classify(Role::Accepted, "robeau").unwrap(), Role::Denied);
        assert!(alloc.locks().exists("robeau").unwrap());
    }

    #[test]
    fn unregistered_locked_script_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 2), ScriptRegistry::default());
        alloc.locks().create("adhoc").unwrap();
        assert_eq!(alloc.classify(Role::Accepted, "adhoc").unwrap(), Role::Denied);
    }

    #[test]
    fn denied_inventory_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 1), ScriptRegistry::default());
        alloc.acquire(Role::Denied, "x").unwrap();
        assert!(matches!(
            alloc.acquire(Role::Denied, "y"),
            Err(SlotError::NoSlotAvailable {
                inventory: Inventory::Denied
            })
        ));
    }

    #[test]
    fn invalid_names_take_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 1), ScriptRegistry::default());
        assert!(matches!(
            alloc.acquire(Role::Accepted, "../etc"),
            Err(SlotError::InvalidName(_))
        ));
        assert!(alloc.list_owner_names().unwrap().is_empty());
    }

    #[test]
    fn secondary_windows_are_recorded_and_placed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(3, 1), ScriptRegistry::default());
        let slot = alloc.acquire(Role::Accepted, "shopwatcher").unwrap().slot.unwrap();

        let windows = [SecondaryWindow::new("A", 100, 50), SecondaryWindow::new("B", 80, 50)];
        let geoms = alloc.attach_secondary_windows(slot, &windows).unwrap();
        assert!(geoms[0].left < geoms[1].left);
        // Same set again is idempotent
        alloc.attach_secondary_windows(slot, &windows).unwrap();

        let snapshot = alloc.store().snapshot(Inventory::Primary).unwrap();
        let labels: Vec<_> = snapshot[slot].rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["tsl_shopwatcher", "A", "B"]);

        let titles: Vec<_> = adjuster.placed().into_iter().map(|(t, _)| t).collect();
        assert_eq!(&titles[1..3], &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn missing_secondary_window_is_reported_after_trying_all() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(3, 1), ScriptRegistry::default());
        let slot = alloc.acquire(Role::Accepted, "shopwatcher").unwrap().slot.unwrap();
        adjuster.hide("A");

        let windows = [SecondaryWindow::new("A", 100, 50), SecondaryWindow::new("B", 80, 50)];
        let err = alloc.attach_secondary_windows(slot, &windows).unwrap_err();
        assert!(matches!(err, SlotError::WindowNotFound { ref title } if title == "A"));
        assert!(adjuster.placed().iter().any(|(t, _)| t == "B"));
    }

    #[test]
    fn secondary_windows_need_a_claimed_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(3, 1), ScriptRegistry::default());
        let err = alloc
            .attach_secondary_windows(0, &[SecondaryWindow::new("A", 1, 1)])
            .unwrap_err();
        assert!(matches!(err, SlotError::NotClaimed { index: 0, .. }));
    }

    #[test]
    fn release_of_unknown_targets_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(2, 1), ScriptRegistry::default());
        assert_eq!(alloc.release(&ReleaseTarget::Slot(99)).unwrap(), 0);
        assert_eq!(alloc.release(&ReleaseTarget::DeniedSlot(0)).unwrap(), 0);
        assert_eq!(alloc.release(&ReleaseTarget::Owner("nobody".into())).unwrap(), 0);
    }

    #[test]
    fn release_by_owner_leaves_denied_duplicate_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(2, 2), ScriptRegistry::default());
        alloc.acquire(Role::Accepted, "pregamespy").unwrap();
        let duplicate = alloc.acquire(Role::Accepted, "pregamespy").unwrap();
        assert_eq!((duplicate.role, duplicate.slot), (Role::Denied, Some(0)));

        assert_eq!(alloc.release(&ReleaseTarget::Owner("pregamespy".into())).unwrap(), 1);
        assert_eq!(alloc.release(&ReleaseTarget::Owner("pregamespy".into())).unwrap(), 0);

        let denied = alloc.store().snapshot(Inventory::Denied).unwrap();
        assert!(!denied[0].is_free());
        assert_eq!(alloc.acquire(Role::Denied, "other").unwrap().slot, Some(1));
    }

    #[test]
    fn refit_replays_every_recorded_window() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, adjuster) = test_allocator(&dir, test_config(3, 2), ScriptRegistry::default());
        let slot = alloc.acquire(Role::Accepted, "a").unwrap().slot.unwrap();
        alloc
            .attach_secondary_windows(slot, &[SecondaryWindow::new("scan", 100, 50)])
            .unwrap();
        alloc.acquire(Role::Denied, "a").unwrap();
        let before = adjuster.placed().len();

        assert_eq!(alloc.refit_all().unwrap(), 3);
        let replayed: Vec<_> = adjuster.placed()[before..].iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(replayed, vec!["tsl_a", "scan", "tsl_a_denied(0)"]);
    }

    #[test]
    fn force_unlock_refuses_live_owner() {
        let dir = tempfile::tempdir().unwrap();
        let server = ControlServer::start(0, StopSignal::new(), |_| {}).unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(2, 1), registry_with("robeau", server.addr().port()));
        alloc.locks().create("robeau").unwrap();

        assert!(matches!(alloc.force_unlock("robeau"), Err(SlotError::LockHeld { .. })));
        assert!(alloc.locks().exists("robeau").unwrap());
    }

    #[test]
    fn force_unlock_removes_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let (alloc, _) = test_allocator(&dir, test_config(2, 1), registry_with("robeau", silent_port()));
        alloc.locks().create("robeau").unwrap();

        assert!(alloc.force_unlock("robeau").unwrap());
        assert!(!alloc.locks().exists("robeau").unwrap());
        assert!(!alloc.force_unlock("robeau").unwrap());
        assert!(matches!(alloc.force_unlock("nope"), Err(SlotError::UnknownScript(_))));
    }
}
