//! SQLite-backed slot store

use crate::error::{SlotError, SlotResult};
use crate::slots::types::{Inventory, OccupantRow, Slot, SlotState};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SlotStore {
    conn: Connection,
    path: PathBuf,
    primary_size: usize,
    denied_size: usize,
}

impl SlotStore {
    /// Open (creating if needed) the store at `path` and make sure every slot
    /// of both inventories has a row.
    ///
    /// `busy_timeout` bounds how long any operation waits for another process
    /// holding the write lock before failing with `StoreUnavailable`.
    pub fn open(
        path: &Path,
        primary_size: usize,
        denied_size: usize,
        busy_timeout: Duration,
    ) -> SlotResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            SlotError::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        conn.busy_timeout(busy_timeout)?;

        let mut store = Self {
            conn,
            path: path.to_path_buf(),
            primary_size,
            denied_size,
        };
        store.init_schema()?;
        tracing::debug!(
            "Slot store ready at {} ({} primary, {} denied)",
            path.display(),
            primary_size,
            denied_size
        );
        Ok(store)
    }

    fn init_schema(&mut self) -> SlotResult<()> {
        let sizes = [
            (Inventory::Primary, self.primary_size),
            (Inventory::Denied, self.denied_size),
        ];
        self.with_tx(|tx| {
            for (inventory, size) in sizes {
                let table = inventory.table();
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id         INTEGER PRIMARY KEY,
                        state      TEXT NOT NULL DEFAULT 'free',
                        owner_name TEXT,
                        rows       TEXT NOT NULL DEFAULT '[]'
                    );"
                ))?;
                let mut insert =
                    tx.prepare(&format!("INSERT OR IGNORE INTO {table} (id) VALUES (?1)"))?;
                for id in 0..size {
                    insert.execute([id as i64])?;
                }
            }
            Ok(())
        })
    }

    /// Run `f` inside an IMMEDIATE transaction: the write lock is taken up
    /// front, so the read and the write in `f` cannot interleave with another
    /// process. Any error rolls back.
    fn with_tx<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> SlotResult<T>) -> SlotResult<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` while holding the store's write lock. Every process sharing
    /// the store runs such sections one at a time.
    pub fn serialized<T>(&mut self, f: impl FnOnce() -> SlotResult<T>) -> SlotResult<T> {
        self.with_tx(|_| f())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inventory_size(&self, inventory: Inventory) -> usize {
        match inventory {
            Inventory::Primary => self.primary_size,
            Inventory::Denied => self.denied_size,
        }
    }

    fn check_index(&self, inventory: Inventory, index: usize) -> SlotResult<()> {
        let size = self.inventory_size(inventory);
        if index >= size {
            return Err(SlotError::InvalidSlot {
                inventory,
                index,
                size,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Claim the lowest free primary slot for `owner`, recording `primary_row`
    /// as its first occupant row. `None` when the inventory is exhausted.
    pub fn claim_first_free(
        &mut self,
        owner: &str,
        primary_row: &OccupantRow,
    ) -> SlotResult<Option<usize>> {
        self.claim_in(Inventory::Primary, owner, primary_row)
    }

    pub fn claim_first_free_denied(
        &mut self,
        owner: &str,
        primary_row: &OccupantRow,
    ) -> SlotResult<Option<usize>> {
        self.claim_in(Inventory::Denied, owner, primary_row)
    }

    fn claim_in(
        &mut self,
        inventory: Inventory,
        owner: &str,
        primary_row: &OccupantRow,
    ) -> SlotResult<Option<usize>> {
        let table = inventory.table();
        let size = self.inventory_size(inventory) as i64;
        let state = inventory.occupied_state();
        let rows = serde_json::to_string(&[primary_row])?;

        let claimed = self.with_tx(|tx| {
            let index: Option<i64> = tx
                .query_row(
                    &format!(
                        "SELECT id FROM {table} WHERE state = 'free' AND id < ?1 ORDER BY id LIMIT 1"
                    ),
                    [size],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(index) = index else {
                return Ok(None);
            };
            tx.execute(
                &format!("UPDATE {table} SET state = ?1, owner_name = ?2, rows = ?3 WHERE id = ?4"),
                params![state.as_str(), owner, rows, index],
            )?;
            Ok(Some(index as usize))
        })?;

        match claimed {
            Some(index) => tracing::info!("{} claimed {} slot {}", owner, inventory, index),
            None => tracing::warn!("{} found no free {} slot", owner, inventory),
        }
        Ok(claimed)
    }

    // -----------------------------------------------------------------------
    // Occupant rows
    // -----------------------------------------------------------------------

    /// Keep rows `[0, start_row)` of a claimed primary slot and replace the
    /// rest with `rows`. The primary row survives an empty `rows`.
    pub fn occupy_with_rows(
        &mut self,
        index: usize,
        rows: &[OccupantRow],
        start_row: usize,
    ) -> SlotResult<()> {
        self.occupy_rows_in(Inventory::Primary, index, rows, start_row)
    }

    fn occupy_rows_in(
        &mut self,
        inventory: Inventory,
        index: usize,
        rows: &[OccupantRow],
        start_row: usize,
    ) -> SlotResult<()> {
        self.check_index(inventory, index)?;
        let table = inventory.table();

        self.with_tx(|tx| {
            let (state, raw): (String, String) = tx.query_row(
                &format!("SELECT state, rows FROM {table} WHERE id = ?1"),
                [index as i64],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            if SlotState::parse(&state).unwrap_or(SlotState::Free) == SlotState::Free {
                return Err(SlotError::NotClaimed { inventory, index });
            }

            let mut current: Vec<OccupantRow> = serde_json::from_str(&raw)?;
            let keep = if rows.is_empty() {
                start_row.max(1)
            } else {
                start_row
            };
            current.truncate(keep);
            current.extend_from_slice(rows);

            tx.execute(
                &format!("UPDATE {table} SET rows = ?1 WHERE id = ?2"),
                params![serde_json::to_string(&current)?, index as i64],
            )?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Releases
    // -----------------------------------------------------------------------

    /// Reset a primary slot to free. Returns whether it was occupied; releasing
    /// a free slot is a no-op.
    pub fn release(&mut self, index: usize) -> SlotResult<bool> {
        self.release_in(Inventory::Primary, index)
    }

    pub fn release_denied(&mut self, index: usize) -> SlotResult<bool> {
        self.release_in(Inventory::Denied, index)
    }

    fn release_in(&mut self, inventory: Inventory, index: usize) -> SlotResult<bool> {
        self.check_index(inventory, index)?;
        let table = inventory.table();
        let changed = self.with_tx(|tx| {
            Ok(tx.execute(
                &format!(
                    "UPDATE {table} SET state = 'free', owner_name = NULL, rows = '[]'
                     WHERE id = ?1 AND state != 'free'"
                ),
                [index as i64],
            )?)
        })?;
        if changed > 0 {
            tracing::info!("Released {} slot {}", inventory, index);
        }
        Ok(changed > 0)
    }

    /// Release every primary slot owned by `name`. Returns how many were
    /// released; an unknown name releases nothing.
    ///
    /// Denied slots are left alone: a denied duplicate of `name` may still be
    /// running and releases its own slot by index.
    pub fn release_by_owner_name(&mut self, name: &str) -> SlotResult<usize> {
        let released = self.with_tx(|tx| {
            Ok(tx.execute(
                "UPDATE slots SET state = 'free', owner_name = NULL, rows = '[]'
                 WHERE owner_name = ?1 AND state != 'free'",
                [name],
            )?)
        })?;
        tracing::info!("Released {} slot(s) owned by {}", released, name);
        Ok(released)
    }

    pub fn free_all(&mut self) -> SlotResult<usize> {
        self.free_all_in(Inventory::Primary)
    }

    pub fn free_all_denied(&mut self) -> SlotResult<usize> {
        self.free_all_in(Inventory::Denied)
    }

    fn free_all_in(&mut self, inventory: Inventory) -> SlotResult<usize> {
        let table = inventory.table();
        let freed = self.with_tx(|tx| {
            Ok(tx.execute(
                &format!(
                    "UPDATE {table} SET state = 'free', owner_name = NULL, rows = '[]'
                     WHERE state != 'free'"
                ),
                [],
            )?)
        })?;
        tracing::warn!("Freed all {} slots ({} were occupied)", inventory, freed);
        Ok(freed)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Owners of the occupied primary slots, in slot order.
    pub fn list_owner_names(&self) -> SlotResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_name FROM slots
             WHERE state != 'free' AND owner_name IS NOT NULL AND id < ?1
             ORDER BY id",
        )?;
        let names = stmt
            .query_map([self.primary_size as i64], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Every slot of one inventory, in index order.
    pub fn snapshot(&self, inventory: Inventory) -> SlotResult<Vec<Slot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, state, owner_name, rows FROM {} WHERE id < ?1 ORDER BY id",
            inventory.table()
        ))?;
        let raw = stmt
            .query_map([self.inventory_size(inventory) as i64], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, state, owner_name, rows)| {
                let state = SlotState::parse(&state).ok_or_else(|| {
                    SlotError::StoreUnavailable(format!("unknown slot state '{}'", state))
                })?;
                Ok(Slot {
                    index: id as usize,
                    state,
                    owner_name,
                    rows: serde_json::from_str(&rows)?,
                })
            })
            .collect()
    }
}
