// Pure slot layout, deterministic and free of I/O

use crate::config::{LayoutConfig, TermslotsConfig};
use crate::error::{SlotError, SlotResult};
use crate::slots::Inventory;
use crate::wm::types::{Role, SecondaryWindow, WindowGeometry};

/// Maps slot reservations to screen rectangles.
#[derive(Debug, Clone)]
pub struct LayoutCalculator {
    layout: LayoutConfig,
    primary_slots: usize,
    denied_slots: usize,
}

impl LayoutCalculator {
    pub fn new(layout: LayoutConfig, primary_slots: usize, denied_slots: usize) -> Self {
        Self {
            layout,
            primary_slots,
            denied_slots,
        }
    }

    pub fn from_config(cfg: &TermslotsConfig) -> Self {
        Self::new(cfg.layout.clone(), cfg.slot_count, cfg.denied_slot_count)
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    fn check(&self, inventory: Inventory, index: usize) -> SlotResult<()> {
        let size = match inventory {
            Inventory::Primary => self.primary_slots,
            Inventory::Denied => self.denied_slots,
        };
        if index >= size {
            return Err(SlotError::InvalidSlot {
                inventory,
                index,
                size,
            });
        }
        Ok(())
    }

    fn row_top(&self, index: usize) -> i32 {
        let offset = (index as i64).saturating_mul(self.layout.row_height as i64);
        clamp_coord(self.layout.origin_top as i64 + offset)
    }

    /// Geometry of the main window for `role`. `slot_index` is ignored for
    /// the server, which always sits at its configured position.
    pub fn primary_geometry(&self, role: Role, slot_index: usize) -> SlotResult<WindowGeometry> {
        let l = &self.layout;
        match role {
            Role::Server => Ok(l.server),
            Role::Accepted => {
                self.check(Inventory::Primary, slot_index)?;
                Ok(WindowGeometry {
                    left: l.origin_left,
                    top: self.row_top(slot_index),
                    width: l.main_width,
                    height: l.main_height,
                })
            }
            Role::Denied => {
                self.check(Inventory::Denied, slot_index)?;
                Ok(WindowGeometry {
                    left: clamp_coord(
                        l.origin_left as i64 + l.column_width as i64 + l.denied_offset_left as i64,
                    ),
                    top: clamp_coord(self.row_top(slot_index) as i64 + l.denied_offset_top as i64),
                    width: l.main_width,
                    height: l.main_height,
                })
            }
        }
    }

    /// Lay `windows` out left to right in the strip right of the primary
    /// window of `slot_index`, in declaration order.
    ///
    /// If they do not fit in the strip their offsets are compressed so they
    /// overlap while keeping their order. Never fails on overflow.
    pub fn secondary_geometry(
        &self,
        slot_index: usize,
        windows: &[SecondaryWindow],
    ) -> SlotResult<Vec<WindowGeometry>> {
        self.check(Inventory::Primary, slot_index)?;
        let l = &self.layout;
        let strip_left = l.origin_left as i64 + l.main_width as i64;
        let strip_width = l.column_width.saturating_sub(l.main_width) as u64;
        let top = self.row_top(slot_index);

        // Offset of each window from the strip start if laid end to end
        let mut offsets = Vec::with_capacity(windows.len());
        let mut total: u64 = 0;
        for w in windows {
            offsets.push(total);
            total += w.width as u64;
        }

        if total > strip_width && windows.len() > 1 {
            let last_width = windows[windows.len() - 1].width as u64;
            let span = total - last_width;
            let available = strip_width.saturating_sub(last_width);
            for (i, offset) in offsets.iter_mut().enumerate() {
                let scaled = if span == 0 {
                    0
                } else {
                    (*offset as u128 * available as u128 / span as u128) as u64
                };
                *offset = scaled.max(i as u64);
            }
        }

        Ok(windows
            .iter()
            .zip(offsets)
            .map(|(w, offset)| WindowGeometry {
                left: clamp_coord(strip_left.saturating_add_unsigned(offset)),
                top,
                width: w.width,
                height: w.height,
            })
            .collect())
    }
}

/// Screen coordinates past the i32 range are pinned to its ends.
fn clamp_coord(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
