//! Headless mode - no window placement.
//! Used when no supported display server is reachable, e.g. over SSH or in CI.

use crate::error::SlotResult;
use crate::wm::{WindowAdjuster, WindowGeometry};

pub struct HeadlessAdjuster;

impl HeadlessAdjuster {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeadlessAdjuster {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAdjuster for HeadlessAdjuster {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn adjust(&self, title: &str, geom: &WindowGeometry) -> SlotResult<()> {
        tracing::debug!("wm::headless - Would place '{}' at {}", title, geom);
        Ok(())
    }
}
