//! Pure functions for window placement
//!
//! No I/O: the layout calculator and Hyprland command building.

pub mod hyprland;
mod layout;

pub use layout::LayoutCalculator;
