// Shared window placement types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute screen rectangle for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }
}

impl fmt::Display for WindowGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.left, self.top)
    }
}

/// How a launching process is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The operator server: fixed position, never holds a slot
    Server,
    /// First running instance of a script: holds a primary slot
    Accepted,
    /// Another instance already holds the script's lock: holds a denied slot
    Denied,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Accepted => write!(f, "accepted"),
            Role::Denied => write!(f, "denied"),
        }
    }
}

/// A window a primary script spawns and wants laid out beside itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryWindow {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl SecondaryWindow {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Parse the `NAME:WIDTHxHEIGHT` form used on the command line.
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, size) = spec.rsplit_once(':')?;
        let (width, height) = size.split_once('x')?;
        if name.trim().is_empty() {
            return None;
        }
        Some(Self::new(
            name.trim(),
            width.trim().parse().ok()?,
            height.trim().parse().ok()?,
        ))
    }
}
