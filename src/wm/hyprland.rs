//! Hyprland integration via the hyprctl IPC socket

use crate::error::{SlotError, SlotResult};
use crate::wm::pure::hyprland::{build_batch, build_placement_commands, find_client_address};
use crate::wm::{WindowAdjuster, WindowGeometry};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

pub struct HyprlandAdjuster {
    socket_path: Option<PathBuf>,
}

impl HyprlandAdjuster {
    pub fn new() -> Self {
        Self {
            socket_path: Self::find_socket(),
        }
    }

    fn find_socket() -> Option<PathBuf> {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR").ok()?;
        let signature = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").ok()?;
        let socket_path = PathBuf::from(&runtime_dir)
            .join("hypr")
            .join(&signature)
            .join(".socket.sock");

        if socket_path.exists() {
            return Some(socket_path);
        }
        // Hyprland before 0.40 kept its sockets under /tmp
        let legacy = PathBuf::from("/tmp/hypr").join(&signature).join(".socket.sock");
        legacy.exists().then_some(legacy)
    }

    fn hyprctl(&self, command: &str) -> SlotResult<String> {
        let socket_path = self
            .socket_path
            .as_ref()
            .ok_or_else(|| SlotError::Backend("Hyprland socket not found".to_string()))?;

        let mut stream = UnixStream::connect(socket_path)
            .map_err(|e| SlotError::Backend(format!("hyprctl connect: {}", e)))?;
        stream.write_all(command.as_bytes())?;
        stream.flush()?;

        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok(response)
    }
}

impl Default for HyprlandAdjuster {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAdjuster for HyprlandAdjuster {
    fn name(&self) -> &'static str {
        "hyprland"
    }

    fn adjust(&self, title: &str, geom: &WindowGeometry) -> SlotResult<()> {
        let clients = self.hyprctl("j/clients")?;
        let address = find_client_address(&clients, title).ok_or_else(|| SlotError::WindowNotFound {
            title: title.to_string(),
        })?;

        let response = self.hyprctl(&build_batch(&build_placement_commands(&address, geom)))?;
        if response.contains("error") || response.contains("Invalid") {
            return Err(SlotError::Backend(format!(
                "hyprctl rejected placement of '{}': {}",
                title,
                response.trim()
            )));
        }

        tracing::debug!("wm::hyprland - Placed '{}' ({}) at {}", title, address, geom);
        Ok(())
    }

    fn is_available() -> bool {
        std::env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() && Self::find_socket().is_some()
    }
}
