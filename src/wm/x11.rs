//! X11 integration via x11rb
//!
//! Windows are found through the EWMH `_NET_CLIENT_LIST` on the root window
//! and matched on `_NET_WM_NAME`, falling back to ICCCM `WM_NAME` for
//! clients that only set the legacy title.

use crate::error::{SlotError, SlotResult};
use crate::wm::{WindowAdjuster, WindowGeometry};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConfigureWindowAux, ConnectionExt as _, Window};
use x11rb::rust_connection::RustConnection;

fn backend_err(context: &str, e: impl std::fmt::Display) -> SlotError {
    SlotError::Backend(format!("x11 {}: {}", context, e))
}

struct Atoms {
    client_list: Atom,
    wm_name: Atom,
    utf8_string: Atom,
}

impl Atoms {
    fn intern(conn: &RustConnection) -> SlotResult<Self> {
        let intern = |name: &[u8]| -> SlotResult<Atom> {
            Ok(conn
                .intern_atom(false, name)
                .map_err(|e| backend_err("intern_atom", e))?
                .reply()
                .map_err(|e| backend_err("intern_atom", e))?
                .atom)
        };
        Ok(Self {
            client_list: intern(b"_NET_CLIENT_LIST")?,
            wm_name: intern(b"_NET_WM_NAME")?,
            utf8_string: intern(b"UTF8_STRING")?,
        })
    }
}

pub struct X11Adjuster {
    display: Option<String>,
}

impl X11Adjuster {
    pub fn new() -> Self {
        Self {
            display: std::env::var("DISPLAY").ok(),
        }
    }

    fn connect(&self) -> SlotResult<(RustConnection, Window)> {
        let (conn, screen_num) =
            x11rb::connect(self.display.as_deref()).map_err(|e| backend_err("connect", e))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| backend_err("connect", format!("no screen {}", screen_num)))?;
        Ok((conn, root))
    }

    fn client_list(conn: &RustConnection, root: Window, atoms: &Atoms) -> SlotResult<Vec<Window>> {
        let reply = conn
            .get_property(false, root, atoms.client_list, AtomEnum::WINDOW, 0, u32::MAX)
            .map_err(|e| backend_err("get_property", e))?
            .reply()
            .map_err(|e| backend_err("get_property", e))?;
        Ok(reply
            .value32()
            .map(|windows| windows.collect())
            .unwrap_or_default())
    }

    fn window_title(conn: &RustConnection, window: Window, atoms: &Atoms) -> Option<String> {
        let read = |property: Atom, kind: Atom| -> Option<String> {
            let reply = conn
                .get_property(false, window, property, kind, 0, 1024)
                .ok()?
                .reply()
                .ok()?;
            if reply.value.is_empty() {
                return None;
            }
            Some(String::from_utf8_lossy(&reply.value).into_owned())
        };
        read(atoms.wm_name, atoms.utf8_string)
            .or_else(|| read(AtomEnum::WM_NAME.into(), AtomEnum::STRING.into()))
    }

    fn find_window(conn: &RustConnection, root: Window, title: &str) -> SlotResult<Option<Window>> {
        let atoms = Atoms::intern(conn)?;
        Ok(Self::client_list(conn, root, &atoms)?
            .into_iter()
            .find(|&window| Self::window_title(conn, window, &atoms).as_deref() == Some(title)))
    }
}

impl Default for X11Adjuster {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAdjuster for X11Adjuster {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn adjust(&self, title: &str, geom: &WindowGeometry) -> SlotResult<()> {
        let (conn, root) = self.connect()?;
        let window = Self::find_window(&conn, root, title)?.ok_or_else(|| {
            SlotError::WindowNotFound {
                title: title.to_string(),
            }
        })?;

        let aux = ConfigureWindowAux::new()
            .x(geom.left)
            .y(geom.top)
            .width(geom.width)
            .height(geom.height);
        conn.configure_window(window, &aux)
            .map_err(|e| backend_err("configure_window", e))?;
        conn.flush().map_err(|e| backend_err("flush", e))?;

        tracing::debug!("wm::x11 - Placed '{}' (0x{:x}) at {}", title, window, geom);
        Ok(())
    }

    fn is_available() -> bool {
        x11rb::connect(None).is_ok()
    }
}
