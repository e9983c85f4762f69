// Pure functions for Hyprland command building (no I/O)

use crate::wm::types::WindowGeometry;

/// Build the dispatch commands that place the window at `address` exactly.
pub fn build_placement_commands(address: &str, geom: &WindowGeometry) -> Vec<String> {
    vec![
        format!("dispatch setfloating address:{}", address),
        format!(
            "dispatch resizewindowpixel exact {} {},address:{}",
            geom.width, geom.height, address
        ),
        format!(
            "dispatch movewindowpixel exact {} {},address:{}",
            geom.left, geom.top, address
        ),
    ]
}

/// Join commands into a single `[[BATCH]]` request.
pub fn build_batch(commands: &[String]) -> String {
    format!("[[BATCH]] {}", commands.join(" ; "))
}

/// Find the address of the client titled exactly `title` in a `j/clients`
/// response.
pub fn find_client_address(clients_json: &str, title: &str) -> Option<String> {
    let clients: serde_json::Value = serde_json::from_str(clients_json).ok()?;
    clients
        .as_array()?
        .iter()
        .find(|client| client["title"].as_str() == Some(title))
        .and_then(|client| client["address"].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENTS: &str = r#"[
        {"address": "0x55d0a1", "title": "tsl_shopwatcher", "class": "kitty"},
        {"address": "0x55d0b2", "title": "tsl_shopwatcher_denied(0)", "class": "kitty"},
        {"address": "0x55d0c3", "title": "firefox", "class": "firefox"}
    ]"#;

    #[test]
    fn placement_commands_embed_address_and_geometry() {
        let geom = WindowGeometry {
            left: 20,
            top: 340,
            width: 480,
            height: 160,
        };
        let cmds = build_placement_commands("0xabc", &geom);
        assert_eq!(cmds.len(), 3);
        for cmd in &cmds {
            assert!(cmd.contains("address:0xabc"), "missing address: {}", cmd);
        }
        assert!(cmds[1].contains("exact 480 160"));
        assert!(cmds[2].contains("exact 20 340"));
    }

    #[test]
    fn batch_joins_with_separator() {
        let batch = build_batch(&["a".to_string(), "b".to_string()]);
        assert_eq!(batch, "[[BATCH]] a ; b");
    }

    #[test]
    fn client_lookup_matches_title_exactly() {
        assert_eq!(
            find_client_address(CLIENTS, "tsl_shopwatcher").as_deref(),
            Some("0x55d0a1")
        );
        assert_eq!(
            find_client_address(CLIENTS, "tsl_shopwatcher_denied(0)").as_deref(),
            Some("0x55d0b2")
        );
        assert_eq!(find_client_address(CLIENTS, "tsl_shop"), None);
    }

    #[test]
    fn client_lookup_tolerates_garbage() {
        assert_eq!(find_client_address("not json", "x"), None);
        assert_eq!(find_client_address("{}", "x"), None);
    }
}
