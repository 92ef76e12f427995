use crate::binding::{DocumentEvent, TriggerInput};
use crate::geometry::{Rect, Viewport};
use crate::ids::TooltipId;
use crate::machine::Mode;
use crate::placement::PopupStyle;
use serde::{Deserialize, Serialize};

/// Messages from daemon to UI hosts and control clients (JSON-lines over Unix socket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMsg {
    /// A trigger was mounted under this id.
    #[serde(rename = "mounted")]
    Mounted { id: TooltipId },
    /// Mount (`true`) or unmount (`false`) the popup for `id`.
    #[serde(rename = "visibility")]
    Visibility { id: TooltipId, visible: bool },
    /// How to style the mounted popup for `id`.
    #[serde(rename = "placement")]
    Placement { id: TooltipId, style: PopupStyle },
    /// A committed transition (sent to watchers).
    #[serde(rename = "transition")]
    Transition {
        mode: Mode,
        active_id: Option<TooltipId>,
    },
    /// Status response.
    #[serde(rename = "status")]
    Status {
        enabled: bool,
        mode: Mode,
        active_id: Option<TooltipId>,
        instances: usize,
        version: String,
    },
    /// Acknowledgement for commands.
    #[serde(rename = "ack")]
    Ack { ok: bool, message: String },
}

/// Messages from UI hosts and control clients to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Mount a trigger. Without `id` the daemon generates one.
    #[serde(rename = "mount")]
    Mount {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        disabled: bool,
    },
    #[serde(rename = "unmount")]
    Unmount { id: TooltipId },
    /// Raw input on a trigger element.
    #[serde(rename = "input")]
    Input { id: TooltipId, input: TriggerInput },
    /// Raw document-level input.
    #[serde(rename = "document")]
    Document { event: DocumentEvent },
    /// Latest measurements for a trigger and its popup.
    #[serde(rename = "measure")]
    Measure {
        id: TooltipId,
        #[serde(default)]
        trigger: Option<Rect>,
        #[serde(default)]
        popup: Option<Rect>,
        viewport: Viewport,
    },
    /// Dismiss the visible tooltip, as the keyboard would.
    #[serde(rename = "dismiss")]
    Dismiss,
    /// Stream every committed transition to this client.
    #[serde(rename = "watch")]
    Watch,
    #[serde(rename = "toggle")]
    Toggle,
    #[serde(rename = "enable")]
    Enable,
    #[serde(rename = "disable")]
    Disable,
    #[serde(rename = "get_status")]
    GetStatus,
}

/// Serialize a message as a JSON line (with trailing newline).
pub fn encode(msg: &impl Serialize) -> String {
    let mut s = serde_json::to_string(msg).expect("serialize IPC message");
    s.push('\n');
    s
}

/// Deserialize a JSON line. Returns None on empty/whitespace input.
pub fn decode_daemon(line: &str) -> Option<DaemonMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn decode_client(line: &str) -> Option<ClientMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{HoverAction, InputSource, Key, PointerKind};
    use crate::geometry::Position;

    // --- encoded messages end with newline ---

    #[test]
    fn encode_produces_single_trailing_newline() {
        let msg = DaemonMsg::Placement {
            id: TooltipId::from("a"),
            style: PopupStyle::At(Position { left: 1.0, top: 2.0 }),
        };
        let encoded = encode(&msg);
        assert!(encoded.ends_with('\n'));
        assert_eq!(encoded.matches('\n').count(), 1);
    }

    // --- wire shapes hosts depend on ---

    #[test]
    fn decode_host_input_line() {
        let line = r#"{"type":"input","id":"save","input":{"kind":"hover","source":{"family":"pointer","pointer_type":"mouse"},"action":"enter"}}"#;
        match decode_client(line).expect("should decode") {
            ClientMsg::Input { id, input } => {
                assert_eq!(id.as_str(), "save");
                assert_eq!(
                    input,
                    TriggerInput::Hover {
                        source: InputSource::Pointer(PointerKind::Mouse),
                        action: HoverAction::Enter,
                    }
                );
            }
            other => panic!("expected Input, got {:?}", other),
        }
    }

    #[test]
    fn decode_mount_without_id() {
        match decode_client(r#"{"type":"mount"}"#).expect("should decode") {
            ClientMsg::Mount { id, disabled } => {
                assert!(id.is_none());
                assert!(!disabled);
            }
            other => panic!("expected Mount, got {:?}", other),
        }
    }

    #[test]
    fn decode_document_escape() {
        let line = r#"{"type":"document","event":{"kind":"key_down","key":"escape"}}"#;
        match decode_client(line).expect("should decode") {
            ClientMsg::Document { event } => {
                assert_eq!(event, DocumentEvent::KeyDown { key: Key::Escape });
            }
            other => panic!("expected Document, got {:?}", other),
        }
    }

    #[test]
    fn decode_measure_before_popup_is_measured() {
        let line = r#"{"type":"measure","id":"a","trigger":{"left":1,"top":2,"width":3,"height":4},"viewport":{"width":800,"height":600}}"#;
        match decode_client(line).expect("should decode") {
            ClientMsg::Measure {
                trigger,
                popup,
                viewport,
                ..
            } => {
                assert_eq!(trigger, Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
                assert!(popup.is_none());
                assert_eq!(viewport.scroll_y, 0.0);
            }
            other => panic!("expected Measure, got {:?}", other),
        }
    }

    #[test]
    fn hidden_placement_is_tagged() {
        let encoded = encode(&DaemonMsg::Placement {
            id: TooltipId::from("a"),
            style: PopupStyle::Hidden,
        });
        assert!(encoded.contains(r#""style":{"kind":"hidden"}"#));
    }

    #[test]
    fn status_round_trips() {
        let msg = DaemonMsg::Status {
            enabled: true,
            mode: Mode::Visible,
            active_id: Some(TooltipId::from("a")),
            instances: 3,
            version: "0.1.0".into(),
        };
        match decode_daemon(&encode(&msg)).expect("should decode") {
            DaemonMsg::Status {
                mode, instances, active_id, ..
            } => {
                assert_eq!(mode, Mode::Visible);
                assert_eq!(instances, 3);
                assert_eq!(active_id, Some(TooltipId::from("a")));
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[test]
    fn control_variants_decode() {
        for line in [
            r#"{"type":"dismiss"}"#,
            r#"{"type":"watch"}"#,
            r#"{"type":"toggle"}"#,
            r#"{"type":"enable"}"#,
            r#"{"type":"disable"}"#,
            r#"{"type":"get_status"}"#,
        ] {
            assert!(decode_client(line).is_some(), "failed to decode: {}", line);
        }
    }

    // --- empty/whitespace input → None ---

    #[test]
    fn decode_returns_none_for_empty() {
        assert!(decode_daemon("").is_none());
        assert!(decode_client("   ").is_none());
        assert!(decode_client("\n").is_none());
    }

    // --- invalid JSON → None (not panic) ---

    #[test]
    fn decode_returns_none_for_garbage() {
        assert!(decode_daemon("not json").is_none());
        assert!(decode_client("{\"type\":\"unknown_variant\"}").is_none());
    }
}
