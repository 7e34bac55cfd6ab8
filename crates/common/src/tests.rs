#[cfg(test)]
use crate::config::{load_config, SessionConfig};
#[cfg(test)]
use crate::event::{BackendEvent, WireEvent};
#[cfg(test)]
use crate::types::{DeviceId, Resolution, SessionSnapshot, SessionState, StatusReply, StreamHandle};
#[cfg(test)]
use std::io::Write;

#[test]
fn device_id_rejects_empty() {
    assert!(DeviceId::parse("").is_none());
    assert_eq!(DeviceId::parse("camA").unwrap().as_str(), "camA");
}

#[test]
fn stream_handle_validity() {
    assert!(StreamHandle::from_raw(0).is_none());
    assert!(StreamHandle::from_raw(-3).is_none());
    assert_eq!(StreamHandle::from_raw(7).map(|h| h.get()), Some(7));
}

#[test]
fn wire_names_dispatch_to_variants() {
    assert_eq!(
        BackendEvent::from_wire("device_attached", "camA").unwrap(),
        BackendEvent::Attached("camA".into())
    );
    assert_eq!(
        BackendEvent::from_wire("device_ready", "").unwrap(),
        BackendEvent::Ready(String::new())
    );
    assert!(BackendEvent::from_wire("OnEventAttach", "camA").is_err());
    for name in BackendEvent::WIRE_NAMES {
        let event = BackendEvent::from_wire(name, "x").unwrap();
        assert_eq!(event.wire_name(), name);
    }
}

#[test]
fn wire_line_parsing() {
    let event = WireEvent::parse_line(r#"{"event":"device_detached","args":"camA"}"#).unwrap();
    assert_eq!(event, BackendEvent::Detached("camA".into()));
    assert_eq!(event.device().unwrap().as_str(), "camA");

    let no_args = WireEvent::parse_line(r#"{"event":"device_ready"}"#).unwrap();
    assert_eq!(no_args, BackendEvent::Ready(String::new()));
    assert!(no_args.device().is_none());

    assert!(WireEvent::parse_line("not json").is_err());
}

#[test]
fn config_defaults() {
    let cfg = SessionConfig::default();
    assert_eq!(cfg.permission.timeout_ms, 500);
    assert_eq!(cfg.stream.resolution(), Resolution::DEFAULT);
    assert!(cfg.permission.requires_app_permission(28));
    assert!(!cfg.permission.requires_app_permission(27));
    assert!(cfg.permission.has_runtime_permissions(23));
    assert!(!cfg.permission.has_runtime_permissions(22));
}

#[test]
fn config_partial_file_keeps_defaults() {
    let cfg = SessionConfig::from_toml(
        r#"
        [permission]
        timeout_ms = 750

        [stream]
        width = 640
        height = 480
        "#,
    )
    .unwrap();
    assert_eq!(cfg.permission.timeout_ms, 750);
    assert_eq!(cfg.permission.camera_permission_since, 28);
    assert_eq!(cfg.stream.resolution(), Resolution { width: 640, height: 480 });
    assert_eq!(cfg.stream.frame_interval_ms, 16);
    assert_eq!(cfg.backend.callback_target, "uvcd");
}

#[test]
fn load_config_falls_back_on_missing_and_invalid() {
    let missing = std::path::Path::new("/nonexistent/uvcd/config.toml");
    assert_eq!(load_config(missing), SessionConfig::default());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[permission\ntimeout_ms = ").unwrap();
    assert_eq!(load_config(file.path()), SessionConfig::default());

    let mut good = tempfile::NamedTempFile::new().unwrap();
    writeln!(good, "[backend]\nhelper = \"/usr/libexec/uvc-helper\"").unwrap();
    let cfg = load_config(good.path());
    assert_eq!(cfg.backend.helper, std::path::PathBuf::from("/usr/libexec/uvc-helper"));
}

#[test]
fn status_reply_uses_empty_for_none() {
    let idle = StatusReply::from_snapshot(&SessionSnapshot::default(), false);
    assert_eq!(idle.state, "idle");
    assert!(idle.attached_device.is_empty());
    assert_eq!(idle.stream_handle, 0);

    let streaming = SessionSnapshot {
        state: SessionState::Streaming,
        armed: true,
        attached_device: DeviceId::parse("camA"),
        active_device: DeviceId::parse("camA"),
        active_stream_handle: StreamHandle::from_raw(4),
        permission_pending: false,
    };
    let reply = StatusReply::from_snapshot(&streaming, true);
    assert_eq!(reply.state, "streaming");
    assert_eq!(reply.active_device, "camA");
    assert_eq!(reply.stream_handle, 4);
    assert!(reply.device_permitted);
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn event_lines_survive_any_args(
            idx in 0usize..BackendEvent::WIRE_NAMES.len(),
            args in "\\PC*"
        ) {
            let name = BackendEvent::WIRE_NAMES[idx];
            let event = BackendEvent::from_wire(name, &args).unwrap();
            let line = serde_json::to_string(&WireEvent::from(&event)).unwrap();
            let parsed = WireEvent::parse_line(&line).unwrap();
            prop_assert_eq!(parsed.args(), args.as_str());
            prop_assert_eq!(parsed, event);
        }

        #[test]
        fn unknown_names_are_rejected(name in "[A-Z][a-zA-Z]{0,20}") {
            prop_assert!(BackendEvent::from_wire(&name, "camA").is_err());
        }
    }
}
