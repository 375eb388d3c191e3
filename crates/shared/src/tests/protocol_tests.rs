use super::*;

#[test]
fn parses_every_inbound_tag() {
    assert_eq!(
        InboundFrame::parse("Belt1;INIT").expect("init"),
        InboundFrame::Init {
            skill: "Belt1".into()
        }
    );
    assert_eq!(
        InboundFrame::parse("Belt1;UPDATE;Executing;moving\r\n").expect("update"),
        InboundFrame::Update {
            skill: "Belt1".into(),
            state: "Executing".into(),
            info: "moving".into(),
        }
    );
    assert_eq!(
        InboundFrame::parse("Gripper;CALLRET;SUSPEND;FAILED").expect("callret"),
        InboundFrame::CallReturn {
            skill: "Gripper".into(),
            verb: Verb::Suspend,
            result: CallResult::Failed,
        }
    );
}

#[test]
fn update_keeps_empty_info_field() {
    let frame = InboundFrame::parse("Belt1;UPDATE;Ready;").expect("update");
    assert_eq!(
        frame,
        InboundFrame::Update {
            skill: "Belt1".into(),
            state: "Ready".into(),
            info: String::new(),
        }
    );
}

#[test]
fn rejects_wrong_field_counts() {
    assert!(matches!(
        InboundFrame::parse("Belt1;UPDATE;Ready"),
        Err(ProtocolError::FieldCount {
            expected: 4,
            actual: 3,
            ..
        })
    ));
    assert!(matches!(
        InboundFrame::parse("Belt1;INIT;extra"),
        Err(ProtocolError::FieldCount { expected: 2, .. })
    ));
    assert!(matches!(
        InboundFrame::parse("Belt1"),
        Err(ProtocolError::FieldCount { expected: 2, actual: 1, .. })
    ));
    assert_eq!(InboundFrame::parse("   "), Err(ProtocolError::Empty));
}

#[test]
fn rejects_unknown_tags_verbs_and_results() {
    assert!(matches!(
        InboundFrame::parse("Belt1;HELLO;x"),
        Err(ProtocolError::UnknownTag { ref tag, .. }) if tag == "HELLO"
    ));
    assert_eq!(
        InboundFrame::parse("Belt1;CALLRET;JUMP;OK"),
        Err(ProtocolError::UnknownVerb("JUMP".into()))
    );
    assert_eq!(
        InboundFrame::parse("Belt1;CALLRET;START;MAYBE"),
        Err(ProtocolError::UnknownResult("MAYBE".into()))
    );
}

#[test]
fn outbound_frames_encode_wire_layout() {
    let call = OutboundFrame::Call {
        skill: "Belt1".into(),
        verb: Verb::Start,
        parameter: "5".into(),
    };
    assert_eq!(call.to_line(), "Belt1;CALL;START;5");
    assert_eq!(OutboundFrame::parse(&call.to_line()).expect("parse"), call);

    let ret = OutboundFrame::Ret {
        skill: "Belt1".into(),
        result: CallResult::Ok,
    };
    assert_eq!(ret.to_line(), "Belt1;RET;OK");
}

#[test]
fn validate_field_rejects_separators() {
    assert!(validate_field("5").is_ok());
    assert!(validate_field("").is_ok());
    assert_eq!(
        validate_field("a;b"),
        Err(ProtocolError::InvalidField("a;b".into()))
    );
    assert!(validate_field("a\nb").is_err());
}

#[test]
fn notifications_render_as_event_text() {
    assert_eq!(
        Notification::StateChange {
            skill: "Belt1".into(),
            state: "Ready".into()
        }
        .to_string(),
        "StateChange;Belt1;Ready"
    );
    assert_eq!(
        Notification::CallReturn {
            skill: "Belt1".into(),
            verb: Verb::Reset,
            result: CallResult::Ok,
        }
        .to_string(),
        "CallReturn;Belt1;RESET;OK"
    );
    assert_eq!(
        Notification::ServerMessage("Skillbridge connected".into()).to_string(),
        "ServerMessage;Skillbridge connected"
    );
}

#[test]
fn device_event_serializes_with_message_text() {
    let event = DeviceEvent {
        device: "conveyor".into(),
        event_id: 3,
        emitted_at: chrono::Utc::now(),
        message: "StateChange;Belt1;Ready".into(),
    };
    let json = serde_json::to_value(&event).expect("json");
    assert_eq!(json["device"], "conveyor");
    assert_eq!(json["event_id"], 3);
    assert_eq!(json["message"], "StateChange;Belt1;Ready");
}
