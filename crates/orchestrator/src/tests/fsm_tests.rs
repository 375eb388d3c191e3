use super::*;

const TABLE: &str = r#"
[[rule]]
controller_state = 2
device_state = 1
next_device_state = 2
device = 0
invoke = { skill = "Belt1", method = "Start", parameter = "fast" }

[[rule]]
controller_state = 2
device_state = 1
next_device_state = 3

[[rule]]
controller_state = 3
device_state = 2
next_device_state = 4
recipe = "paint"
invoke = { skill = "Gripper", method = "Stop" }
"#;

#[test]
fn empty_table_never_matches() {
    let table = TransitionTable::default();
    let controller = ControllerState::default();
    assert!(table.is_empty());
    for state in 1..=5 {
        assert_eq!(table.evaluate(&controller, DeviceId(0), state), None);
    }
}

#[test]
fn device_filter_and_rule_order() {
    let table = TransitionTable::from_toml_str(TABLE).expect("table");
    assert_eq!(table.rules().len(), 3);

    let mut controller = ControllerState::default();
    assert!(controller.change_control_state(2));

    let device0 = table.evaluate(&controller, DeviceId(0), 1).expect("rule");
    assert_eq!(device0.next_device_state, 2);
    assert_eq!(
        device0.invoke.as_ref().map(InvocationTemplate::to_invocation),
        Some(Invocation::new("Belt1", "Start", "fast"))
    );

    let device1 = table.evaluate(&controller, DeviceId(1), 1).expect("rule");
    assert_eq!(device1.next_device_state, 3);
    assert_eq!(device1.invoke, None);
}

#[test]
fn recipe_rules_need_the_active_recipe() {
    let table = TransitionTable::from_toml_str(TABLE).expect("table");
    let mut controller = ControllerState::default();
    assert!(controller.change_control_state(3));
    assert_eq!(table.evaluate(&controller, DeviceId(0), 2), None);

    assert!(controller.claim_recipe("drill"));
    assert_eq!(table.evaluate(&controller, DeviceId(0), 2), None);

    let mut controller = ControllerState::default();
    controller.change_control_state(3);
    controller.claim_recipe("paint");
    let rule = table.evaluate(&controller, DeviceId(0), 2).expect("rule");
    assert_eq!(rule.invoke.as_ref().map(|i| i.parameter.as_str()), Some(""));
}

#[test]
fn invalid_tables_are_rejected() {
    let out_of_range = "[[rule]]\ncontroller_state = 9\ndevice_state = 1\nnext_device_state = 2\n";
    assert!(matches!(
        TransitionTable::from_toml_str(out_of_range),
        Err(TransitionTableError::ControllerStateOutOfRange { index: 0, state: 9 })
    ));

    let repeating = "[[rule]]\ncontroller_state = 1\ndevice_state = 1\nnext_device_state = 1\ninvoke = { skill = \"Belt1\", method = \"Start\" }\n";
    assert!(matches!(
        TransitionTable::from_toml_str(repeating),
        Err(TransitionTableError::RepeatingInvocation { index: 0, state: 1 })
    ));

    assert!(matches!(
        TransitionTable::from_toml_str("[[rule]]\ncontroller_state = \"two\""),
        Err(TransitionTableError::Parse(_))
    ));
}

#[test]
fn missing_file_reports_its_path() {
    let err = TransitionTable::load("/nonexistent/transitions.toml").expect_err("missing");
    assert!(err.to_string().contains("/nonexistent/transitions.toml"));
}
