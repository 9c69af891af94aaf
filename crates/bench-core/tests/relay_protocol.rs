//! Integration tests for the relay board driver.
//!
//! A `MockRelayBoard` plays the firmware; the tests go through
//! `RelayController` and the TOML-facing configuration types only.

use bench_core::relay::protocol::{OP_ALL_OFF, OP_ALL_ON};
use bench_core::transport::mock::MockRelayBoard;
use bench_core::{RelayConfig, RelayConfigSource, RelayController, RelayError, RelaySelector};

const CONFIG: &str = r#"
default_invert = false

[[channel]]
relay = 1
name = "dut_power"
wiring = "NO"

[[channel]]
relay = 2
name = "scope_power"
wiring = "NC"

[[channel]]
relay = 3
name = "load"
invert = true
"#;

fn config() -> RelayConfig {
    let source: RelayConfigSource = toml::from_str(CONFIG).expect("toml");
    RelayConfig::try_from(source).expect("valid")
}

fn open(num_relays: u8) -> (RelayController<MockRelayBoard>, MockRelayBoard) {
    let board = MockRelayBoard::new(num_relays);
    let controller = RelayController::new(board.clone(), config()).expect("open");
    (controller, board)
}

#[test]
fn test_all_on_reads_back_on_for_every_relay() {
    // Arrange
    let (mut relays, board) = open(4);

    // Act
    relays.set_state(RelaySelector::All, true).expect("set");

    // Assert
    assert_eq!(board.set_payloads(), vec![vec![OP_ALL_ON, 0, 0, 0, 0, 0, 0, 0]]);
    for relay in 1..=4u8 {
        assert!(relays.get_state(relay).expect("get"));
    }
}

#[test]
fn test_all_off_broadcast() {
    let (mut relays, board) = open(4);
    board.set_raw_state(0b1111);

    relays.set_state("all", false).expect("set");

    assert_eq!(board.set_payloads()[0][0], OP_ALL_OFF);
    assert_eq!(board.raw_state(), 0);
}

#[test]
fn test_inverting_alias_written_by_name_reads_off_by_number() {
    // Arrange
    let (mut relays, _board) = open(4);

    // Act
    relays.set_state("load", true).expect("set");

    // Assert
    assert!(!relays.get_state(3u8).expect("get"));
}

#[test]
fn test_toggle_twice_restores_every_relay() {
    let (mut relays, board) = open(8);
    board.set_raw_state(0b1010_0110);

    for relay in 1..=8u8 {
        let before = relays.get_state(relay).expect("get");
        relays.toggle_state(relay).expect("toggle");
        relays.toggle_state(relay).expect("toggle");
        assert_eq!(relays.get_state(relay).expect("get"), before, "relay {relay}");
    }
    assert_eq!(board.raw_state(), 0b1010_0110);
}

#[test]
fn test_connected_state_for_named_channels() {
    // Arrange
    let (mut relays, _board) = open(4);

    // Act
    relays.set_state("dut_power", true).expect("set");
    relays.set_state("scope_power", true).expect("set");

    // Assert
    assert!(relays.is_connected("dut_power").expect("NO"));
    assert!(!relays.is_connected("scope_power").expect("NC"));
}

#[test]
fn test_range_error_message_names_bounds() {
    let (mut relays, board) = open(4);

    let err = relays.set_state(7u8, true).expect_err("out of range");

    assert_eq!(err.to_string(), "Index 7 is outside range [1..4]");
    assert!(board.set_payloads().is_empty());
}

#[test]
fn test_selector_strings_from_the_command_line() {
    let (mut relays, _board) = open(4);

    assert!(relays.get_state("2").is_ok());
    assert!(matches!(
        relays.get_state("heater"),
        Err(RelayError::InvalidSelector(_))
    ));
}

#[test]
fn test_missing_configuration_is_fatal() {
    let source: RelayConfigSource = toml::from_str("default_invert = true").expect("toml");
    assert!(matches!(
        RelayConfig::try_from(source),
        Err(RelayError::ConfigMissing)
    ));
}

#[test]
fn test_drop_closes_board() {
    let (relays, board) = open(4);
    drop(relays);
    assert_eq!(board.close_calls(), 1);
}
