//! `RelayController`: stateful driver for one relay board.
//!
//! The controller owns its [`FeatureReportDevice`] and a validated
//! [`RelayConfig`].  The relay mask is always read back from the board before
//! it is interpreted; the cached copy in [`last_state`](RelayController::last_state)
//! is informational only.
//!
//! # Logical vs raw state
//!
//! ```text
//! logical = energised XOR invert
//! connected = logical XOR (wiring == NC)
//! ```

use serde::Serialize;
use tracing::{debug, info};

use super::config::{RelayConfig, Wiring};
use super::protocol::{
    relay_count_from_product, RelayCommand, RelayState, RelayStatus, REPORT_LEN,
    STATUS_REPORT_ID,
};
use super::{RelayError, RelaySelector};
use crate::transport::FeatureReportDevice;

/// A selector after name lookup and range checking.
#[derive(Debug, Clone, Copy)]
struct ResolvedRelay {
    relay: u8,
    invert: bool,
    wiring: Option<Wiring>,
}

/// Snapshot of one relay, for status listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReading {
    pub relay: u8,
    pub name: Option<String>,
    pub energized: bool,
    pub state: bool,
    pub wiring: Option<Wiring>,
    pub connected: Option<bool>,
}

/// Driver for a DCT Tech USB-HID relay board.
///
/// Dropping the controller closes the device.
pub struct RelayController<D: FeatureReportDevice> {
    device: Option<D>,
    config: RelayConfig,
    product: String,
    num_relays: u8,
    serial: String,
    state: RelayState,
}

impl<D: FeatureReportDevice> RelayController<D> {
    /// Takes ownership of an opened board and reads its initial status.
    ///
    /// The device is closed again if construction fails.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnsupportedProduct`] when the product string does not
    ///   end in a relay count of 1–8.
    /// - [`RelayError::InvalidConfig`] when the configuration names a relay
    ///   the board does not have.
    /// - Any transport error from the initial refresh.
    pub fn new(mut device: D, config: RelayConfig) -> Result<Self, RelayError> {
        let product = match device.product_name() {
            Ok(product) => product,
            Err(e) => {
                device.close();
                return Err(e.into());
            }
        };
        let Some(num_relays) = relay_count_from_product(&product) else {
            device.close();
            return Err(RelayError::UnsupportedProduct(product));
        };
        if config.max_relay() > num_relays {
            device.close();
            return Err(RelayError::InvalidConfig(format!(
                "relay {} is configured but {product} has {num_relays} relays",
                config.max_relay()
            )));
        }

        let mut controller = Self {
            device: Some(device),
            config,
            product,
            num_relays,
            serial: String::new(),
            state: RelayState::default(),
        };
        controller.refresh()?;
        info!(
            product = %controller.product,
            serial = %controller.serial,
            num_relays,
            "relay board opened"
        );
        Ok(controller)
    }

    fn device(&mut self) -> Result<&mut D, RelayError> {
        self.device.as_mut().ok_or(RelayError::Closed)
    }

    /// Reads the status report and updates the cached serial and mask.
    ///
    /// # Errors
    ///
    /// [`RelayError::ShortReport`] when fewer than 8 bytes arrive, or any
    /// transport error.
    pub fn refresh(&mut self) -> Result<RelayStatus, RelayError> {
        let mut report = [0u8; REPORT_LEN];
        let got = self
            .device()?
            .get_feature_report(STATUS_REPORT_ID, &mut report)?;
        let status = report
            .get(..got.min(REPORT_LEN))
            .and_then(RelayStatus::parse)
            .ok_or(RelayError::ShortReport {
                expected: REPORT_LEN,
                got,
            })?;
        debug!(serial = %status.serial, state = %status.state, "relay status refreshed");
        self.serial.clone_from(&status.serial);
        self.state = status.state;
        Ok(status)
    }

    fn send(&mut self, command: RelayCommand) -> Result<(), RelayError> {
        let payload = command.encode();
        debug!(?command, ?payload, "relay SET_REPORT");
        self.device()?
            .set_feature_report(STATUS_REPORT_ID, &payload)?;
        Ok(())
    }

    fn check_range(&self, relay: i64) -> Result<u8, RelayError> {
        match u8::try_from(relay) {
            Ok(n) if (1..=self.num_relays).contains(&n) => Ok(n),
            _ => Err(RelayError::OutOfRange {
                relay,
                max: self.num_relays,
            }),
        }
    }

    /// Resolves a single-relay selector.  No I/O.
    fn resolve(&self, selector: &RelaySelector) -> Result<ResolvedRelay, RelayError> {
        let default_invert = self.config.default_invert();
        match selector {
            RelaySelector::All => Err(RelayError::InvalidSelector(selector.to_string())),
            RelaySelector::Number(n) => {
                let relay = self.check_range(*n)?;
                Ok(ResolvedRelay {
                    relay,
                    invert: default_invert,
                    wiring: self.config.wiring_of(relay),
                })
            }
            RelaySelector::Alias(name) => {
                let alias = self
                    .config
                    .alias(name)
                    .ok_or_else(|| RelayError::InvalidSelector(name.clone()))?;
                let relay = self.check_range(i64::from(alias.relay))?;
                Ok(ResolvedRelay {
                    relay,
                    invert: alias.invert.unwrap_or(default_invert),
                    wiring: alias.wiring,
                })
            }
        }
    }

    /// Logical state of one relay, read fresh from the board.
    ///
    /// # Errors
    ///
    /// Selector errors are raised before any I/O.
    pub fn get_state(&mut self, selector: impl Into<RelaySelector>) -> Result<bool, RelayError> {
        let resolved = self.resolve(&selector.into())?;
        self.refresh()?;
        Ok(self.state.is_energized(resolved.relay) ^ resolved.invert)
    }

    /// Drives one relay, or every relay with [`RelaySelector::All`], to the
    /// logical state `desired`.
    ///
    /// # Errors
    ///
    /// Selector errors are raised before any I/O.
    pub fn set_state(
        &mut self,
        selector: impl Into<RelaySelector>,
        desired: bool,
    ) -> Result<(), RelayError> {
        let command = match selector.into() {
            RelaySelector::All => RelayCommand::all(desired ^ self.config.default_invert()),
            single => {
                let resolved = self.resolve(&single)?;
                RelayCommand::single(resolved.relay, desired ^ resolved.invert)
            }
        };
        self.send(command)
    }

    /// Inverts the logical state of one relay.  With
    /// [`RelaySelector::All`], every relay is toggled individually.
    pub fn toggle_state(&mut self, selector: impl Into<RelaySelector>) -> Result<(), RelayError> {
        match selector.into() {
            RelaySelector::All => {
                for relay in 1..=self.num_relays {
                    let current = self.get_state(relay)?;
                    self.set_state(relay, !current)?;
                }
                Ok(())
            }
            single => {
                // Resolve first so a bad selector never reaches the device.
                self.resolve(&single)?;
                let current = self.get_state(single.clone())?;
                self.set_state(single, !current)
            }
        }
    }

    /// Whether the load circuit behind a relay is currently closed.
    ///
    /// # Errors
    ///
    /// [`RelayError::WiringUnknown`] when the relay has no NO/NC
    /// classification.  Selector errors are raised before any I/O.
    pub fn is_connected(&mut self, selector: impl Into<RelaySelector>) -> Result<bool, RelayError> {
        let resolved = self.resolve(&selector.into())?;
        let wiring = resolved
            .wiring
            .ok_or(RelayError::WiringUnknown(resolved.relay))?;
        self.refresh()?;
        let logical = self.state.is_energized(resolved.relay) ^ resolved.invert;
        Ok(logical ^ (wiring == Wiring::NormallyClosed))
    }

    /// Writes a new serial number (first 5 bytes) and reads it back.
    pub fn set_serial(&mut self, serial: &str) -> Result<RelayStatus, RelayError> {
        self.send(RelayCommand::SetSerial(serial.as_bytes().to_vec()))?;
        let status = self.refresh()?;
        info!(serial = %status.serial, "relay board serial updated");
        Ok(status)
    }

    /// Sets every relay to logical OFF, one command per relay.
    pub fn open_all(&mut self) -> Result<(), RelayError> {
        for relay in 1..=self.num_relays {
            self.set_state(relay, false)?;
        }
        Ok(())
    }

    /// Sets every relay to logical ON, one command per relay.
    pub fn close_all(&mut self) -> Result<(), RelayError> {
        for relay in 1..=self.num_relays {
            self.set_state(relay, true)?;
        }
        Ok(())
    }

    /// Reads the board once and reports every relay.
    ///
    /// Named channels are interpreted with their own invert flag.
    pub fn readings(&mut self) -> Result<Vec<RelayReading>, RelayError> {
        self.refresh()?;
        let default_invert = self.config.default_invert();
        let readings = (1..=self.num_relays)
            .map(|relay| {
                let channel = self.config.channel(relay);
                let invert = channel
                    .and_then(|c| c.invert)
                    .unwrap_or(default_invert);
                let energized = self.state.is_energized(relay);
                let state = energized ^ invert;
                let wiring = channel.and_then(|c| c.wiring);
                RelayReading {
                    relay,
                    name: channel.and_then(|c| c.name.clone()),
                    energized,
                    state,
                    wiring,
                    connected: wiring.map(|w| state ^ (w == Wiring::NormallyClosed)),
                }
            })
            .collect();
        Ok(readings)
    }

    pub fn relay_for_alias(&self, name: &str) -> Option<u8> {
        self.config.alias(name).map(|alias| alias.relay)
    }

    pub fn alias_for_relay(&self, relay: u8) -> Option<&str> {
        self.config.name_of(relay)
    }

    /// Serial number from the most recent refresh.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Raw mask from the most recent refresh.
    pub fn last_state(&self) -> RelayState {
        self.state
    }

    pub fn num_relays(&self) -> u8 {
        self.num_relays
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Closes the device.  Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            info!(serial = %self.serial, "relay board closed");
        }
    }
}

impl<D: FeatureReportDevice> Drop for RelayController<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::config::RelayChannel;
    use crate::transport::mock::MockRelayBoard;
    use crate::transport::{MockFeatureReportDevice, TransportError};

    fn named(relay: u8, name: &str, invert: Option<bool>, wiring: Option<Wiring>) -> RelayChannel {
        RelayChannel {
            relay,
            name: Some(name.to_string()),
            invert,
            wiring,
        }
    }

    fn bench_config() -> RelayConfig {
        RelayConfig::from_channels(
            false,
            [
                named(1, "dut_power", None, Some(Wiring::NormallyOpen)),
                named(2, "bypass", None, Some(Wiring::NormallyClosed)),
                named(3, "load", Some(true), None),
            ],
        )
        .expect("valid config")
    }

    fn open_board(num_relays: u8) -> (RelayController<MockRelayBoard>, MockRelayBoard) {
        let board = MockRelayBoard::new(num_relays);
        let controller = RelayController::new(board.clone(), bench_config()).expect("open");
        (controller, board)
    }

    #[test]
    fn test_new_reads_product_and_initial_status() {
        // Arrange
        let board = MockRelayBoard::new(4).with_serial_bytes(*b"AB\0\0\0");
        board.set_raw_state(0b0101);

        // Act
        let controller = RelayController::new(board.clone(), bench_config()).expect("open");

        // Assert
        assert_eq!(controller.num_relays(), 4);
        assert_eq!(controller.serial(), "AB");
        assert_eq!(controller.last_state(), RelayState(0b0101));
        assert_eq!(board.get_calls(), 1);
    }

    #[test]
    fn test_new_rejects_unknown_product_and_closes_device() {
        let board = MockRelayBoard::new(4).with_product("HIDRelay");
        let result = RelayController::new(board.clone(), bench_config());
        assert!(matches!(result, Err(RelayError::UnsupportedProduct(_))));
        assert_eq!(board.close_calls(), 1);
    }

    #[test]
    fn test_new_rejects_config_beyond_board() {
        let board = MockRelayBoard::new(2);
        let result = RelayController::new(board.clone(), bench_config());
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
        assert_eq!(board.close_calls(), 1);
    }

    #[test]
    fn test_set_all_on_then_every_relay_reads_on() {
        // Arrange
        let (mut controller, _board) = open_board(8);

        // Act
        controller.set_state("all", true).expect("set");

        // Assert
        for relay in 1..=8u8 {
            assert!(controller.get_state(relay).expect("get"), "relay {relay}");
        }
    }

    #[test]
    fn test_double_toggle_restores_state() {
        for relay in 1..=4u8 {
            // Arrange
            let (mut controller, _board) = open_board(4);
            let before = controller.get_state(relay).expect("get");

            // Act
            controller.toggle_state(relay).expect("toggle");
            let middle = controller.get_state(relay).expect("get");
            controller.toggle_state(relay).expect("toggle");

            // Assert
            assert_eq!(middle, !before);
            assert_eq!(controller.get_state(relay).expect("get"), before);
        }
    }

    #[test]
    fn test_alias_invert_applies_when_addressed_by_name() {
        // Arrange: "load" is relay 3 with invert = true
        let (mut controller, board) = open_board(4);

        // Act
        controller.set_state("load", true).expect("set");

        // Assert: logical ON through an inverting alias releases the coil
        assert_eq!(board.set_payloads(), vec![vec![0xFD, 3, 0, 0, 0, 0, 0, 0]]);
        assert!(!controller.get_state(3u8).expect("get"));
        assert!(controller.get_state("load").expect("get"));
    }

    #[test]
    fn test_padded_config_name_is_selectable() {
        // Arrange
        let board = MockRelayBoard::new(2);
        let config =
            RelayConfig::from_channels(false, [named(2, " fan ", None, None)]).expect("valid");
        let mut controller = RelayController::new(board.clone(), config).expect("open");

        // Act
        controller.set_state(" fan", true).expect("set");

        // Assert
        assert_eq!(board.set_payloads(), vec![vec![0xFF, 2, 0, 0, 0, 0, 0, 0]]);
        assert!(controller.get_state("fan").expect("get"));
    }

    #[test]
    fn test_set_single_relay_payload() {
        let (mut controller, board) = open_board(8);
        controller.set_state(5u8, true).expect("set");
        controller.set_state(5u8, false).expect("set");
        assert_eq!(
            board.set_payloads(),
            vec![
                vec![0xFF, 5, 0, 0, 0, 0, 0, 0],
                vec![0xFD, 5, 0, 0, 0, 0, 0, 0]
            ]
        );
    }

    #[test]
    fn test_out_of_range_selector_performs_no_io() {
        // Arrange: the construction-time refresh is the only transfer allowed
        let mut device = MockFeatureReportDevice::new();
        device
            .expect_product_name()
            .returning(|| Ok("USBRelay4".to_string()));
        device
            .expect_get_feature_report()
            .times(1)
            .returning(|_, buf| {
                buf.fill(0);
                Ok(REPORT_LEN)
            });
        device.expect_set_feature_report().times(0);
        device.expect_close().times(1).return_const(());
        let mut controller = RelayController::new(device, bench_config()).expect("open");

        // Act
        let get = controller.get_state(5u8);
        let set = controller.set_state(5u8, true);
        let zero = controller.get_state("0");

        // Assert
        assert!(matches!(get, Err(RelayError::OutOfRange { relay: 5, max: 4 })));
        assert!(matches!(set, Err(RelayError::OutOfRange { relay: 5, max: 4 })));
        assert!(matches!(zero, Err(RelayError::OutOfRange { relay: 0, .. })));
    }

    #[test]
    fn test_unknown_alias_is_invalid_selector() {
        let (mut controller, board) = open_board(4);
        let result = controller.set_state("fan", true);
        assert!(
            matches!(result, Err(RelayError::InvalidSelector(ref name)) if name == "fan")
        );
        assert!(board.set_payloads().is_empty());
    }

    #[test]
    fn test_get_state_all_is_invalid_selector() {
        let (mut controller, _board) = open_board(4);
        assert!(matches!(
            controller.get_state("all"),
            Err(RelayError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_toggle_all_issues_one_command_per_relay() {
        // Arrange
        let (mut controller, board) = open_board(4);
        board.set_raw_state(0b0011);

        // Act
        controller.toggle_state("all").expect("toggle");

        // Assert
        assert_eq!(board.set_payloads().len(), 4);
        assert_eq!(board.raw_state(), 0b1100);
    }

    #[test]
    fn test_is_connected_follows_wiring() {
        // Arrange
        let (mut controller, board) = open_board(4);

        // Act / Assert: everything released
        assert!(!controller.is_connected("dut_power").expect("NO released"));
        assert!(controller.is_connected("bypass").expect("NC released"));

        board.set_raw_state(0b0011);
        assert!(controller.is_connected(1u8).expect("NO energised"));
        assert!(!controller.is_connected(2u8).expect("NC energised"));
    }

    #[test]
    fn test_is_connected_without_wiring_fails() {
        let (mut controller, _board) = open_board(4);
        assert!(matches!(
            controller.is_connected("load"),
            Err(RelayError::WiringUnknown(3))
        ));
        assert!(matches!(
            controller.is_connected(4u8),
            Err(RelayError::WiringUnknown(4))
        ));
    }

    #[test]
    fn test_open_all_and_close_all_address_relays_individually() {
        let (mut controller, board) = open_board(3);
        controller.close_all().expect("close all");
        assert_eq!(board.raw_state(), 0b111);
        controller.open_all().expect("open all");
        assert_eq!(board.raw_state(), 0);
        assert!(board
            .set_payloads()
            .iter()
            .all(|p| p[0] == 0xFF || p[0] == 0xFD));
    }

    #[test]
    fn test_set_serial_round_trips_through_board() {
        let (mut controller, board) = open_board(4);
        let status = controller.set_serial("QA123").expect("set serial");
        assert_eq!(status.serial, "QA123");
        assert_eq!(controller.serial(), "QA123");
        assert_eq!(board.set_payloads()[0][0], 0xFA);
    }

    #[test]
    fn test_alias_lookups() {
        let (controller, _board) = open_board(4);
        assert_eq!(controller.relay_for_alias("bypass"), Some(2));
        assert_eq!(controller.relay_for_alias("fan"), None);
        assert_eq!(controller.alias_for_relay(1), Some("dut_power"));
        assert_eq!(controller.alias_for_relay(4), None);
    }

    #[test]
    fn test_readings_report_every_relay() {
        // Arrange
        let (mut controller, board) = open_board(4);
        board.set_raw_state(0b0001);

        // Act
        let readings = controller.readings().expect("readings");

        // Assert
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[0].connected, Some(true));
        assert_eq!(readings[1].connected, Some(true));
        assert!(readings[2].state, "inverted relay 3 reads ON when released");
        assert_eq!(readings[3].name, None);
    }

    #[test]
    fn test_short_report_is_an_error() {
        // Arrange
        let mut device = MockFeatureReportDevice::new();
        device
            .expect_product_name()
            .returning(|| Ok("USBRelay2".to_string()));
        device
            .expect_get_feature_report()
            .returning(|_, _| Ok(4));
        device.expect_close().times(1).return_const(());

        // Act
        let config = RelayConfig::from_channels(false, [named(1, "a", None, None)]).expect("cfg");
        let result = RelayController::new(device, config);

        // Assert
        assert!(matches!(
            result,
            Err(RelayError::ShortReport { expected: 8, got: 4 })
        ));
    }

    #[test]
    fn test_transport_failure_propagates() {
        let (mut controller, board) = open_board(4);
        board.fail_transfers(true);
        assert!(matches!(
            controller.get_state(1u8),
            Err(RelayError::Transport(TransportError::Transfer(_)))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        // Arrange
        let (mut controller, board) = open_board(4);

        // Act
        controller.close();
        controller.close();
        let result = controller.set_state(1u8, true);
        drop(controller);

        // Assert
        assert!(matches!(result, Err(RelayError::Closed)));
        assert_eq!(board.close_calls(), 1);
    }
}
