//! RelayControlUseCase: one relay command from the command line, start to
//! finish.
//!
//! The use case works on any [`FeatureReportDevice`], so the same code path
//! runs against the real board and against `MockRelayBoard` in tests.

use bench_core::relay::{RelayController, RelayError, RelayReading, RelaySelector, RelayStatus};
use bench_core::transport::FeatureReportDevice;
use serde::Serialize;
use tracing::info;

/// A relay command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    Status,
    Get(RelaySelector),
    Set(RelaySelector, bool),
    Toggle(RelaySelector),
    Connected(RelaySelector),
    OpenAll,
    CloseAll,
    SetSerial(String),
}

/// What a relay command produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayOutcome {
    Status {
        product: String,
        serial: String,
        relays: Vec<RelayReading>,
    },
    State {
        selector: String,
        on: bool,
    },
    Connected {
        selector: String,
        connected: bool,
    },
    Serial(RelayStatus),
    Done,
}

/// Runs `action` against `controller`.
///
/// # Errors
///
/// Propagates every [`RelayError`] from the controller.
pub fn run_relay_action<D: FeatureReportDevice>(
    controller: &mut RelayController<D>,
    action: RelayAction,
) -> Result<RelayOutcome, RelayError> {
    match action {
        RelayAction::Status => {
            let relays = controller.readings()?;
            Ok(RelayOutcome::Status {
                product: controller.product().to_string(),
                serial: controller.serial().to_string(),
                relays,
            })
        }
        RelayAction::Get(selector) => {
            let name = selector.to_string();
            let on = controller.get_state(selector)?;
            Ok(RelayOutcome::State {
                selector: name,
                on,
            })
        }
        RelayAction::Set(selector, on) => {
            info!(%selector, on, "setting relay");
            controller.set_state(selector, on)?;
            Ok(RelayOutcome::Done)
        }
        RelayAction::Toggle(selector) => {
            info!(%selector, "toggling relay");
            controller.toggle_state(selector)?;
            Ok(RelayOutcome::Done)
        }
        RelayAction::Connected(selector) => {
            let name = selector.to_string();
            let connected = controller.is_connected(selector)?;
            Ok(RelayOutcome::Connected {
                selector: name,
                connected,
            })
        }
        RelayAction::OpenAll => {
            info!("releasing every relay");
            controller.open_all()?;
            Ok(RelayOutcome::Done)
        }
        RelayAction::CloseAll => {
            info!("energizing every relay");
            controller.close_all()?;
            Ok(RelayOutcome::Done)
        }
        RelayAction::SetSerial(serial) => Ok(RelayOutcome::Serial(controller.set_serial(&serial)?)),
    }
}
