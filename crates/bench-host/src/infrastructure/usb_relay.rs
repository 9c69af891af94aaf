//! USB adapter for the HID relay board.
//!
//! The board is driven entirely through class-specific control transfers on
//! endpoint 0 (HID GET_REPORT / SET_REPORT), so no interface has to be
//! claimed and the kernel's HID driver can stay attached.
//!
//! # Discovery
//!
//! A device is a relay board when its VID/PID is `16C0:05DF`, its
//! manufacturer string is `www.dcttech.com` and its product string starts
//! with `USBRelay`.  The VID/PID pair is shared with other V-USB gadgets, so
//! the string checks are not optional.

use std::time::Duration;

use bench_core::relay::protocol::{
    feature_report_value, is_relay_device, HID_GET_REPORT, HID_SET_REPORT,
};
use bench_core::transport::{FeatureReportDevice, TransportError};
use nusb::transfer::{Control, ControlType, Recipient};
use nusb::DeviceInfo;
use serde::Serialize;
use tracing::{debug, info};

/// Default timeout of a single control transfer.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(5000);

/// What discovery reports about an attached board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayBoardInfo {
    pub bus: u8,
    pub address: u8,
    pub product: String,
}

impl RelayBoardInfo {
    fn from_device_info(info: &DeviceInfo) -> Self {
        Self {
            bus: info.bus_number(),
            address: info.device_address(),
            product: info.product_string().unwrap_or_default().to_string(),
        }
    }
}

fn matches(info: &DeviceInfo) -> bool {
    is_relay_device(
        info.vendor_id(),
        info.product_id(),
        info.manufacturer_string(),
        info.product_string(),
    )
}

fn relay_devices() -> Result<Vec<DeviceInfo>, TransportError> {
    let devices: Vec<DeviceInfo> = nusb::list_devices()?.filter(matches).collect();
    debug!(count = devices.len(), "relay boards enumerated");
    Ok(devices)
}

/// Lists every attached relay board.
///
/// # Errors
///
/// Returns [`TransportError::Io`] if USB enumeration fails.
pub fn list_relay_boards() -> Result<Vec<RelayBoardInfo>, TransportError> {
    Ok(relay_devices()?
        .iter()
        .map(RelayBoardInfo::from_device_info)
        .collect())
}

/// Opens the first attached relay board.
///
/// # Errors
///
/// Returns [`TransportError::Transfer`] when no board is attached, or
/// [`TransportError::Io`] if enumeration or opening fails.
pub fn open_first_relay_board(timeout: Duration) -> Result<UsbRelayHandle, TransportError> {
    let info = relay_devices()?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Transfer("no USB relay board found".to_string()))?;
    UsbRelayHandle::open(&info, timeout)
}

/// An open relay board.
pub struct UsbRelayHandle {
    device: Option<nusb::Device>,
    product: String,
    timeout: Duration,
}

impl UsbRelayHandle {
    /// Opens the device described by `info`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the OS refuses access.
    pub fn open(info: &DeviceInfo, timeout: Duration) -> Result<Self, TransportError> {
        let device = info.open()?;
        let product = info.product_string().unwrap_or_default().to_string();
        info!(
            bus = info.bus_number(),
            address = info.device_address(),
            %product,
            "relay board device opened"
        );
        Ok(Self {
            device: Some(device),
            product,
            timeout,
        })
    }

    fn device(&self) -> Result<&nusb::Device, TransportError> {
        self.device.as_ref().ok_or(TransportError::Closed)
    }
}

fn feature_control(request: u8, report_id: u8) -> Control {
    Control {
        control_type: ControlType::Class,
        recipient: Recipient::Device,
        request,
        value: feature_report_value(report_id),
        index: 0,
    }
}

impl FeatureReportDevice for UsbRelayHandle {
    fn product_name(&self) -> Result<String, TransportError> {
        self.device()?;
        Ok(self.product.clone())
    }

    fn get_feature_report(&mut self, report_id: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let control = feature_control(HID_GET_REPORT, report_id);
        let n = self
            .device()?
            .control_in_blocking(control, buf, self.timeout)
            .map_err(|e| TransportError::Transfer(format!("GET_REPORT failed: {e}")))?;
        debug!(report_id, len = n, "GET_REPORT");
        Ok(n)
    }

    fn set_feature_report(&mut self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let control = feature_control(HID_SET_REPORT, report_id);
        self.device()?
            .control_out_blocking(control, data, self.timeout)
            .map_err(|e| TransportError::Transfer(format!("SET_REPORT failed: {e}")))?;
        debug!(report_id, ?data, "SET_REPORT");
        Ok(())
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            info!(product = %self.product, "relay board device closed");
        }
    }
}
