//! Advertising configuration.

use std::time::Duration;

use crate::core::{GapError, MAX_ADV_DATA_LEN};
use crate::hci::{AdvParams, AdvType};

/// Smallest legal advertising interval (20 ms).
pub const MIN_ADV_INTERVAL: u16 = 0x0020;

/// Largest legal advertising interval (10.24 s).
pub const MAX_ADV_INTERVAL: u16 = 0x4000;

/// AD type: Flags.
const AD_FLAGS: u8 = 0x01;
/// AD type: Shortened Local Name.
const AD_SHORT_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
const AD_COMPLETE_NAME: u8 = 0x09;
/// LE General Discoverable, BR/EDR not supported.
const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

/// Legacy advertising configuration passed to `start_advertising`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingConfig {
    /// Minimum interval, units of 0.625 ms.
    pub interval_min: u16,
    /// Maximum interval, units of 0.625 ms.
    pub interval_max: u16,
    /// PDU type.
    pub adv_type: AdvType,
    /// Own address type (0 = public, 1 = random).
    pub own_address_type: u8,
    /// Channel map bitmask (bits 0..=2 = channels 37..=39).
    pub channel_map: u8,
    /// Advertising payload (AD structures).
    pub adv_data: Vec<u8>,
    /// Scan response payload (AD structures).
    pub scan_response: Vec<u8>,
    /// Re-enable advertising after the connection it produced ends.
    pub restart_on_disconnect: bool,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            interval_min: 0x00A0,
            interval_max: 0x00F0,
            adv_type: AdvType::ConnectableUndirected,
            own_address_type: 0,
            channel_map: 0x07,
            adv_data: Vec::new(),
            scan_response: Vec::new(),
            restart_on_disconnect: false,
        }
    }
}

impl AdvertisingConfig {
    /// Connectable advertising carrying discoverable flags and a local name.
    ///
    /// Names that do not fit are truncated and sent as a shortened name.
    pub fn with_name(name: &str) -> Self {
        let mut data = vec![2, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE];
        let room = MAX_ADV_DATA_LEN - data.len() - 2;
        let bytes = name.as_bytes();
        let (ad_type, name) = if bytes.len() > room {
            (AD_SHORT_NAME, &bytes[..room])
        } else {
            (AD_COMPLETE_NAME, bytes)
        };
        data.push(name.len() as u8 + 1);
        data.push(ad_type);
        data.extend_from_slice(name);

        Self {
            adv_data: data,
            ..Self::default()
        }
    }

    /// Set the advertising interval range.
    pub fn interval(mut self, min: Duration, max: Duration) -> Self {
        self.interval_min = duration_to_units(min);
        self.interval_max = duration_to_units(max);
        self
    }

    /// Set the advertising payload.
    pub fn adv_data(mut self, data: Vec<u8>) -> Self {
        self.adv_data = data;
        self
    }

    /// Set the scan response payload.
    pub fn scan_response(mut self, data: Vec<u8>) -> Self {
        self.scan_response = data;
        self
    }

    /// Restart advertising when the resulting connection drops.
    pub fn restart_on_disconnect(mut self, enabled: bool) -> Self {
        self.restart_on_disconnect = enabled;
        self
    }

    /// Check the configuration against the controller's limits.
    pub fn validate(&self) -> Result<(), GapError> {
        for data in [&self.adv_data, &self.scan_response] {
            if data.len() > MAX_ADV_DATA_LEN {
                return Err(GapError::AdvertisingDataTooLong(data.len()));
            }
        }
        if self.interval_min < MIN_ADV_INTERVAL || self.interval_max > MAX_ADV_INTERVAL {
            return Err(GapError::InvalidAdvertisingParameters("interval out of range"));
        }
        if self.interval_min > self.interval_max {
            return Err(GapError::InvalidAdvertisingParameters(
                "minimum interval above maximum",
            ));
        }
        if self.channel_map & 0b111 == 0 {
            return Err(GapError::InvalidAdvertisingParameters("empty channel map"));
        }
        Ok(())
    }

    /// HCI parameter block for this configuration.
    pub fn params(&self) -> AdvParams {
        AdvParams {
            interval_min: self.interval_min,
            interval_max: self.interval_max,
            adv_type: self.adv_type,
            own_address_type: self.own_address_type,
            channel_map: self.channel_map,
            filter_policy: 0,
        }
    }
}

fn duration_to_units(d: Duration) -> u16 {
    // 0.625 ms units
    let units = d.as_micros() / 625;
    units.min(u128::from(u16::MAX)) as u16
}
