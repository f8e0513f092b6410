//! Advertisement parsing for Gicisky labels.
//!
//! Labels broadcast manufacturer data under company id `0x5053`:
//!
//! ```text
//! byte 0   model id (capability table key)
//! byte 1   battery voltage in decivolts
//! byte 2-3 firmware version, big endian
//! byte 4   reserved
//! ```

use serde::Serialize;

/// Manufacturer id carried by Gicisky advertisements.
pub const MANUFACTURER_ID: u16 = 0x5053;

/// GATT service exposing the command and image characteristics.
pub const SERVICE_UUID: &str = "0000fef0-0000-1000-8000-00805f9b34fb";

const BATTERY_EMPTY_VOLTS: f32 = 2.2;
const BATTERY_FULL_VOLTS: f32 = 2.9;

/// Decoded label advertisement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advertisement {
    pub model_id: u8,
    pub battery_volts: f32,
    pub battery_percent: f32,
    pub firmware: u16,
}

/// Parse manufacturer data. Returns `None` for foreign or malformed payloads.
pub fn parse_advertisement(manufacturer_id: u16, data: &[u8]) -> Option<Advertisement> {
    if manufacturer_id != MANUFACTURER_ID || data.len() != 5 {
        return None;
    }

    let battery_volts = data[1] as f32 / 10.0;
    let percent = (battery_volts - BATTERY_EMPTY_VOLTS) * 100.0
        / (BATTERY_FULL_VOLTS - BATTERY_EMPTY_VOLTS);

    Some(Advertisement {
        model_id: data[0],
        battery_volts,
        battery_percent: (percent.clamp(0.0, 100.0) * 10.0).round() / 10.0,
        firmware: u16::from_be_bytes([data[2], data[3]]),
    })
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}
