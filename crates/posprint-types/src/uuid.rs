//! Bluetooth UUIDs for BLE thermal printers.
//!
//! Budget ESC/POS printers do not share one GATT layout. Each vendor module
//! exposes a "serial-like" service with one writable characteristic that
//! accepts the raw command stream. The pairs below cover the common ones.

use uuid::{Uuid, uuid};

// --- Generic ESC/POS printer services ---

/// Service used by most 58mm/80mm "BT printer" modules.
pub const PRINTER_SERVICE_18F0: Uuid = uuid!("000018f0-0000-1000-8000-00805f9b34fb");

/// Write characteristic for [`PRINTER_SERVICE_18F0`].
pub const PRINTER_WRITE_2AF1: Uuid = uuid!("00002af1-0000-1000-8000-00805f9b34fb");

/// Vendor service found on many Chinese OEM printers.
pub const PRINTER_SERVICE_E781: Uuid = uuid!("e7810a71-73ae-499d-8c15-faa9aef0c3f2");

/// Write characteristic for [`PRINTER_SERVICE_E781`].
pub const PRINTER_WRITE_BEF8: Uuid = uuid!("bef8d6c9-9c21-4c9e-b632-bd58c1009f9f");

/// Microchip ISSC transparent UART service.
pub const ISSC_SERVICE: Uuid = uuid!("49535343-fe7d-4ae5-8fa9-9fafd205e455");

/// Write characteristic for [`ISSC_SERVICE`].
pub const ISSC_WRITE: Uuid = uuid!("49535343-8841-43f4-a8d4-ecbe34729bb3");

/// Short-form 0xFF00 serial service.
pub const SERIAL_SERVICE_FF00: Uuid = uuid!("0000ff00-0000-1000-8000-00805f9b34fb");

/// Write characteristic for [`SERIAL_SERVICE_FF00`].
pub const SERIAL_WRITE_FF02: Uuid = uuid!("0000ff02-0000-1000-8000-00805f9b34fb");

/// 0xAE30 service used by small label and receipt printers.
pub const SERIAL_SERVICE_AE30: Uuid = uuid!("0000ae30-0000-1000-8000-00805f9b34fb");

/// Write characteristic for [`SERIAL_SERVICE_AE30`].
pub const SERIAL_WRITE_AE01: Uuid = uuid!("0000ae01-0000-1000-8000-00805f9b34fb");

/// A service and the characteristic that accepts printer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattProfile {
    pub service: Uuid,
    pub write_characteristic: Uuid,
}

impl GattProfile {
    pub const fn new(service: Uuid, write_characteristic: Uuid) -> Self {
        Self {
            service,
            write_characteristic,
        }
    }
}

/// Known printer profiles, most common first.
pub const KNOWN_PROFILES: [GattProfile; 5] = [
    GattProfile::new(PRINTER_SERVICE_18F0, PRINTER_WRITE_2AF1),
    GattProfile::new(PRINTER_SERVICE_E781, PRINTER_WRITE_BEF8),
    GattProfile::new(ISSC_SERVICE, ISSC_WRITE),
    GattProfile::new(SERIAL_SERVICE_FF00, SERIAL_WRITE_FF02),
    GattProfile::new(SERIAL_SERVICE_AE30, SERIAL_WRITE_AE01),
];

/// Service UUIDs of [`KNOWN_PROFILES`], for scan filters.
pub fn known_services() -> Vec<Uuid> {
    KNOWN_PROFILES.iter().map(|p| p.service).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_distinct() {
        let services = known_services();
        for (i, a) in services.iter().enumerate() {
            for b in &services[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_short_form_uuids_use_base() {
        // 16-bit UUIDs expand onto the Bluetooth base UUID.
        assert!(PRINTER_SERVICE_18F0.to_string().ends_with("-0000-1000-8000-00805f9b34fb"));
        assert!(PRINTER_WRITE_2AF1.to_string().starts_with("00002af1"));
    }
}
