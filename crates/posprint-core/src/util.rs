//! Utility functions for posprint-core.

use btleplug::platform::PeripheralId;

/// Address CoreBluetooth reports for every peripheral.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS, where addresses are hidden, uses the peripheral ID.
/// Elsewhere, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_hidden_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether the platform withheld the real address.
pub fn is_hidden_address(address: &str) -> bool {
    address == HIDDEN_ADDRESS
}

/// Number of chunks `len` bytes split into at `chunk_size` bytes each.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_address() {
        assert!(is_hidden_address("00:00:00:00:00:00"));
        assert!(!is_hidden_address("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 20), 0);
        assert_eq!(chunk_count(1, 20), 1);
        assert_eq!(chunk_count(20, 20), 1);
        assert_eq!(chunk_count(100, 20), 5);
        assert_eq!(chunk_count(101, 20), 6);
        assert_eq!(chunk_count(10, 0), 0);
    }
}
