//! Location Write Protocol
//!
//! UUIDs and payload encoding for pushing a location over a GATT write.

use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::Coordinate;
use btleplug::api::{CharPropFlags, WriteType};
use uuid::Uuid;

/// Location service UUID
/// Placeholder: the iOS service that accepts a location has not been identified yet.
pub const LOCATION_SERVICE_UUID: &str = "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF";

/// Location characteristic UUID (placeholder, see above)
pub const LOCATION_CHAR_UUID: &str = "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF";

/// Encode a location as the UTF-8 text `"<lat>,<lng>"`
///
/// ```text
/// 37.7749,-122.4194
/// ```
pub fn encode_location(coordinate: &Coordinate) -> Vec<u8> {
    format!("{},{}", coordinate.latitude, coordinate.longitude).into_bytes()
}

/// Parse a UUID string, with or without dashes
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid> {
    Uuid::parse_str(uuid_str.trim()).map_err(|_| ConnectionError::InvalidUuid(uuid_str.to_string()))
}

/// True for the all-ones placeholder UUID
pub fn is_placeholder(uuid: &Uuid) -> bool {
    *uuid == Uuid::max()
}

/// Pick a write mode the characteristic supports, preferring acknowledged writes
pub fn choose_write_type(properties: CharPropFlags) -> Option<WriteType> {
    if properties.contains(CharPropFlags::WRITE) {
        Some(WriteType::WithResponse)
    } else if properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        Some(WriteType::WithoutResponse)
    } else {
        None
    }
}
