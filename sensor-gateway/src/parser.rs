//! Record parser for the device line format.
//!
//! The sensor unit prints one line per sample:
//!
//! ```text
//! Vehicles:176,Air:692
//! ```
//!
//! Fields are positional. Field 0 is the vehicle count and field 1 is the air
//! quality index; the key text before each `:` is never inspected.

use crate::reading::SensorReading;

/// Number of positional fields in a device line.
const FIELD_COUNT: usize = 2;

/// Position of the vehicle count field.
const VEHICLES_FIELD: usize = 0;

/// Position of the air quality field.
const AIR_FIELD: usize = 1;

/// Errors produced when a line does not match the device format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The line was empty
    Empty,

    /// Fewer comma-separated fields than required
    MissingField { found: usize },

    /// A field had no `:` separating key and value
    MissingSeparator { field: usize },

    /// A value was not a base-10 integer or did not fit in 64 bits
    InvalidNumber { field: usize, value: String },

    /// A value was a valid integer but negative
    Negative { field: usize, value: i64 },
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Empty => write!(f, "empty line"),
            FormatError::MissingField { found } => write!(
                f,
                "expected {} comma-separated fields, found {}",
                FIELD_COUNT, found
            ),
            FormatError::MissingSeparator { field } => {
                write!(f, "field {} has no ':' separator", field)
            }
            FormatError::InvalidNumber { field, value } => {
                write!(f, "field {} value '{}' is not a valid integer", field, value)
            }
            FormatError::Negative { field, value } => {
                write!(f, "field {} value {} is negative", field, value)
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// Converts raw device lines into [`SensorReading`]s for one deployment.
#[derive(Debug, Clone, Copy)]
pub struct RecordParser {
    location_id: i64,
}

impl RecordParser {
    /// Create a parser that stamps every reading with `location_id`.
    pub fn new(location_id: i64) -> Self {
        Self { location_id }
    }

    pub fn location_id(&self) -> i64 {
        self.location_id
    }

    /// Parse one line into a reading.
    ///
    /// The line should already have its terminator stripped. Blank lines are
    /// rejected rather than skipped; callers that want to ignore them must
    /// do so before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when the line has fewer than two fields, a
    /// field lacks a `:`, or a value is not a non-negative 64-bit integer.
    pub fn parse(&self, line: &str) -> Result<SensorReading, FormatError> {
        if line.is_empty() {
            return Err(FormatError::Empty);
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < FIELD_COUNT {
            return Err(FormatError::MissingField {
                found: fields.len(),
            });
        }

        let vehicle_count = parse_field(fields[VEHICLES_FIELD], VEHICLES_FIELD)?;
        let aqi = parse_field(fields[AIR_FIELD], AIR_FIELD)?;

        Ok(SensorReading::new(self.location_id, aqi, vehicle_count))
    }
}

/// Extract and validate the value half of a `key:value` field.
fn parse_field(field: &str, index: usize) -> Result<i64, FormatError> {
    let value = field
        .split(':')
        .nth(1)
        .ok_or(FormatError::MissingSeparator { field: index })?;

    let trimmed = value.trim();
    let number: i64 = trimmed.parse().map_err(|_| FormatError::InvalidNumber {
        field: index,
        value: trimmed.to_string(),
    })?;

    if number < 0 {
        return Err(FormatError::Negative {
            field: index,
            value: number,
        });
    }

    Ok(number)
}
