/// Input validation for the ingest and read routes
use serde_json::Value;
use thiserror::Error;

/// Longest log line accepted, in bytes
pub const MAX_LINE_BYTES: usize = 16 * 1024;

pub const DEFAULT_RAID_LIMIT: usize = 10;
pub const MAX_RAID_LIMIT: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field 'line'")]
    LineMissing,

    #[error("Field 'line' must be a string")]
    LineNotText,

    #[error("Log line cannot be empty")]
    LineEmpty,

    #[error("Log line too long (max {max} bytes, got {actual})")]
    LineTooLong { max: usize, actual: usize },

    #[error("Field 'ts' must be a string or a number")]
    TimestampNotScalar,
}

/// Validates a raw log line
///
/// Rules:
/// - Cannot be empty (whitespace is kept and later reads as unclassified)
/// - Max 16 KiB
pub fn validate_line(line: &str) -> Result<(), ValidationError> {
    if line.is_empty() {
        return Err(ValidationError::LineEmpty);
    }

    if line.len() > MAX_LINE_BYTES {
        return Err(ValidationError::LineTooLong {
            max: MAX_LINE_BYTES,
            actual: line.len(),
        });
    }

    Ok(())
}

/// Extracts the log line from a loosely typed request field
pub fn line_field(value: Option<&Value>) -> Result<&str, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::LineMissing),
        Some(Value::String(line)) => {
            validate_line(line)?;
            Ok(line)
        }
        Some(_) => Err(ValidationError::LineNotText),
    }
}

/// Extracts the optional timestamp, keeping its textual form for parsing.
///
/// Numbers are epoch milliseconds; strings are parsed later and fall back to
/// processing time when unreadable.
pub fn ts_field(value: Option<&Value>) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(ts)) => Ok(Some(ts.clone())),
        Some(Value::Number(ms)) => Ok(Some(ms.to_string())),
        Some(_) => Err(ValidationError::TimestampNotScalar),
    }
}

/// Clamps a requested raid count to [1, 100]
///
/// Missing, zero and unparseable values use the default of 10; negative
/// values clamp up to 1.
pub fn raid_limit(requested: Option<&str>) -> usize {
    match requested.and_then(|raw| raw.trim().parse::<i64>().ok()) {
        Some(0) | None => DEFAULT_RAID_LIMIT,
        Some(n) => n.clamp(1, MAX_RAID_LIMIT as i64) as usize,
    }
}
