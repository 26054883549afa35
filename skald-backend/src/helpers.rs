use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rand::distr::{Alphanumeric, SampleString};
use rand::rng;
use sha2::{Digest, Sha256};

const API_KEY_PREFIX: &str = "skald-sk-";

pub fn generate_api_key() -> String {
  format!("{API_KEY_PREFIX}{}", Alphanumeric.sample_string(&mut rng(), 32))
}

pub fn hash_api_key(key: &str) -> String {
  format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Keep enough of the key to recognise it in logs.
pub fn mask_api_key(key: &str) -> String {
  let visible = API_KEY_PREFIX.len() + 4;
  if key.chars().count() <= visible + 4 {
    return "****".to_string();
  }
  let head: String = key.chars().take(visible).collect();
  format!("{head}****")
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a caller-supplied timestamp into epoch milliseconds.
///
/// Accepts epoch milliseconds, RFC 3339, and zone-less date-times or dates,
/// which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }

  if raw.bytes().all(|b| b.is_ascii_digit()) {
    return raw.parse().ok();
  }

  if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
    return Some(at.timestamp_millis());
  }

  for format in NAIVE_FORMATS {
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
      return Some(at.and_utc().timestamp_millis());
    }
  }

  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .map(|at| at.and_utc().timestamp_millis())
}
