//! Incident id minting: `<prefix><unix millis>`, strictly increasing.

use chrono::{DateTime, Utc};

/// Mints ids from the wall clock in milliseconds.
///
/// If the clock has not moved past the last issued value (same-millisecond
/// burst, or the clock stepped backwards), the previous value plus one is used
/// instead, so ids never repeat within the process.
#[derive(Debug, Clone)]
pub struct IdGenerator {
  prefix: String,
  last: i64,
}

impl IdGenerator {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      last: i64::MIN,
    }
  }

  pub fn next(&mut self, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    let value = if millis > self.last { millis } else { self.last + 1 };
    self.last = value;
    format!("{}{}", self.prefix, value)
  }
}
