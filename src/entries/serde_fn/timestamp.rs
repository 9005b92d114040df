use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

macro_rules! de_error {
    ($($arg:tt)*) => {
        de::Error::custom(format!($($arg)*))
    };
}

/// Unix time in fractional seconds, the format the ledger has always used.
pub fn serialize<S: Serializer>(
    datetime: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let secs = datetime.timestamp() as f64 + datetime.timestamp_subsec_micros() as f64 / 1e6;
    serializer.serialize_f64(secs)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(de_error!("invalid timestamp {}", secs));
    }

    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;

    Utc.timestamp_opt(whole, nanos.min(999_999_999))
        .single()
        .ok_or_else(|| de_error!("timestamp {} is out of range", secs))
}
