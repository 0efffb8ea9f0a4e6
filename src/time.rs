//! ISO 8601 timestamp formatting.
//!
//! Used by the JSON log formatter and when printing table rows.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Pre-formatted timestamp: `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Stack-allocated, no heap allocation.
#[derive(Clone, Copy)]
pub struct Iso8601Timestamp {
    buf: [u8; 24],
}

impl Iso8601Timestamp {
    /// Create a new timestamp for the current time.
    #[inline]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(now)
    }

    /// Create from microseconds since UNIX_EPOCH. Negative values clamp to
    /// the epoch.
    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        Self::from_duration(Duration::from_micros(micros.max(0) as u64))
    }

    /// Create from a Duration since UNIX_EPOCH.
    pub fn from_duration(duration: Duration) -> Self {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();

        // Time of day
        let day_secs = secs % 86400;
        let hours = (day_secs / 3600) as u8;
        let minutes = ((day_secs % 3600) / 60) as u8;
        let seconds = (day_secs % 60) as u8;

        // Days since epoch
        let days = secs / 86400;

        let mut year = 1970u16;
        let mut remaining = days as i64;

        loop {
            let year_days = if is_leap_year(year) { 366 } else { 365 };
            if remaining < year_days {
                break;
            }
            remaining -= year_days;
            year += 1;
        }

        let month_days: [u8; 12] = if is_leap_year(year) {
            [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        } else {
            [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        };

        let mut month = 1u8;
        for &days_in_month in &month_days {
            if remaining < days_in_month as i64 {
                break;
            }
            remaining -= days_in_month as i64;
            month += 1;
        }
        let day = (remaining + 1) as u8;

        let mut buf = [0u8; 24];
        write_padded(&mut buf[0..4], year as u32);
        buf[4] = b'-';
        write_padded(&mut buf[5..7], month as u32);
        buf[7] = b'-';
        write_padded(&mut buf[8..10], day as u32);
        buf[10] = b'T';
        write_padded(&mut buf[11..13], hours as u32);
        buf[13] = b':';
        write_padded(&mut buf[14..16], minutes as u32);
        buf[16] = b':';
        write_padded(&mut buf[17..19], seconds as u32);
        buf[19] = b'.';
        write_padded(&mut buf[20..23], millis);
        buf[23] = b'Z';

        Self { buf }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only ASCII digits and separators are ever written
        std::str::from_utf8(&self.buf).unwrap_or("")
    }
}

impl AsRef<str> for Iso8601Timestamp {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
const fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Write `val` as zero-padded decimal filling `buf`.
#[inline]
fn write_padded(buf: &mut [u8], mut val: u32) {
    for slot in buf.iter_mut().rev() {
        *slot = b'0' + (val % 10) as u8;
        val /= 10;
    }
}
