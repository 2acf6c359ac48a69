//! Cross-platform time utilities.
//!
//! Entry timestamps are microseconds since the Unix epoch. This module
//! provides a clock that works on both native and WASM targets.

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(not(target_arch = "wasm32"))]
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(target_arch = "wasm32")]
pub fn now() -> SystemTime {
    use web_time::web::SystemTimeExt;
    web_time::SystemTime::now().to_std()
}

/// The current time in microseconds since the Unix epoch, the unit that
/// entry timestamps are expressed in. A clock set before the epoch reads as
/// zero.
pub fn now_micros() -> u64 {
    now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_returns_reasonable_timestamp() {
        // Should be after year 2020 (in microseconds)
        let year_2020_micros: u64 = 1577836800 * 1_000_000;
        assert!(now_micros() > year_2020_micros);
    }

    #[test]
    fn it_returns_increasing_values() {
        let t1 = now_micros();
        let t2 = now_micros();
        assert!(t2 >= t1);
    }
}
