//! services/api/src/adapters/clock.rs
//!
//! The server's wall clock, implementing the `Clock` port.

use chrono::{Local, Timelike};
use presensi_core::domain::LocalNow;
use presensi_core::ports::Clock;

/// Reads local time on the host. Sub-second precision is dropped so stored
/// punch times read as `HH:MM:SS`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> LocalNow {
        let now = Local::now();
        let time = now.time();
        LocalNow {
            date: now.date_naive(),
            time: time.with_nanosecond(0).unwrap_or(time),
        }
    }
}
