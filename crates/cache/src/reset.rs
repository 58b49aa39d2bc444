//! Daily content rotation.

use crate::error::{ErrorKind, Result};
use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// The UTC hour at which upstream rotates its daily content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyReset {
    hour: u8,
}

impl Default for DailyReset {
    fn default() -> Self {
        Self { hour: Self::DEFAULT_HOUR }
    }
}

impl DailyReset {
    pub const DEFAULT_HOUR: u8 = 17;

    pub fn new(hour: u8) -> Result<Self> {
        if hour > 23 {
            exn::bail!(ErrorKind::InvalidResetHour(hour));
        }
        Ok(Self { hour })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Whole seconds from `now` until the next reset.
    ///
    /// At exactly the reset instant the next reset is a full day away.
    pub fn seconds_until(&self, now: OffsetDateTime) -> u64 {
        let now = now.to_offset(UtcOffset::UTC);
        let mut reset = now.replace_time(Time::MIDNIGHT) + Duration::hours(i64::from(self.hour));
        if reset <= now {
            reset += Duration::DAY;
        }
        u64::try_from((reset - now).whole_seconds()).unwrap_or(0)
    }
}
