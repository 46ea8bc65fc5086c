use chrono::{DateTime, FixedOffset, Local, Offset, Utc};

/// 12-hour, zero-padded display time, e.g. `03:07 PM`.
const DISPLAY_FORMAT: &str = "%I:%M %p";

/// Source of "now" for live records, which are stamped at receipt.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Zone the viewer reads times in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeDisplay {
    #[default]
    Local,
    Offset(FixedOffset),
}

impl TimeDisplay {
    pub fn utc() -> Self {
        Self::Offset(Utc.fix())
    }

    /// Zone shifted from UTC by the given number of minutes, if in range.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Offset)
    }

    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self {
            Self::Local => instant.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            Self::Offset(offset) => instant.with_timezone(offset).format(DISPLAY_FORMAT).to_string(),
        }
    }
}
