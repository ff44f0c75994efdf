use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Length of the rolling window over which free-tier usage is counted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ThrottlingPeriod {
    #[default]
    Daily,
    Weekly,
}

impl ThrottlingPeriod {
    pub fn days(&self) -> i32 {
        match self {
            ThrottlingPeriod::Daily => 1,
            ThrottlingPeriod::Weekly => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlingConfig {
    pub limit: i64,
    pub period: ThrottlingPeriod,
}

/// Usage counted for a user over `[time_from, time_to)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePeriod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub time_from: DateTime<Utc>,
    pub time_to: DateTime<Utc>,
    pub usage: i64,
}

impl UsagePeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.time_from <= at && at < self.time_to
    }
}

/// Authoritative usage returned by the store after an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub usage: i64,
    pub time_to: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.time_to - now
    }
}
