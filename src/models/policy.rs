use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::ERR_INVALID_FREQUENCY;
use crate::error::AppError;

/// How often an owner's automatic backup runs. Closed enum: anything
/// else is rejected at the API boundary before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(AppError::Validation(ERR_INVALID_FREQUENCY.to_string())),
        }
    }
}

/// One row of backup_settings: the per-owner backup policy
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    pub owner_email: String,
    pub frequency: Frequency,
    pub is_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_parses_known_values() {
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
    }

    #[test]
    fn test_frequency_rejects_unknown_values() {
        assert!("hourly".parse::<Frequency>().is_err());
        assert!("Daily".parse::<Frequency>().is_err());
        assert!("".parse::<Frequency>().is_err());
    }
}
