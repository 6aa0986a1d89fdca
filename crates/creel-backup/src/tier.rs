//! Retention tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retention category a backup is assigned at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Emergency,
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Emergency, Tier::Daily, Tier::Weekly, Tier::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Emergency => "emergency",
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        }
    }

    /// Directory name under the backup root
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" => Ok(Tier::Emergency),
            "daily" => Ok(Tier::Daily),
            "weekly" => Ok(Tier::Weekly),
            "monthly" => Ok(Tier::Monthly),
            other => Err(format!(
                "unknown tier '{}', expected one of: emergency, daily, weekly, monthly",
                other
            )),
        }
    }
}
