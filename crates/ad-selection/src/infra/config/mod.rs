//! Immutable configuration snapshot. Built once, shared through `Arc` and read
//! by every component at call time.

use {
    serde::Deserialize,
    std::{collections::HashSet, time::Duration},
};

pub mod file;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    pub auction: Auction,
    pub reporting: Reporting,
    pub attribution: Attribution,
    pub throttle: Throttle,
    /// Packages allowed to call the ad selection APIs.
    pub allowed_packages: AllowList,
    /// Whether ad techs have to be enrolled to take part in auctions and
    /// receive reports.
    pub enrollment_check_enabled: bool,
    pub debug_reporting: DebugReporting,
    pub maintenance: Maintenance,
    pub http: Http,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auction: Default::default(),
            reporting: Default::default(),
            attribution: Default::default(),
            throttle: Default::default(),
            allowed_packages: AllowList::All,
            enrollment_check_enabled: true,
            debug_reporting: Default::default(),
            maintenance: Default::default(),
            http: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Auction {
    /// Deadline shared by candidate discovery, bidding, scoring and
    /// persistence.
    #[serde(with = "humantime_serde")]
    pub overall_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub bidding_timeout_per_group: Duration,
    #[serde(with = "humantime_serde")]
    pub scoring_timeout: Duration,
    /// Upper bound of bidding tasks executing at the same time.
    pub max_concurrent_bidding: usize,
    pub enforce_foreground: bool,
}

impl Default for Auction {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_secs(5),
            bidding_timeout_per_group: Duration::from_secs(5),
            scoring_timeout: Duration::from_secs(5),
            max_concurrent_bidding: 6,
            enforce_foreground: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Reporting {
    #[serde(with = "humantime_serde")]
    pub impression_overall_timeout: Duration,
    pub enforce_foreground_impression: bool,
    pub enforce_foreground_interaction: bool,
    /// Maximum size of an interaction key in bytes.
    pub max_interaction_key_size: usize,
    /// Maximum size of interaction data in bytes.
    pub max_interaction_data_size: usize,
    /// Whether reporting logic may register interaction reporting URIs.
    pub register_ad_beacon_enabled: bool,
    pub max_registered_interactions_total: usize,
    pub max_registered_interactions_per_destination: usize,
    pub max_interaction_reporting_uri_size: usize,
}

impl Default for Reporting {
    fn default() -> Self {
        Self {
            impression_overall_timeout: Duration::from_secs(2),
            enforce_foreground_impression: true,
            enforce_foreground_interaction: true,
            max_interaction_key_size: 40,
            max_interaction_data_size: 64 * 1024,
            register_ad_beacon_enabled: false,
            max_registered_interactions_total: 1000,
            max_registered_interactions_per_destination: 10,
            max_interaction_reporting_uri_size: 400,
        }
    }
}

/// Hand-off of interaction reports to the attribution service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Attribution {
    pub enabled: bool,
    pub kill_switch: bool,
    /// Also deliver the reports directly when they are registered.
    pub fallback_enabled: bool,
    pub allowed_packages: AllowList,
}

impl Attribution {
    /// Whether the feature is switched on at all, independent of the caller.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.kill_switch
    }
}

/// Permits per second granted to each calling package.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Throttle {
    pub run_auction: f64,
    pub report_impression: f64,
    pub report_interaction: f64,
    pub overrides: f64,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            run_auction: 1.0,
            report_impression: 1.0,
            report_interaction: 1.0,
            overrides: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct DebugReporting {
    pub enabled: bool,
    /// Queued debug reports sent per maintenance run.
    pub batch_size: usize,
}

impl Default for DebugReporting {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Maintenance {
    /// Age after which auction results and their interactions are deleted.
    #[serde(with = "humantime_serde")]
    pub result_expiry: Duration,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self {
            result_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Http {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Maximum size of fetched logic and signals in bytes.
    pub response_size_limit: usize,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            response_size_limit: 1024 * 1024,
        }
    }
}

/// Set of package names. `*` matches every package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub enum AllowList {
    All,
    Only(HashSet<String>),
}

impl AllowList {
    pub fn allows(&self, package: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(packages) => packages.contains(package),
        }
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::Only(Default::default())
    }
}

impl From<Vec<String>> for AllowList {
    fn from(packages: Vec<String>) -> Self {
        if packages.iter().any(|package| package == "*") {
            Self::All
        } else {
            Self::Only(packages.into_iter().collect())
        }
    }
}
