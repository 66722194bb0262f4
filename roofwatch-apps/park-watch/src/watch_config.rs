//!  Roofwatch Park Watch
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Watch configuration
//!
//! A run is configured from three layers, highest priority first:
//! command-line flags, the JSON config file (only read with `--use-config`),
//! and built-in defaults.
//!
//! ```json
//! {
//!   "start": "2026-07-15",
//!   "end": "2026-07-17",
//!   "party_size": 2,
//!   "parks": [
//!     { "name": "Pinery Provincial Park", "preferred_sites": ["Cabin 1", "Cabin 2"] },
//!     "Killbear Provincial Park"
//!   ],
//!   "auto_reserve": false,
//!   "reserve_mode": "first"
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::availability_checker::{AvailabilityChecker, AvailabilityMode, DEFAULT_AVAILABLE_CODE, StayRange};
use crate::park_catalog::{DEFAULT_CATEGORY_KEYWORDS, normalize};
use crate::reservation_trigger::{ReservationPolicy, ReserveMode};
use crate::reservations_client::{DEFAULT_APP_VERSION, TransportConfig};
use crate::watch_errors::WatchError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_COOKIE_PATH: &str = "tmp/op_cookies.json";
pub const DEFAULT_PARTY_SIZE: u32 = 2;

/// A `parks[]` entry: a bare name, or a name with its own preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParkEntry {
    Name(String),
    Detailed(ParkWithSites),
}

/// Object form of a `parks[]` entry. A misspelled key fails the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkWithSites {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_sites: Vec<String>,
}

impl ParkEntry {
    pub fn detailed(name: &str, preferred_sites: &[&str]) -> Self {
        ParkEntry::Detailed(ParkWithSites {
            name: name.to_string(),
            preferred_sites: preferred_sites.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ParkEntry::Name(name) => name,
            ParkEntry::Detailed(park) => &park.name,
        }
    }

    pub fn preferred_sites(&self) -> &[String] {
        match self {
            ParkEntry::Name(_) => &[],
            ParkEntry::Detailed(park) => &park.preferred_sites,
        }
    }
}

/// The config file as written by the user. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_size: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parks: Vec<ParkEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preferred_sites: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub category_keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_reserve: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_existing_cart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_availability: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_request_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl WatchConfigFile {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| WatchError::Config(format!("Invalid config file: {}", e)).into())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config file {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Load `path`, or write [`example`](Self::example) there and fail when it does not exist.
    pub fn load_or_bootstrap(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
        }
        let example = serde_json::to_string_pretty(&Self::example()).context("Serialize example config")?;
        std::fs::write(path, example + "\n").with_context(|| format!("Writing example config to {}", path.display()))?;
        tracing::warn!("Wrote example config to {}", path.display());
        Err(WatchError::Config(format!(
            "Config file not found: {}. An example was written there; edit it and rerun.",
            path.display()
        ))
        .into())
    }

    pub fn example() -> Self {
        Self {
            start: Some("2026-07-15".to_string()),
            end: Some("2026-07-17".to_string()),
            party_size: Some(DEFAULT_PARTY_SIZE),
            parks: vec![
                ParkEntry::detailed("Pinery Provincial Park", &["Cabin 1", "Cabin 2"]),
                ParkEntry::Name("Killbear Provincial Park".to_string()),
            ],
            auto_reserve: Some(false),
            reserve_mode: Some(ReserveMode::First.to_string()),
            allow_existing_cart: Some(false),
            app_version: Some(DEFAULT_APP_VERSION.to_string()),
            cookie_file: Some(PathBuf::from(DEFAULT_COOKIE_PATH)),
            ..Self::default()
        }
    }
}

/// Values given on the command line. `None`/empty/`false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub party_size: Option<u32>,
    pub parks: Vec<String>,
    pub preferred_sites: Vec<String>,
    pub category_keywords: Vec<String>,
    pub available_code: Option<i64>,
    pub reserve: bool,
    pub reserve_mode: Option<ReserveMode>,
    pub allow_existing_cart: bool,
    pub app_version: Option<String>,
    pub app_language: Option<String>,
    pub cookie_file: Option<PathBuf>,
    pub base_url: Option<String>,
    pub aggregate_only: bool,
    pub min_request_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// What is needed to talk to the site at all.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub transport: TransportConfig,
    pub cookie_file: PathBuf,
    pub category_keywords: Vec<String>,
}

/// A park to watch and the preferences that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkTarget {
    pub query: String,
    pub preferred_sites: Vec<String>,
}

/// Fully merged and validated settings of a watch run.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub session: SessionSettings,
    pub range: StayRange,
    pub party_size: u32,
    pub parks: Vec<ParkTarget>,
    pub checker: AvailabilityChecker,
    pub policy: ReservationPolicy,
}

fn parse_config_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        WatchError::Config(format!("Invalid {} date: {}. Use ISO format YYYY-MM-DD", field, value)).into()
    })
}

fn first_non_empty(lists: [&[String]; 2]) -> Option<Vec<String>> {
    lists.into_iter().find(|l| !l.is_empty()).map(|l| l.to_vec())
}

impl SessionSettings {
    pub fn resolve(file: &WatchConfigFile, cli: &CliOverrides) -> Self {
        let defaults = TransportConfig::default();
        let transport = TransportConfig {
            base_url: cli.base_url.clone().or_else(|| file.base_url.clone()).unwrap_or(defaults.base_url),
            app_version: cli
                .app_version
                .clone()
                .or_else(|| file.app_version.clone())
                .unwrap_or(defaults.app_version),
            app_language: cli
                .app_language
                .clone()
                .or_else(|| file.app_language.clone())
                .unwrap_or(defaults.app_language),
            timeout_secs: cli.timeout_secs.or(file.timeout_secs).unwrap_or(defaults.timeout_secs),
            min_request_interval_ms: cli
                .min_request_interval_ms
                .or(file.min_request_interval_ms)
                .unwrap_or(defaults.min_request_interval_ms),
        };
        let cookie_file = cli
            .cookie_file
            .clone()
            .or_else(|| file.cookie_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIE_PATH));
        let category_keywords = first_non_empty([cli.category_keywords.as_slice(), file.category_keywords.as_slice()])
            .unwrap_or_else(|| DEFAULT_CATEGORY_KEYWORDS.iter().map(|k| k.to_string()).collect());
        Self {
            transport,
            cookie_file,
            category_keywords,
        }
    }
}

/// Parks from the command line replace the config's list. A command-line
/// park still picks up the per-park preferences of a config entry with the
/// same name.
fn resolve_parks(file: &WatchConfigFile, cli: &CliOverrides) -> Vec<ParkTarget> {
    let global = first_non_empty([cli.preferred_sites.as_slice(), file.preferred_sites.as_slice()]).unwrap_or_default();
    let own_preferences = |name: &str| -> Vec<String> {
        file.parks
            .iter()
            .find(|p| normalize(p.name()) == normalize(name))
            .map(|p| p.preferred_sites().to_vec())
            .unwrap_or_default()
    };

    let names: Vec<String> = if cli.parks.is_empty() {
        file.parks.iter().map(|p| p.name().to_string()).collect()
    } else {
        cli.parks.clone()
    };

    let mut targets: Vec<ParkTarget> = Vec::with_capacity(names.len());
    for name in names.into_iter().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if targets.iter().any(|t| normalize(&t.query) == normalize(&name)) {
            continue;
        }
        let own = own_preferences(&name);
        targets.push(ParkTarget {
            preferred_sites: if own.is_empty() { global.clone() } else { own },
            query: name,
        });
    }
    targets
}

impl WatchSettings {
    pub fn resolve(file: &WatchConfigFile, cli: &CliOverrides) -> Result<Self> {
        let start = match (cli.start, file.start.as_deref()) {
            (Some(d), _) => Some(d),
            (None, Some(s)) => Some(parse_config_date("start", s)?),
            (None, None) => None,
        };
        let end = match (cli.end, file.end.as_deref()) {
            (Some(d), _) => Some(d),
            (None, Some(s)) => Some(parse_config_date("end", s)?),
            (None, None) => None,
        };
        let (Some(start), Some(end)) = (start, end) else {
            return Err(WatchError::Config(
                "Provide --start and --end (or use --use-config with start/end in the config file)".to_string(),
            )
            .into());
        };
        let range = StayRange::new(start, end)?;

        let party_size = cli.party_size.or(file.party_size).unwrap_or(DEFAULT_PARTY_SIZE);
        if party_size == 0 {
            return Err(WatchError::Config("Party size must be at least 1".to_string()).into());
        }

        let parks = resolve_parks(file, cli);
        if parks.is_empty() {
            return Err(WatchError::Config(
                "Provide at least one park via --parks/--park or enable --use-config".to_string(),
            )
            .into());
        }

        let mode = if cli.aggregate_only || file.daily_availability == Some(false) {
            AvailabilityMode::Aggregate
        } else {
            AvailabilityMode::Daily
        };
        let checker = AvailabilityChecker::new(
            cli.available_code.or(file.available_code).unwrap_or(DEFAULT_AVAILABLE_CODE),
            mode,
        );

        let reserve_mode = match (cli.reserve_mode, file.reserve_mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(s)) => s.parse()?,
            (None, None) => ReserveMode::default(),
        };
        let policy = ReservationPolicy {
            auto_reserve: cli.reserve || file.auto_reserve.unwrap_or(false),
            mode: reserve_mode,
            allow_existing_cart: cli.allow_existing_cart || file.allow_existing_cart.unwrap_or(false),
        };

        Ok(Self {
            session: SessionSettings::resolve(file, cli),
            range,
            party_size,
            parks,
            checker,
            policy,
        })
    }
}
