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

//! # Availability Checker
//!
//! Side-effect free decision of whether a resource can be booked for a whole
//! stay, from the per-day codes returned by `/api/availability/map`.
//!
//! The API returns each resource's days positionally: entry `i` describes
//! `start + i days`. The meaning of the codes is empirical; `5` has been
//! observed as "available".

use std::collections::BTreeMap;

use anyhow::{Result, ensure};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::watch_errors::WatchError;

pub const DEFAULT_AVAILABLE_CODE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAvailability {
    #[serde(default)]
    pub availability: Option<i64>,
    #[serde(default)]
    pub remaining_quota: Option<i64>,
}

impl DailyAvailability {
    pub fn new(code: i64, remaining_quota: Option<i64>) -> Self {
        Self {
            availability: Some(code),
            remaining_quota,
        }
    }

    fn is_open(&self, available_code: i64) -> bool {
        self.availability == Some(available_code) && self.remaining_quota.is_none_or(|q| q > 0)
    }
}

/// Body of `/api/availability/map`. Only the per-resource table is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapAvailability {
    #[serde(default)]
    pub map_id: Option<i64>,
    #[serde(default)]
    pub resource_availabilities: BTreeMap<i64, Vec<DailyAvailability>>,
}

/// Requested stay: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StayRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl StayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        ensure!(
            start < end,
            WatchError::Config(format!("Start date {} must be before end date {}", start, end))
        );
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn nights(&self) -> usize {
        (self.end - self.start).num_days() as usize
    }

    /// Every night of the stay, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.nights() as u64).filter_map(|i| self.start.checked_add_days(Days::new(i)))
    }
}

/// How availability was requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailabilityMode {
    /// One entry per night (`getDailyAvailability=true`).
    #[default]
    Daily,
    /// One aggregate entry for the whole stay. Less precise.
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Available,
    Unavailable,
    /// No data came back for the resource. Never reported as available.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct AvailabilityChecker {
    available_code: i64,
    mode: AvailabilityMode,
}

impl Default for AvailabilityChecker {
    fn default() -> Self {
        Self::new(DEFAULT_AVAILABLE_CODE, AvailabilityMode::Daily)
    }
}

impl AvailabilityChecker {
    pub fn new(available_code: i64, mode: AvailabilityMode) -> Self {
        Self {
            available_code,
            mode,
        }
    }

    pub fn available_code(&self) -> i64 {
        self.available_code
    }

    pub fn mode(&self) -> AvailabilityMode {
        self.mode
    }

    /// Decide availability of one resource over `range`.
    pub fn check(&self, entries: &[DailyAvailability], range: &StayRange) -> Verdict {
        if entries.is_empty() {
            return Verdict::Unknown;
        }
        let open = match self.mode {
            // a list shorter than the stay is not read as one aggregate code
            AvailabilityMode::Daily => (0..range.nights())
                .all(|night| entries.get(night).is_some_and(|d| d.is_open(self.available_code))),
            AvailabilityMode::Aggregate => entries[0].is_open(self.available_code),
        };
        if open {
            Verdict::Available
        } else {
            Verdict::Unavailable
        }
    }

    /// [`check`](Self::check) as a `Result`, surfacing the unknown case as [`WatchError::DataIncomplete`].
    pub fn is_available(&self, resource: &str, entries: &[DailyAvailability], range: &StayRange) -> Result<bool> {
        match self.check(entries, range) {
            Verdict::Available => Ok(true),
            Verdict::Unavailable => Ok(false),
            Verdict::Unknown => Err(WatchError::DataIncomplete(resource.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(nights: u64) -> StayRange {
        let start = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        StayRange::new(start, start.checked_add_days(Days::new(nights)).unwrap()).unwrap()
    }

    fn days(codes: &[i64]) -> Vec<DailyAvailability> {
        codes.iter().map(|&c| DailyAvailability::new(c, None)).collect()
    }

    #[test]
    fn all_nights_open_is_available() {
        let checker = AvailabilityChecker::default();
        assert_eq!(checker.check(&days(&[5, 5]), &range(2)), Verdict::Available);
    }

    #[test]
    fn one_closed_night_is_unavailable() {
        let checker = AvailabilityChecker::default();
        assert_eq!(checker.check(&days(&[5, 2]), &range(2)), Verdict::Unavailable);
    }

    #[test]
    fn missing_nights_are_unavailable() {
        let checker = AvailabilityChecker::default();
        assert_eq!(checker.check(&days(&[5]), &range(3)), Verdict::Unavailable);
        // the same single entry only counts for the whole stay in aggregate mode
        assert!(!checker.is_available("Cabin 4", &days(&[5]), &range(3)).unwrap());
        let aggregate = AvailabilityChecker::new(DEFAULT_AVAILABLE_CODE, AvailabilityMode::Aggregate);
        assert!(aggregate.is_available("Cabin 4", &days(&[5]), &range(3)).unwrap());
    }

    #[test]
    fn extra_trailing_entries_are_ignored() {
        let checker = AvailabilityChecker::default();
        assert_eq!(checker.check(&days(&[5, 5, 1]), &range(2)), Verdict::Available);
    }

    #[test]
    fn zero_quota_closes_the_night() {
        let checker = AvailabilityChecker::default();
        let entries = vec![DailyAvailability::new(5, Some(3)), DailyAvailability::new(5, Some(0))];
        assert_eq!(checker.check(&entries, &range(2)), Verdict::Unavailable);
    }

    #[test]
    fn missing_code_closes_the_night() {
        let checker = AvailabilityChecker::default();
        let entries: Vec<DailyAvailability> =
            serde_json::from_str(r#"[{"availability": 5}, {"remainingQuota": 4}]"#).unwrap();
        assert_eq!(checker.check(&entries, &range(2)), Verdict::Unavailable);
    }

    #[test]
    fn no_data_is_unknown_not_unavailable() {
        let checker = AvailabilityChecker::default();
        assert_eq!(checker.check(&[], &range(2)), Verdict::Unknown);
        let err = checker.is_available("Cabin 4", &[], &range(2)).unwrap_err();
        assert!(matches!(err.downcast_ref::<WatchError>(), Some(WatchError::DataIncomplete(_))));
    }

    #[test]
    fn custom_available_code() {
        let checker = AvailabilityChecker::new(1, AvailabilityMode::Daily);
        assert_eq!(checker.check(&days(&[1, 1]), &range(2)), Verdict::Available);
        assert_eq!(checker.check(&days(&[5, 5]), &range(2)), Verdict::Unavailable);
    }

    #[test]
    fn aggregate_mode_compares_single_code() {
        let checker = AvailabilityChecker::new(5, AvailabilityMode::Aggregate);
        assert_eq!(checker.check(&days(&[5]), &range(4)), Verdict::Available);
        assert_eq!(checker.check(&days(&[0]), &range(4)), Verdict::Unavailable);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        assert!(StayRange::new(d, d).is_err());
        assert_eq!(range(3).dates().count(), 3);
    }

    #[test]
    fn map_response_decodes() {
        let body = r#"{
            "mapId": -2147483464,
            "mapAvailabilities": [1],
            "resourceAvailabilities": {
                "-2147483000": [{"availability": 5, "remainingQuota": null}, {"availability": 5, "remainingQuota": null}],
                "-2147482999": [{"availability": 1, "remainingQuota": null}]
            }
        }"#;
        let map: MapAvailability = serde_json::from_str(body).unwrap();
        assert_eq!(map.map_id, Some(-2147483464));
        assert_eq!(map.resource_availabilities.len(), 2);
        assert_eq!(map.resource_availabilities[&-2147483000].len(), 2);
    }
}
