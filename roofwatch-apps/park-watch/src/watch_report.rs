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

//! Run output: the JSON document printed on stdout and the one-line markers
//! printed on stderr for cron/e-mail piping.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::park_catalog::Resource;
use crate::preference_matcher::MatchResult;
use crate::reservation_trigger::{OutcomeStatus, ReservationOutcome, SkipReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkReport {
    pub park: String,
    pub resource_location_id: i64,
    pub available: Vec<Resource>,
    /// Resources for which no usable availability data came back.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_match: Option<MatchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub party_size: u32,
    pub available_code: i64,
    pub results: Vec<ParkReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reservations: Vec<ReservationOutcome>,
}

impl WatchReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serialize watch report")
    }

    pub fn matches(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter_map(|r| r.preferred_match.as_ref())
    }

    /// `MATCH:` lines, one per park with a preferred match.
    pub fn match_lines(&self) -> Vec<String> {
        self.matches()
            .map(|m| format!("MATCH: {} -> {} (resourceId {})", m.park, m.name, m.resource_id))
            .collect()
    }

    /// `RESERVED:` / `RESERVE FAILED:` lines. Skips are logged, not marked.
    pub fn reservation_lines(&self) -> Vec<String> {
        self.reservations
            .iter()
            .filter_map(|o| match o.status {
                OutcomeStatus::Reserved => Some(format!(
                    "RESERVED: {} -> {} (resourceId {})",
                    o.park, o.name, o.resource_id
                )),
                OutcomeStatus::Failed => Some(format!(
                    "RESERVE FAILED: {} -> {}: {}",
                    o.park,
                    o.name,
                    o.reason.as_deref().unwrap_or("unknown error")
                )),
                OutcomeStatus::Skipped => None,
            })
            .collect()
    }

    /// 0 when every attempted reservation went through, 2 when one failed or
    /// writes could not be authorized.
    pub fn exit_code(&self) -> i32 {
        let blocked = self.reservations.iter().any(|o| {
            o.status == OutcomeStatus::Failed || o.skip_reason == Some(SkipReason::MissingXsrfToken)
        });
        if blocked { 2 } else { 0 }
    }
}
