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

//! # Preference Matcher
//!
//! Side-effect free ranking of a park's available resources against the
//! user's ordered preferred-site list.
//!
//! Matching is case-insensitive on whitespace-normalized names: a preference
//! matches a resource when it equals, or is a substring of, the resource name
//! ("Cabin 1" matches "Cabin 12").
//!
//! The winner does not depend on the order the API listed resources in: within
//! the winning preference entry an exact name beats a substring hit, then the
//! smallest normalized name, then the smallest resource id.

use std::cmp::Ordering;

use serde::Serialize;

use crate::park_catalog::{Park, Resource, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    Substring,
}

/// How `name` matches a single preference string, if at all.
pub fn match_kind(name: &str, preference: &str) -> Option<MatchKind> {
    let pref = normalize(preference);
    if pref.is_empty() {
        return None;
    }
    let name = normalize(name);
    if name == pref {
        Some(MatchKind::Exact)
    } else if name.contains(&pref) {
        Some(MatchKind::Substring)
    } else {
        None
    }
}

/// Index of the first preference entry that matches `name`.
pub fn match_preference<S: AsRef<str>>(name: &str, preferred: &[S]) -> Option<usize> {
    preferred
        .iter()
        .position(|p| match_kind(name, p.as_ref()).is_some())
}

/// The park's selected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub resource_id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub park: String,
    #[serde(skip)]
    pub resource_location_id: i64,
    /// Position of the winning entry in the preference list (0 = top choice).
    pub preference_rank: usize,
}

fn candidate_order(a: &(MatchKind, String, &Resource), b: &(MatchKind, String, &Resource)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| a.2.resource_id.cmp(&b.2.resource_id))
}

/// Highest-priority available resource, or `None` when no preference matches.
pub fn best_match<'a, S: AsRef<str>>(available: &'a [Resource], preferred: &[S]) -> Option<(usize, &'a Resource)> {
    preferred.iter().enumerate().find_map(|(rank, pref)| {
        available
            .iter()
            .filter_map(|r| match_kind(&r.name, pref.as_ref()).map(|kind| (kind, normalize(&r.name), r)))
            .min_by(candidate_order)
            .map(|(_, _, r)| (rank, r))
    })
}

/// [`best_match`] for one park, packaged for reporting and reservation.
pub fn preferred_match<S: AsRef<str>>(park: &Park, available: &[Resource], preferred: &[S]) -> Option<MatchResult> {
    best_match(available, preferred).map(|(rank, r)| MatchResult {
        resource_id: r.resource_id,
        name: r.name.clone(),
        category_id: r.category_id,
        park: park.name.clone(),
        resource_location_id: park.location_id,
        preference_rank: rank,
    })
}

/// Order resources for display: by name, then id.
pub fn sort_available(available: &mut [Resource]) {
    available.sort_by(|a, b| a.name.cmp(&b.name).then(a.resource_id.cmp(&b.resource_id)));
}
