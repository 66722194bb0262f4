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

//! # Park Catalog
//!
//! Side-effect free resolution of the static catalog: park names to location
//! ids, category names to roofed category ids, and a park's resource table to
//! the roofed resources worth checking.
//!
//! The structs mirror the reservation API's JSON as observed. Every field that
//! the site has been seen to omit is optional.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::watch_errors::WatchError;

/// Booking category of "Roofed Accommodation" on the reservation site.
pub const ROOFED_BOOKING_CATEGORY_ID: i64 = 2;

/// Category name keywords used when the user supplies none.
pub const DEFAULT_CATEGORY_KEYWORDS: &[&str] = &[
    "cabin",
    "cottage",
    "shelter",
    "roof",
    "yurt",
    "otent",
    "rustic",
    "soft-sided",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedValue {
    #[serde(default)]
    pub culture_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn first_localized<'a>(values: &'a [LocalizedValue], pick: impl Fn(&'a LocalizedValue) -> Option<&'a str>) -> Option<&'a str> {
    values.first().and_then(pick).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocation {
    pub resource_location_id: i64,
    #[serde(default)]
    pub root_map_id: Option<i64>,
    #[serde(default)]
    pub localized_values: Vec<LocalizedValue>,
}

impl ResourceLocation {
    pub fn full_name(&self) -> &str {
        first_localized(&self.localized_values, |v| v.full_name.as_deref()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCategory {
    pub resource_category_id: i64,
    #[serde(default)]
    pub localized_values: Vec<LocalizedValue>,
}

impl ResourceCategory {
    pub fn name(&self) -> &str {
        first_localized(&self.localized_values, |v| v.name.as_deref()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCategory {
    pub booking_category_id: i64,
    #[serde(default)]
    pub localized_values: Vec<LocalizedValue>,
}

impl BookingCategory {
    pub fn name(&self) -> &str {
        first_localized(&self.localized_values, |v| v.name.as_deref()).unwrap_or("")
    }
}

/// One entry of `/api/resourcelocation/resources`, which is keyed by resource id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResource {
    #[serde(default)]
    pub resource_category_id: Option<i64>,
    #[serde(default)]
    pub localized_values: Vec<LocalizedValue>,
    #[serde(default)]
    pub map_ids: Vec<i64>,
}

pub type LocationResources = BTreeMap<i64, LocationResource>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkMap {
    pub map_id: i64,
    #[serde(default)]
    pub map_resources: Option<Vec<IgnoredAny>>,
}

/// A park selected for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Park {
    pub name: String,
    pub location_id: i64,
    pub root_map_id: Option<i64>,
}

/// A roofed, bookable unit at a park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    #[serde(skip)]
    pub map_ids: Vec<i64>,
}

/// Lowercase and collapse runs of whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a user-typed park name against the catalog.
///
/// An exact (normalized) name wins. Otherwise the query must be a substring of
/// exactly one park name.
pub fn pick_location(locations: &[ResourceLocation], query: &str) -> Result<Park> {
    let q = normalize(query);
    let exact = locations.iter().find(|l| normalize(l.full_name()) == q);
    let chosen = match exact {
        Some(l) => l,
        None => {
            let partial: Vec<&ResourceLocation> = locations
                .iter()
                .filter(|l| !q.is_empty() && normalize(l.full_name()).contains(&q))
                .collect();
            match partial.as_slice() {
                [] => return Err(WatchError::ParkNotFound(query.to_string()).into()),
                [only] => *only,
                many => {
                    let candidates = many
                        .iter()
                        .take(10)
                        .map(|l| l.full_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(WatchError::AmbiguousPark {
                        query: query.to_string(),
                        candidates,
                    }
                    .into());
                }
            }
        }
    };

    let name = match chosen.full_name() {
        "" => query.to_string(),
        full => full.to_string(),
    };
    Ok(Park {
        name,
        location_id: chosen.resource_location_id,
        root_map_id: chosen.root_map_id,
    })
}

/// Ids of categories whose name contains any keyword, case-insensitively.
pub fn roofed_category_ids<S: AsRef<str>>(categories: &[ResourceCategory], keywords: &[S]) -> BTreeSet<i64> {
    let keys: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    categories
        .iter()
        .filter(|c| {
            let name = c.name().to_lowercase();
            keys.iter().any(|k| name.contains(k.as_str()))
        })
        .map(|c| c.resource_category_id)
        .collect()
}

/// Keep the resources whose category is one of `category_ids`.
pub fn roofed_resources(resources: &LocationResources, category_ids: &BTreeSet<i64>) -> BTreeMap<i64, Resource> {
    resources
        .iter()
        .filter(|(_, r)| r.resource_category_id.is_some_and(|c| category_ids.contains(&c)))
        .map(|(&id, r)| {
            let name = first_localized(&r.localized_values, |v| v.name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string());
            let resource = Resource {
                resource_id: id,
                name,
                category_id: r.resource_category_id,
                map_ids: r.map_ids.clone(),
            };
            (id, resource)
        })
        .collect()
}

/// Maps that actually hold resources, in catalog order.
pub fn bookable_map_ids(maps: &[ParkMap]) -> Vec<i64> {
    maps.iter()
        .filter(|m| m.map_resources.as_ref().is_some_and(|r| !r.is_empty()))
        .map(|m| m.map_id)
        .collect()
}
