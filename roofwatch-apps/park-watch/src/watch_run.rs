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

//! # Watch run
//!
//! One pass over the configured parks:
//!
//! 1. resolve park names against the catalog,
//! 2. keep the roofed resources of each park,
//! 3. fetch availability map by map and classify every resource,
//! 4. pick the preferred match per park,
//! 5. optionally hand the matches to the [`ReservationTrigger`].
//!
//! Requests are awaited one after the other; the client's pacer spaces them.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::Utc;

use crate::availability_checker::{AvailabilityChecker, AvailabilityMode, DailyAvailability, StayRange, Verdict};
use crate::cart_payload::CartSnapshot;
use crate::park_catalog::{
    Park, ROOFED_BOOKING_CATEGORY_ID, Resource, bookable_map_ids, pick_location, roofed_category_ids,
    roofed_resources,
};
use crate::preference_matcher::{MatchResult, preferred_match, sort_available};
use crate::reservation_trigger::{BookingTemplate, ReservationTrigger};
use crate::reservations_client::{MapAvailabilityQuery, ReservationsApi};
use crate::watch_config::{ParkTarget, WatchSettings};
use crate::watch_errors::WatchError;
use crate::watch_report::{ParkReport, WatchReport};

/// Cart identifiers the availability endpoint requires.
#[derive(Debug, Clone)]
struct CartIds {
    cart_uid: String,
    transaction_uid: String,
}

/// Rank used to combine verdicts of a resource listed on several maps.
fn verdict_rank(v: Verdict) -> u8 {
    match v {
        Verdict::Available => 2,
        Verdict::Unavailable => 1,
        Verdict::Unknown => 0,
    }
}

fn record(verdicts: &mut BTreeMap<i64, Verdict>, resource_id: i64, verdict: Verdict) {
    verdicts
        .entry(resource_id)
        .and_modify(|v| {
            if verdict_rank(verdict) > verdict_rank(*v) {
                *v = verdict;
            }
        })
        .or_insert(verdict);
}

fn is_park_lookup_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<WatchError>(),
        Some(WatchError::ParkNotFound(_) | WatchError::AmbiguousPark { .. })
    )
}

/// Expired sessions stop the run; any other map failure only degrades that map.
fn is_session_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<WatchError>(), Some(WatchError::Auth { .. }))
}

fn classify(
    checker: &AvailabilityChecker,
    resource: &Resource,
    entries: &[DailyAvailability],
    range: &StayRange,
) -> Verdict {
    match checker.is_available(&resource.name, entries, range) {
        Ok(true) => Verdict::Available,
        Ok(false) => Verdict::Unavailable,
        Err(e) => {
            tracing::debug!("{:#}", e);
            Verdict::Unknown
        }
    }
}

async fn open_cart<A: ReservationsApi>(api: &A) -> Result<(serde_json::Value, CartIds)> {
    let mut cart = api.cart().await?;
    let snapshot = CartSnapshot::from_cart(&cart)?;
    let transaction_uid = match snapshot.transaction_uid {
        Some(uid) => uid,
        None => {
            tracing::info!("Cart has no open transaction; requesting one");
            let uid = api.new_transaction().await?;
            // the first commit reuses it
            cart["createTransactionUid"] = serde_json::Value::String(uid.clone());
            uid
        }
    };
    if snapshot.has_items {
        tracing::info!("Cart {} already holds items", snapshot.cart_uid);
    }
    Ok((
        cart,
        CartIds {
            cart_uid: snapshot.cart_uid,
            transaction_uid,
        },
    ))
}

async fn check_park<A: ReservationsApi>(
    api: &A,
    settings: &WatchSettings,
    park: Park,
    preferred_sites: &[String],
    category_ids: &BTreeSet<i64>,
    cart: &CartIds,
) -> Result<ParkReport> {
    let resources = api.location_resources(park.location_id).await?;
    let roofed = roofed_resources(&resources, category_ids);
    let maps = api.maps(park.location_id).await?;
    let map_ids = bookable_map_ids(&maps);
    tracing::info!(
        "{}: {} roofed resources across {} maps",
        park.name,
        roofed.len(),
        map_ids.len()
    );

    let mut verdicts: BTreeMap<i64, Verdict> = BTreeMap::new();
    for map_id in map_ids {
        if roofed.is_empty() {
            break;
        }
        let query = MapAvailabilityQuery {
            map_id,
            booking_category_id: ROOFED_BOOKING_CATEGORY_ID,
            range: settings.range,
            party_size: settings.party_size,
            cart_uid: cart.cart_uid.clone(),
            cart_transaction_uid: cart.transaction_uid.clone(),
            daily: settings.checker.mode() == AvailabilityMode::Daily,
            seed: Utc::now().to_rfc3339(),
        };
        match api.map_availability(&query).await {
            Ok(availability) => {
                for (resource_id, entries) in &availability.resource_availabilities {
                    if let Some(resource) = roofed.get(resource_id) {
                        let verdict = classify(&settings.checker, resource, entries, &settings.range);
                        record(&mut verdicts, *resource_id, verdict);
                    }
                }
            }
            Err(e) if !is_session_error(&e) => {
                tracing::warn!("{}: availability of map {} unusable: {:#}", park.name, map_id, e);
                for r in roofed.values() {
                    if r.map_ids.is_empty() || r.map_ids.contains(&map_id) {
                        record(&mut verdicts, r.resource_id, Verdict::Unknown);
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
    // no map reported on these at all
    for resource in roofed.values() {
        if !verdicts.contains_key(&resource.resource_id) {
            tracing::debug!("{}: no availability data for {}", park.name, resource.name);
            verdicts.insert(resource.resource_id, Verdict::Unknown);
        }
    }

    let mut available: Vec<Resource> = Vec::new();
    let mut unknown: Vec<Resource> = Vec::new();
    for (resource_id, verdict) in verdicts {
        let Some(resource) = roofed.get(&resource_id) else {
            continue;
        };
        match verdict {
            Verdict::Available => available.push(resource.clone()),
            Verdict::Unknown => unknown.push(resource.clone()),
            Verdict::Unavailable => {}
        }
    }
    sort_available(&mut available);
    sort_available(&mut unknown);
    if !unknown.is_empty() {
        tracing::warn!("{}: {} resources with unknown availability", park.name, unknown.len());
    }

    let preferred_match = preferred_match(&park, &available, preferred_sites);
    tracing::info!(
        "{}: {} available{}",
        park.name,
        available.len(),
        preferred_match
            .as_ref()
            .map(|m| format!(", preferred match {}", m.name))
            .unwrap_or_default()
    );

    Ok(ParkReport {
        park: park.name,
        resource_location_id: park.location_id,
        available,
        unknown,
        preferred_match,
    })
}

/// Check every configured park and, when enabled, try to reserve the matches.
pub async fn run_watch<A: ReservationsApi>(api: &A, settings: &WatchSettings) -> Result<WatchReport> {
    let locations = api.resource_locations().await?;
    let categories = api.resource_categories().await?;
    let category_ids = roofed_category_ids(&categories, &settings.session.category_keywords);
    if category_ids.is_empty() {
        tracing::warn!(
            "No resource category matches keywords [{}]",
            settings.session.category_keywords.join(", ")
        );
    }

    let (cart, cart_ids) = open_cart(api).await?;

    let mut results = Vec::with_capacity(settings.parks.len());
    for ParkTarget { query, preferred_sites } in &settings.parks {
        let park = match pick_location(&locations, query) {
            Ok(park) => park,
            Err(e) if is_park_lookup_error(&e) => {
                tracing::error!("{:#}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        results.push(check_park(api, settings, park, preferred_sites, &category_ids, &cart_ids).await?);
    }

    let matches: Vec<MatchResult> = results.iter().filter_map(|r| r.preferred_match.clone()).collect();
    let reservations = if settings.policy.auto_reserve && !matches.is_empty() {
        let template = BookingTemplate {
            range: settings.range,
            party_size: settings.party_size,
            booking_category_id: ROOFED_BOOKING_CATEGORY_ID,
            culture_name: settings.session.transport.app_language.clone(),
        };
        let mut trigger = ReservationTrigger::new(settings.policy);
        let outcomes = trigger.run(api, &matches, &cart, &template).await?;
        tracing::debug!("Reservation trigger made {} attempt(s)", trigger.attempts());
        outcomes
    } else {
        Vec::new()
    };

    Ok(WatchReport {
        start: settings.range.start(),
        end: settings.range.end(),
        party_size: settings.party_size,
        available_code: settings.checker.available_code(),
        results,
        reservations,
    })
}

/// Full names of every park in the catalog.
pub async fn list_parks<A: ReservationsApi>(api: &A) -> Result<Vec<String>> {
    let locations = api.resource_locations().await?;
    Ok(locations.iter().map(|l| l.full_name().to_string()).collect())
}

/// `(id, name)` of the resource categories selected by `keywords`.
pub async fn list_roofed_categories<A: ReservationsApi>(api: &A, keywords: &[String]) -> Result<Vec<(i64, String)>> {
    let categories = api.resource_categories().await?;
    let ids = roofed_category_ids(&categories, keywords);
    Ok(categories
        .iter()
        .filter(|c| ids.contains(&c.resource_category_id))
        .map(|c| (c.resource_category_id, c.name().to_string()))
        .collect())
}

/// `(id, name)` of every booking category.
pub async fn list_booking_categories<A: ReservationsApi>(api: &A) -> Result<Vec<(i64, String)>> {
    let categories = api.booking_categories().await?;
    Ok(categories
        .iter()
        .map(|c| (c.booking_category_id, c.name().to_string()))
        .collect())
}
