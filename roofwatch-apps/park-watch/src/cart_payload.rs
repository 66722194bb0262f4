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

//! # Cart Payload Builder
//!
//! Side-effect free construction of the `/api/cart/commit` body.
//!
//! The site expects the whole cart document back with the new booking and its
//! resource blocker appended. Fields this client does not understand must
//! survive the round trip, so the cart stays a `serde_json::Value` and only
//! the handful of fields read here are looked up by name.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::availability_checker::StayRange;
use crate::watch_errors::WatchError;

/// Capacity/rate category meaning "any" on the reservation site.
const ANY_CATEGORY_ID: i64 = -32768;

/// Cart collections that must be present (possibly empty) in a commit.
const CART_COLLECTIONS: &[&str] = &[
    "resourceNonSpecificBlockers",
    "resourceZoneBlockers",
    "resourceZoneEntryBlockers",
    "waitlistApplications",
    "lineItems",
    "sales",
    "shipments",
];

/// Cart collections that, when non-empty, mean the user already has something in the cart.
const CART_ITEM_COLLECTIONS: &[&str] = &["bookings", "lineItems", "sales", "shipments", "giftCards"];

/// The parts of `/api/cart` this client relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub cart_uid: String,
    pub transaction_uid: Option<String>,
    pub has_items: bool,
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Open transaction of the cart, either `newTransaction.cartTransactionUid` or `createTransactionUid`.
pub fn transaction_uid(cart: &Value) -> Option<String> {
    non_empty_str(cart.pointer("/newTransaction/cartTransactionUid"))
        .or_else(|| non_empty_str(cart.get("createTransactionUid")))
}

pub fn cart_has_items(cart: &Value) -> bool {
    CART_ITEM_COLLECTIONS.iter().any(|key| match cart.get(*key) {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(items)) => !items.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    })
}

impl CartSnapshot {
    /// Read the cart. A cart without `cartUid` means the session cookies were not accepted.
    pub fn from_cart(cart: &Value) -> Result<Self> {
        let cart_uid = non_empty_str(cart.get("cartUid")).ok_or_else(|| WatchError::Auth {
            status: None,
            detail: "cart response has no cartUid".to_string(),
        })?;
        Ok(Self {
            cart_uid,
            transaction_uid: transaction_uid(cart),
            has_items: cart_has_items(cart),
        })
    }
}

/// What to put in the cart.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub resource_id: i64,
    pub resource_location_id: i64,
    pub range: StayRange,
    pub party_size: u32,
    pub booking_category_id: i64,
    pub culture_name: String,
}

/// A commit body together with the client-generated identifiers inside it.
#[derive(Debug, Clone)]
pub struct CommitPayload {
    pub body: Value,
    pub booking_uid: Uuid,
    pub resource_blocker_uid: Uuid,
}

impl CommitPayload {
    /// Build with fresh v4 identifiers and the current time.
    pub fn fresh(cart: &Value, transaction_uid: &str, request: &BookingRequest) -> Result<Self> {
        Self::build(cart, transaction_uid, request, Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    pub fn build(
        cart: &Value,
        transaction_uid: &str,
        request: &BookingRequest,
        booking_uid: Uuid,
        resource_blocker_uid: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let snapshot = CartSnapshot::from_cart(cart)?;
        let Value::Object(original) = cart else {
            return Err(WatchError::Decode {
                url: "/api/cart".to_string(),
                reason: "cart is not a JSON object".to_string(),
            }
            .into());
        };

        let now = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let start = request.range.start().format("%Y-%m-%d").to_string();
        let end = request.range.end().format("%Y-%m-%d").to_string();

        let booking = json!({
            "bookingUid": booking_uid,
            "cartUid": snapshot.cart_uid,
            "bookingCategoryId": request.booking_category_id,
            "bookingModel": 0,
            "newVersion": {
                "cartTransactionUid": transaction_uid,
                "bookingMembers": [],
                "bookingVehicles": [],
                "bookingBoats": [],
                "bookingCapacityCategoryCounts": [
                    {"capacityCategoryId": ANY_CATEGORY_ID, "subCapacityCategoryId": null, "count": request.party_size}
                ],
                "rateCategoryId": ANY_CATEGORY_ID,
                "resourceBlockerUids": [resource_blocker_uid],
                "resourceNonSpecificBlockerUids": [],
                "resourceZoneBlockerUids": [],
                "resourceZoneEntryBlockerUids": [],
                "startDate": start,
                "endDate": end,
                "releasePersonalInformation": false,
                "equipmentCategoryId": null,
                "subEquipmentCategoryId": null,
                "occupant": {
                    "contact": {
                        "email": "",
                        "contactName": "",
                        "phoneNumberCountryCode": null,
                        "phoneNumber": ""
                    },
                    "address": {},
                    "allowMarketing": false,
                    "phoneNumbers": {},
                    "preferredCultureName": request.culture_name,
                    "firstName": "",
                    "lastName": ""
                },
                "requiresCheckout": false,
                "bookingStatus": 0,
                "completedDate": now,
                "arrivalComment": "",
                "entryPointResourceId": null,
                "exitPointResourceId": null,
                "bookingSurcharges": [],
                "consentToRelease": false,
                "equipmentDescription": "",
                "groupHoldUid": "",
                "organizationName": "",
                "passExpiryDate": null,
                "passNumber": "",
                "resourceLocationId": request.resource_location_id,
                "checkInTime": null,
                "checkOutTime": null,
                "deferredPayment": false
            },
            "createTransactionUid": transaction_uid,
            "currentVersion": null,
            "history": [],
            "drafts": [],
            "referenceNumberPostfix": ""
        });

        let resource_blocker = json!({
            "blockerType": 0,
            "cartUid": snapshot.cart_uid,
            "resourceBlockerUid": resource_blocker_uid,
            "bookingUid": booking_uid,
            "groupHoldUid": "",
            "isReservation": true,
            "newVersion": {
                "creationDate": now,
                "cartTransactionUid": transaction_uid,
                "startDate": start,
                "endDate": end,
                "resourceId": request.resource_id,
                "resourceLocationId": request.resource_location_id,
                "status": 0
            }
        });

        let mut cart: Map<String, Value> = original.clone();
        if non_empty_str(cart.get("createTransactionUid")).is_none() {
            cart.insert("createTransactionUid".to_string(), json!(transaction_uid));
        }
        append(&mut cart, "bookings", booking);
        append(&mut cart, "resourceBlockers", resource_blocker);
        for key in CART_COLLECTIONS {
            match cart.get(*key) {
                Some(Value::Null) | None => {
                    cart.insert(key.to_string(), json!([]));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            body: json!({ "cart": Value::Object(cart) }),
            booking_uid,
            resource_blocker_uid,
        })
    }
}

fn append(cart: &mut Map<String, Value>, key: &str, item: Value) {
    match cart.get_mut(key) {
        Some(Value::Array(items)) => items.push(item),
        _ => {
            cart.insert(key.to_string(), Value::Array(vec![item]));
        }
    }
}
