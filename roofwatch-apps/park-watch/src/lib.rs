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

// Library for roofwatch-park-watch
// Roofed-accommodation availability watcher for Ontario Parks

mod availability_checker;
mod browser_cookies;
mod cart_payload;
mod park_catalog;
mod preference_matcher;
mod reservation_trigger;
mod reservations_client;
mod watch_config;
mod watch_errors;
mod watch_report;
mod watch_run;

// Core decisions
pub use availability_checker::{
    AvailabilityChecker, AvailabilityMode, DEFAULT_AVAILABLE_CODE, DailyAvailability, MapAvailability, StayRange,
    Verdict,
};
pub use preference_matcher::{MatchKind, MatchResult, best_match, match_kind, match_preference, preferred_match, sort_available};
pub use reservation_trigger::{
    BookingTemplate, Decision, OutcomeStatus, ReservationOutcome, ReservationPolicy, ReservationState,
    ReservationTrigger, ReserveMode, SkipReason, Transition,
};

// Catalog and cart documents
pub use cart_payload::{BookingRequest, CartSnapshot, CommitPayload, cart_has_items, transaction_uid};
pub use park_catalog::{
    BookingCategory, DEFAULT_CATEGORY_KEYWORDS, LocalizedValue, LocationResource, LocationResources, Park, ParkMap,
    ROOFED_BOOKING_CATEGORY_ID, Resource, ResourceCategory, ResourceLocation, bookable_map_ids, normalize,
    pick_location, roofed_category_ids, roofed_resources,
};

// Transport
pub use browser_cookies::{BrowserCookie, CookieJar, XSRF_COOKIE_NAME};
pub use reservations_client::{
    DEFAULT_APP_LANGUAGE, DEFAULT_APP_VERSION, DEFAULT_BASE_URL, MapAvailabilityQuery, ReservationsApi,
    ReservationsClient, TransportConfig, host_of,
};

// Run
pub use watch_config::{
    CliOverrides, DEFAULT_CONFIG_PATH, DEFAULT_COOKIE_PATH, DEFAULT_PARTY_SIZE, ParkEntry, ParkTarget, ParkWithSites,
    SessionSettings, WatchConfigFile, WatchSettings,
};
pub use watch_errors::WatchError;
pub use watch_report::{ParkReport, WatchReport};
pub use watch_run::{list_booking_categories, list_parks, list_roofed_categories, run_watch};
