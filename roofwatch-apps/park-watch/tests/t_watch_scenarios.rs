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

//! End-to-end watch runs against an in-memory reservation site.
//!
//! Run with:
//!     cargo test --test t_watch_scenarios


use fake_reservations::{CABIN_CATEGORY, CAMPSITE_CATEGORY, FakeReservations, settings};
use roofwatch_park_watch::{OutcomeStatus, ReserveMode, SkipReason, run_watch};
use serde_json::json;

const PINERY: i64 = -2147483624;
const PINERY_MAP: i64 = -2147483464;
const KILLBEAR: i64 = -2147483603;
const KILLBEAR_MAP: i64 = -2147483300;

fn pinery() -> FakeReservations {
    FakeReservations::new()
        .with_park(
            PINERY,
            "Pinery Provincial Park",
            PINERY_MAP,
            &[
                (1, "Cabin 1", CABIN_CATEGORY),
                (2, "Cabin 2", CABIN_CATEGORY),
                (5, "Cabin 5", CABIN_CATEGORY),
                (40, "Site 40", CAMPSITE_CATEGORY),
            ],
        )
        .with_nights(PINERY_MAP, 1, &[(5, Some(1)), (2, Some(0))])
        .all_open(PINERY_MAP, &[2, 5, 40], 2)
}

fn two_parks() -> FakeReservations {
    pinery()
        .with_park(
            KILLBEAR,
            "Killbear Provincial Park",
            KILLBEAR_MAP,
            &[(11, "Cabin 11", CABIN_CATEGORY), (12, "Cabin 12", CABIN_CATEGORY)],
        )
        .all_open(KILLBEAR_MAP, &[11, 12], 2)
}

#[tokio::test]
async fn test_report_lists_open_roofed_resources() {
    let api = pinery();
    let s = settings(&["Pinery"], &["Cabin 1", "Cabin 2"], |_| {});
    let report = run_watch(&api, &s).await.expect("run");

    assert_eq!(report.results.len(), 1);
    let park = &report.results[0];
    assert_eq!(park.park, "Pinery Provincial Park");
    assert_eq!(park.resource_location_id, PINERY);
    let names: Vec<&str> = park.available.iter().map(|r| r.name.as_str()).collect();
    // Cabin 1 is closed on the second night, Site 40 is not roofed
    assert_eq!(names, vec!["Cabin 2", "Cabin 5"]);

    let m = park.preferred_match.as_ref().expect("preferred match");
    assert_eq!(m.name, "Cabin 2");
    assert_eq!(report.match_lines(), vec!["MATCH: Pinery Provincial Park -> Cabin 2 (resourceId 2)"]);
    assert!(report.reservations.is_empty());
    assert_eq!(api.commit_count(), 0);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_availability_query_carries_cart_and_party() {
    let api = pinery();
    let s = settings(&["Pinery Provincial Park"], &[], |cli| cli.party_size = Some(4));
    run_watch(&api, &s).await.expect("run");

    let queries = api.availability_queries.borrow();
    assert_eq!(queries.len(), 1, "the empty map is not queried");
    assert_eq!(queries[0].map_id, PINERY_MAP);
    assert_eq!(queries[0].booking_category_id, 2);
    assert_eq!(queries[0].party_size, 4);
    assert_eq!(queries[0].cart_uid, "cart-1");
    assert_eq!(queries[0].cart_transaction_uid, "tx-1");
    assert!(queries[0].daily);
}

#[tokio::test]
async fn test_busy_cart_blocks_reservation() {
    let api = pinery().with_cart(json!({
        "cartUid": "cart-1",
        "newTransaction": {"cartTransactionUid": "tx-1"},
        "bookings": [{"bookingUid": "someone-else"}]
    }));
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    assert_eq!(api.commit_count(), 0, "no write may be issued");
    assert_eq!(api.new_transactions.get(), 0);
    assert_eq!(report.reservations.len(), 1);
    assert_eq!(report.reservations[0].status, OutcomeStatus::Skipped);
    assert_eq!(report.reservations[0].skip_reason, Some(SkipReason::CartConflict));
    assert!(report.reservation_lines().is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_busy_cart_allowed_on_request() {
    let api = pinery().with_cart(json!({
        "cartUid": "cart-1",
        "newTransaction": {"cartTransactionUid": "tx-1"},
        "lineItems": [{"id": 1}]
    }));
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| {
        cli.reserve = true;
        cli.allow_existing_cart = true;
    });
    let report = run_watch(&api, &s).await.expect("run");
    assert_eq!(api.commit_count(), 1);
    assert!(report.reservations[0].success);
}

#[tokio::test]
async fn test_no_preference_hit_omits_match() {
    let api = pinery();
    let s = settings(&["Pinery"], &["Yurt 9"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    let park = &report.results[0];
    assert_eq!(park.available.len(), 2);
    assert!(park.preferred_match.is_none());
    assert!(report.match_lines().is_empty());

    let doc = serde_json::to_value(&report).unwrap();
    assert!(doc["results"][0].get("preferredMatch").is_none());
    assert_eq!(doc["results"][0]["available"][0]["name"], "Cabin 2");
    assert_eq!(api.commit_count(), 0);
}

#[tokio::test]
async fn test_reserve_first_commits_once() {
    let api = two_parks();
    let s = settings(&["Pinery", "Killbear"], &["Cabin 2", "Cabin 1"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    // Pinery matches "Cabin 2"; at Killbear "Cabin 1" is a substring of Cabin 11
    let names: Vec<&str> = report.matches().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Cabin 2", "Cabin 11"]);
    assert_eq!(api.commit_count(), 1);
    assert_eq!(api.new_transactions.get(), 0, "first attempt reuses the cart transaction");

    let statuses: Vec<OutcomeStatus> = report.reservations.iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![OutcomeStatus::Reserved, OutcomeStatus::Skipped]);
    assert_eq!(report.reservations[1].skip_reason, Some(SkipReason::NotFirstMatch));

    let commits = api.commits.borrow();
    let commit = &commits[0];
    let blocker = &commit["cart"]["resourceBlockers"][0];
    assert_eq!(blocker["newVersion"]["cartTransactionUid"], "tx-1");
    assert_eq!(
        blocker["resourceBlockerUid"],
        json!(report.reservations[0].resource_blocker_uid.unwrap().to_string())
    );
    assert_eq!(
        report.reservation_lines(),
        vec!["RESERVED: Pinery Provincial Park -> Cabin 2 (resourceId 2)"]
    );
}

#[tokio::test]
async fn test_reserve_all_commits_per_park_and_keeps_earlier_bookings() {
    let api = two_parks();
    let s = settings(&["Pinery", "Killbear"], &["Cabin 2", "Cabin 11"], |cli| {
        cli.reserve = true;
        cli.reserve_mode = Some(ReserveMode::All);
    });
    let report = run_watch(&api, &s).await.expect("run");

    assert_eq!(api.commit_count(), 2);
    assert_eq!(api.new_transactions.get(), 1, "second attempt opens its own transaction");
    assert!(report.reservations.iter().all(|o| o.success));

    let commits = api.commits.borrow();
    let second = &commits[1]["cart"];
    assert_eq!(second["bookings"].as_array().unwrap().len(), 2);
    assert_eq!(second["resourceBlockers"][1]["newVersion"]["resourceId"], 11);
    assert_eq!(second["resourceBlockers"][1]["newVersion"]["cartTransactionUid"], "tx-new-1");
}

#[tokio::test]
async fn test_rejected_commit_fails_without_retry() {
    let api = two_parks().rejecting_commits(409);
    let s = settings(&["Pinery", "Killbear"], &["Cabin 2", "Cabin 11"], |cli| {
        cli.reserve = true;
        cli.reserve_mode = Some(ReserveMode::All);
    });
    let report = run_watch(&api, &s).await.expect("run");

    assert_eq!(api.commit_count(), 2, "one commit per match, never retried");
    let failed = &report.reservations[0];
    assert_eq!(failed.status, OutcomeStatus::Failed);
    assert_eq!(failed.http_status, Some(409));
    assert!(failed.reason.as_deref().unwrap().contains("app_version"));
    assert!(report.reservation_lines()[0].starts_with("RESERVE FAILED: Pinery Provincial Park -> Cabin 2:"));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_missing_xsrf_skips_writes() {
    let api = pinery().without_xsrf();
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    assert_eq!(api.commit_count(), 0);
    assert_eq!(report.reservations[0].skip_reason, Some(SkipReason::MissingXsrfToken));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_undecodable_map_reports_unknown() {
    let api = pinery().with_broken_map(PINERY_MAP);
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    let park = &report.results[0];
    assert!(park.available.is_empty());
    let unknown: Vec<i64> = park.unknown.iter().map(|r| r.resource_id).collect();
    assert_eq!(unknown, vec![1, 2, 5]);
    assert!(park.preferred_match.is_none());
    assert_eq!(api.commit_count(), 0);
}

#[tokio::test]
async fn test_empty_availability_list_is_unknown() {
    let api = pinery().with_nights(PINERY_MAP, 5, &[]);
    let s = settings(&["Pinery"], &[], |_| {});
    let report = run_watch(&api, &s).await.expect("run");

    let park = &report.results[0];
    assert_eq!(park.available.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![2]);
    assert_eq!(park.unknown.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![5]);
}

#[tokio::test]
async fn test_unknown_park_is_skipped() {
    let api = two_parks();
    let s = settings(&["Algonquin", "Provincial Park", "Killbear"], &[], |_| {});
    let report = run_watch(&api, &s).await.expect("run");

    // "Algonquin" matches nothing, "Provincial Park" matches both
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].park, "Killbear Provincial Park");
}

#[tokio::test]
async fn test_cart_without_transaction_gets_one() {
    let api = pinery().with_cart(json!({"cartUid": "cart-9"}));
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| cli.reserve = true);
    run_watch(&api, &s).await.expect("run");

    assert_eq!(api.new_transactions.get(), 1, "opened once, reused by the commit");
    assert_eq!(api.availability_queries.borrow()[0].cart_transaction_uid, "tx-new-1");
    let commits = api.commits.borrow();
    let commit = &commits[0];
    assert_eq!(commit["cart"]["createTransactionUid"], "tx-new-1");
}

#[tokio::test]
async fn test_expired_session_is_fatal() {
    let api = pinery().with_cart(json!({"bookings": []}));
    let s = settings(&["Pinery"], &[], |_| {});
    let err = run_watch(&api, &s).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Re-export browser cookies"));
}

#[tokio::test]
async fn test_resource_missing_from_map_table_is_unknown() {
    let api = FakeReservations::new()
        .with_park(
            PINERY,
            "Pinery Provincial Park",
            PINERY_MAP,
            &[(2, "Cabin 2", CABIN_CATEGORY), (3, "Cabin 3", CABIN_CATEGORY)],
        )
        .all_open(PINERY_MAP, &[2], 2);
    let s = settings(&["Pinery"], &["Cabin 3", "Cabin 2"], |_| {});
    let report = run_watch(&api, &s).await.expect("run");

    let park = &report.results[0];
    assert_eq!(park.available.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![2]);
    assert_eq!(park.unknown.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![3]);
    assert_eq!(park.preferred_match.as_ref().map(|m| m.resource_id), Some(2));
}

#[tokio::test]
async fn test_park_without_bookable_maps_reports_unknown() {
    let api = pinery().without_bookable_maps(PINERY);
    let s = settings(&["Pinery"], &["Cabin 2"], |cli| cli.reserve = true);
    let report = run_watch(&api, &s).await.expect("run");

    assert!(api.availability_queries.borrow().is_empty());
    let park = &report.results[0];
    assert!(park.available.is_empty());
    assert_eq!(park.unknown.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![1, 2, 5]);
    assert!(park.preferred_match.is_none());
    assert_eq!(api.commit_count(), 0);
}

#[tokio::test]
async fn test_server_error_on_one_map_keeps_other_parks() {
    let api = two_parks().with_failing_map(KILLBEAR_MAP, 500);
    let s = settings(&["Pinery", "Killbear"], &["Cabin 2", "Cabin 11"], |_| {});
    let report = run_watch(&api, &s).await.expect("run continues past the failed map");

    assert_eq!(report.results.len(), 2);
    let pinery = &report.results[0];
    assert_eq!(pinery.preferred_match.as_ref().map(|m| m.name.as_str()), Some("Cabin 2"));
    let killbear = &report.results[1];
    assert!(killbear.available.is_empty());
    assert_eq!(killbear.unknown.iter().map(|r| r.resource_id).collect::<Vec<_>>(), vec![11, 12]);
    assert!(killbear.preferred_match.is_none());
}

#[tokio::test]
async fn test_session_rejected_on_map_is_fatal() {
    let api = two_parks().with_failing_map(KILLBEAR_MAP, 403);
    let s = settings(&["Pinery", "Killbear"], &[], |_| {});
    let err = run_watch(&api, &s).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Re-export browser cookies"));
}
