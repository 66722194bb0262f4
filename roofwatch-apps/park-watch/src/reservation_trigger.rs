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

//! # Reservation Trigger
//!
//! Decides whether the selected matches go into the cart, and drives the
//! cart-add sequence for the ones that do.
//!
//! Each match walks `Idle -> Evaluating -> {Skipped, Attempting}` and an
//! attempt ends in `Reserved` or `Failed`. There is exactly one commit per
//! attempt and no retry: the site does not deduplicate cart writes.
//! Checkout is never performed; a reserved resource is only held by a
//! temporary resource blocker.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::availability_checker::StayRange;
use crate::cart_payload::{BookingRequest, CartSnapshot, CommitPayload};
use crate::preference_matcher::MatchResult;
use crate::reservations_client::ReservationsApi;
use crate::watch_errors::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveMode {
    /// Only the first park's match (in park order).
    #[default]
    First,
    /// Every park's match.
    All,
}

impl FromStr for ReserveMode {
    type Err = WatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(ReserveMode::First),
            "all" => Ok(ReserveMode::All),
            other => Err(WatchError::Config(format!(
                "Invalid reserve_mode: {}. Use: first, all",
                other
            ))),
        }
    }
}

impl fmt::Display for ReserveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReserveMode::First => write!(f, "first"),
            ReserveMode::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReservationPolicy {
    pub auto_reserve: bool,
    pub mode: ReserveMode,
    pub allow_existing_cart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AutoReserveDisabled,
    MissingXsrfToken,
    CartConflict,
    NotFirstMatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AutoReserveDisabled => write!(f, "auto-reserve disabled"),
            SkipReason::MissingXsrfToken => {
                write!(f, "XSRF-TOKEN cookie missing; cannot auto-reserve")
            }
            SkipReason::CartConflict => write!(f, "{}", WatchError::CartConflict),
            SkipReason::NotFirstMatch => write!(f, "reserve_mode=first and an earlier match was taken"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationState {
    Idle,
    Evaluating,
    Skipped(SkipReason),
    Attempting,
    Reserved { resource_blocker_uid: Uuid },
    Failed { status: Option<u16>, reason: String },
}

/// Result of evaluation for one match, before any request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Attempt,
    Skip(SkipReason),
}

/// Stay details shared by every booking of the run.
#[derive(Debug, Clone)]
pub struct BookingTemplate {
    pub range: StayRange,
    pub party_size: u32,
    pub booking_category_id: i64,
    pub culture_name: String,
}

impl BookingTemplate {
    fn request_for(&self, m: &MatchResult) -> BookingRequest {
        BookingRequest {
            resource_id: m.resource_id,
            resource_location_id: m.resource_location_id,
            range: self.range,
            party_size: self.party_size,
            booking_category_id: self.booking_category_id,
            culture_name: self.culture_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Reserved,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationOutcome {
    pub park: String,
    pub resource_id: i64,
    pub name: String,
    pub status: OutcomeStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_blocker_uid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ReservationOutcome {
    fn from_state(m: &MatchResult, state: &ReservationState) -> Self {
        let skip_reason = match state {
            ReservationState::Skipped(why) => Some(*why),
            _ => None,
        };
        let (status, reason, resource_blocker_uid, http_status) = match state {
            ReservationState::Reserved { resource_blocker_uid } => {
                (OutcomeStatus::Reserved, None, Some(*resource_blocker_uid), None)
            }
            ReservationState::Failed { status, reason } => {
                (OutcomeStatus::Failed, Some(reason.clone()), None, *status)
            }
            ReservationState::Skipped(why) => (OutcomeStatus::Skipped, Some(why.to_string()), None, None),
            other => (OutcomeStatus::Failed, Some(format!("stopped in state {:?}", other)), None, None),
        };
        Self {
            park: m.park.clone(),
            resource_id: m.resource_id,
            name: m.name.clone(),
            success: status == OutcomeStatus::Reserved,
            status,
            skip_reason,
            reason,
            resource_blocker_uid,
            http_status,
        }
    }
}

/// One state entered by one match, in order of occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub match_index: usize,
    pub state: ReservationState,
}

#[derive(Debug, Default)]
pub struct ReservationTrigger {
    policy: ReservationPolicy,
    history: Vec<Transition>,
}

impl ReservationTrigger {
    pub fn new(policy: ReservationPolicy) -> Self {
        Self {
            policy,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Number of commits started, over the whole run.
    pub fn attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|t| t.state == ReservationState::Attempting)
            .count()
    }

    /// Decide, without side effects, which matches to attempt.
    pub fn evaluate(&self, matches: &[MatchResult], cart: &CartSnapshot, can_write: bool) -> Vec<Decision> {
        let blanket = if !self.policy.auto_reserve {
            Some(SkipReason::AutoReserveDisabled)
        } else if !can_write {
            Some(SkipReason::MissingXsrfToken)
        } else if cart.has_items && !self.policy.allow_existing_cart {
            Some(SkipReason::CartConflict)
        } else {
            None
        };

        (0..matches.len())
            .map(|i| match blanket {
                Some(reason) => Decision::Skip(reason),
                None if self.policy.mode == ReserveMode::First && i > 0 => {
                    Decision::Skip(SkipReason::NotFirstMatch)
                }
                None => Decision::Attempt,
            })
            .collect()
    }

    fn enter(&mut self, match_index: usize, state: ReservationState) {
        self.history.push(Transition { match_index, state });
    }

    /// Evaluate every match and run the cart-add sequence for those that qualify.
    pub async fn run<A: ReservationsApi>(
        &mut self,
        api: &A,
        matches: &[MatchResult],
        cart: &Value,
        template: &BookingTemplate,
    ) -> Result<Vec<ReservationOutcome>> {
        let snapshot = CartSnapshot::from_cart(cart)?;
        let decisions = self.evaluate(matches, &snapshot, api.can_write());

        let mut base_cart = cart.clone();
        let mut open_transaction = snapshot.transaction_uid.clone();
        let mut outcomes = Vec::with_capacity(matches.len());

        for (i, (m, decision)) in matches.iter().zip(decisions).enumerate() {
            self.enter(i, ReservationState::Idle);
            self.enter(i, ReservationState::Evaluating);

            let state = match decision {
                Decision::Skip(reason) => {
                    tracing::warn!("Auto-reserve skipped for {} -> {}: {}", m.park, m.name, reason);
                    ReservationState::Skipped(reason)
                }
                Decision::Attempt => {
                    self.enter(i, ReservationState::Attempting);
                    let request = template.request_for(m);
                    match attempt(api, &base_cart, open_transaction.take(), &request).await {
                        Ok((resource_blocker_uid, next_cart)) => {
                            tracing::info!("Reserved {} -> {} (blocker {})", m.park, m.name, resource_blocker_uid);
                            base_cart = next_cart;
                            ReservationState::Reserved { resource_blocker_uid }
                        }
                        Err(e) => {
                            let status = e.downcast_ref::<WatchError>().and_then(WatchError::status);
                            tracing::error!("Reserve failed for {} -> {}: {:#}", m.park, m.name, e);
                            ReservationState::Failed {
                                status,
                                reason: format!("{:#}", e),
                            }
                        }
                    }
                }
            };
            outcomes.push(ReservationOutcome::from_state(m, &state));
            self.enter(i, state);
        }

        Ok(outcomes)
    }
}

/// One cart-add: pick a transaction, build the payload, commit once.
///
/// Returns the blocker uid and the cart to build the next payload on.
async fn attempt<A: ReservationsApi>(
    api: &A,
    cart: &Value,
    open_transaction: Option<String>,
    request: &BookingRequest,
) -> Result<(Uuid, Value)> {
    let transaction_uid = match open_transaction {
        Some(uid) => uid,
        None => api.new_transaction().await?,
    };
    let payload = CommitPayload::fresh(cart, &transaction_uid, request)?;
    let response = api.commit_cart(&payload.body).await?;

    let returned_cart = match &response {
        Value::Object(o) if o.contains_key("cartUid") => Some(response.clone()),
        Value::Object(o) => o.get("cart").filter(|c| c.get("cartUid").is_some()).cloned(),
        _ => None,
    };
    let next_cart = returned_cart.unwrap_or_else(|| payload.body["cart"].clone());
    Ok((payload.resource_blocker_uid, next_cart))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(id: i64, park: &str) -> MatchResult {
        MatchResult {
            resource_id: id,
            name: format!("Cabin {}", id),
            category_id: None,
            park: park.to_string(),
            resource_location_id: -1,
            preference_rank: 0,
        }
    }

    fn snapshot(has_items: bool) -> CartSnapshot {
        CartSnapshot {
            cart_uid: "c".to_string(),
            transaction_uid: Some("t".to_string()),
            has_items,
        }
    }

    fn policy(mode: ReserveMode, allow_existing_cart: bool) -> ReservationPolicy {
        ReservationPolicy {
            auto_reserve: true,
            mode,
            allow_existing_cart,
        }
    }

    #[test]
    fn first_mode_attempts_only_the_first() {
        let trigger = ReservationTrigger::new(policy(ReserveMode::First, false));
        let matches = [m(1, "A"), m(2, "B"), m(3, "C")];
        let d = trigger.evaluate(&matches, &snapshot(false), true);
        assert_eq!(
            d,
            vec![
                Decision::Attempt,
                Decision::Skip(SkipReason::NotFirstMatch),
                Decision::Skip(SkipReason::NotFirstMatch)
            ]
        );
    }

    #[test]
    fn all_mode_attempts_every_match() {
        let trigger = ReservationTrigger::new(policy(ReserveMode::All, false));
        let d = trigger.evaluate(&[m(1, "A"), m(2, "B")], &snapshot(false), true);
        assert!(d.iter().all(|d| *d == Decision::Attempt));
    }

    #[test]
    fn busy_cart_blocks_unless_allowed() {
        let matches = [m(1, "A")];
        let strict = ReservationTrigger::new(policy(ReserveMode::All, false));
        assert_eq!(
            strict.evaluate(&matches, &snapshot(true), true),
            vec![Decision::Skip(SkipReason::CartConflict)]
        );
        let lenient = ReservationTrigger::new(policy(ReserveMode::All, true));
        assert_eq!(lenient.evaluate(&matches, &snapshot(true), true), vec![Decision::Attempt]);
    }

    #[test]
    fn disabled_and_tokenless_runs_skip() {
        let off = ReservationTrigger::new(ReservationPolicy::default());
        assert_eq!(
            off.evaluate(&[m(1, "A")], &snapshot(false), true),
            vec![Decision::Skip(SkipReason::AutoReserveDisabled)]
        );
        let on = ReservationTrigger::new(policy(ReserveMode::First, false));
        assert_eq!(
            on.evaluate(&[m(1, "A")], &snapshot(false), false),
            vec![Decision::Skip(SkipReason::MissingXsrfToken)]
        );
    }

    #[test]
    fn reserve_mode_parses() {
        assert_eq!("FIRST".parse::<ReserveMode>().unwrap(), ReserveMode::First);
        assert_eq!(" all ".parse::<ReserveMode>().unwrap(), ReserveMode::All);
        assert!("some".parse::<ReserveMode>().is_err());
        assert_eq!(ReserveMode::All.to_string(), "all");
    }

    #[test]
    fn outcome_from_states() {
        let uid = Uuid::from_u128(7);
        let ok = ReservationOutcome::from_state(
            &m(1, "A"),
            &ReservationState::Reserved {
                resource_blocker_uid: uid,
            },
        );
        assert!(ok.success);
        assert_eq!(ok.resource_blocker_uid, Some(uid));

        let failed = ReservationOutcome::from_state(
            &m(1, "A"),
            &ReservationState::Failed {
                status: Some(412),
                reason: "stale".to_string(),
            },
        );
        assert!(!failed.success);
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert_eq!(failed.http_status, Some(412));

        let skipped = ReservationOutcome::from_state(&m(1, "A"), &ReservationState::Skipped(SkipReason::CartConflict));
        assert_eq!(skipped.skip_reason, Some(SkipReason::CartConflict));
        assert!(skipped.reason.unwrap().contains("allow-existing-cart"));
    }
}
