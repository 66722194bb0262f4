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

//! # Reservations API Client
//!
//! Effectful (network) access to the reservation site's JSON API.
//!
//! [`ReservationsApi`] is the request/response contract the watch logic is
//! written against; [`ReservationsClient`] implements it over `wreq` with a
//! browser TLS fingerprint and the user's exported cookies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use roofwatch_request_pacer::RequestPacer;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use wreq::redirect::Policy;
use wreq_util::Emulation;

use crate::availability_checker::{MapAvailability, StayRange};
use crate::browser_cookies::CookieJar;
use crate::park_catalog::{BookingCategory, LocationResources, ParkMap, ResourceCategory, ResourceLocation};
use crate::watch_errors::WatchError;

pub const DEFAULT_BASE_URL: &str = "https://reservations.ontarioparks.ca";
pub const DEFAULT_APP_LANGUAGE: &str = "en-CA";
/// Client version sent on cart writes. Must track the live site; override with `app_version`.
pub const DEFAULT_APP_VERSION: &str = "5.105.203";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 350;

const COMMIT_PATH: &str = "/api/cart/commit?isCompleted=false&isSelfCheckIn=false";

/// The reservation site as seen by the watch logic.
#[allow(async_fn_in_trait)]
pub trait ReservationsApi {
    async fn resource_locations(&self) -> Result<Vec<ResourceLocation>>;
    async fn resource_categories(&self) -> Result<Vec<ResourceCategory>>;
    async fn booking_categories(&self) -> Result<Vec<BookingCategory>>;
    async fn location_resources(&self, resource_location_id: i64) -> Result<LocationResources>;
    async fn maps(&self, resource_location_id: i64) -> Result<Vec<ParkMap>>;
    async fn map_availability(&self, query: &MapAvailabilityQuery) -> Result<MapAvailability>;
    async fn cart(&self) -> Result<Value>;
    /// Open a new cart transaction and return its uid.
    async fn new_transaction(&self) -> Result<String>;
    /// Commit a cart document. This is the only write.
    async fn commit_cart(&self, body: &Value) -> Result<Value>;
    /// Whether write requests can carry an anti-forgery token.
    fn can_write(&self) -> bool;
}

/// Parameters of `/api/availability/map`.
#[derive(Debug, Clone)]
pub struct MapAvailabilityQuery {
    pub map_id: i64,
    pub booking_category_id: i64,
    pub range: StayRange,
    pub party_size: u32,
    pub cart_uid: String,
    pub cart_transaction_uid: String,
    pub daily: bool,
    /// Cache-buster the site's own client sends.
    pub seed: String,
}

impl MapAvailabilityQuery {
    pub fn to_query_string(&self) -> String {
        let capacity = json!([
            {"capacityCategoryId": -32768, "subCapacityCategoryId": null, "count": self.party_size}
        ])
        .to_string();
        let params: Vec<(&str, String)> = vec![
            ("mapId", self.map_id.to_string()),
            ("bookingCategoryId", self.booking_category_id.to_string()),
            ("equipmentCategoryId", String::new()),
            ("subEquipmentCategoryId", String::new()),
            ("cartUid", self.cart_uid.clone()),
            ("cartTransactionUid", self.cart_transaction_uid.clone()),
            ("bookingUid", String::new()),
            ("groupHoldUid", String::new()),
            ("startDate", self.range.start().format("%Y-%m-%d").to_string()),
            ("endDate", self.range.end().format("%Y-%m-%d").to_string()),
            ("getDailyAvailability", self.daily.to_string()),
            ("isReserving", "true".to_string()),
            ("filterData", "[]".to_string()),
            ("boatLength", "0".to_string()),
            ("boatDraft", "0".to_string()),
            ("boatWidth", "0".to_string()),
            ("peopleCapacityCategoryCounts", capacity),
            ("numEquipment", "0".to_string()),
            ("seed", self.seed.clone()),
        ];
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Transport settings, built once per run.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub app_version: String,
    pub app_language: String,
    pub timeout_secs: u64,
    pub min_request_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            app_language: DEFAULT_APP_LANGUAGE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
        }
    }
}

/// Host part of a base URL, used to pick the cookies a browser would send.
pub fn host_of(base_url: &str) -> &str {
    let without_scheme = base_url.split_once("://").map_or(base_url, |(_, rest)| rest);
    let authority = without_scheme.split(['/', '?', '#']).next().unwrap_or(without_scheme);
    authority.rsplit_once(':').map_or(authority, |(host, _port)| host)
}

#[derive(Clone)]
pub struct ReservationsClient {
    client: Arc<wreq::Client>,
    pacer: RequestPacer,
    config: TransportConfig,
    cookie_header: String,
    xsrf_token: Option<String>,
}

impl ReservationsClient {
    pub fn new(config: TransportConfig, cookies: &CookieJar) -> Result<Self> {
        let client = wreq::Client::builder()
            .emulation(Emulation::Safari18_5)
            .redirect(Policy::default())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let pacer = RequestPacer::with_min_interval(Duration::from_millis(config.min_request_interval_ms));
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let cookie_header = cookies.cookie_header(host_of(&base_url));
        if cookie_header.is_empty() {
            tracing::warn!("No cookies apply to {}; requests will likely be rejected", host_of(&base_url));
        }
        Ok(Self {
            client: Arc::new(client),
            pacer,
            config: TransportConfig { base_url, ..config },
            cookie_header,
            xsrf_token: cookies.xsrf_token(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        let url_inner = url.clone();
        let cookie = self.cookie_header.clone();
        let client_inner = Arc::clone(&self.client);

        let started = std::time::Instant::now();
        let response = self
            .pacer
            .run_once(move || async move {
                tracing::info!("GET {}", url_inner);
                let resp = client_inner
                    .get(&url_inner)
                    .header("Cookie", &cookie)
                    .header("Accept", "application/json, text/plain, */*")
                    .send()
                    .await?;
                Ok(resp)
            })
            .await
            .map_err(|e| anyhow!("Request failed: {:#}", e.into_inner()))?;

        let status = response.status();
        let body = response.text().await.context("Read body")?;
        tracing::debug!(
            "[get_json] {} {} in {:?}, {} bytes",
            status.as_u16(),
            path,
            started.elapsed(),
            body.len()
        );

        if !status.is_success() {
            return Err(WatchError::from_read_status(status.as_u16(), &url, &body).into());
        }
        decode(&url, &body)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        WatchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn transaction_uid_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => value
            .get("cartTransactionUid")
            .or_else(|| value.pointer("/newTransaction/cartTransactionUid"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

impl ReservationsApi for ReservationsClient {
    async fn resource_locations(&self) -> Result<Vec<ResourceLocation>> {
        self.get_json("/api/resourceLocation").await
    }

    async fn resource_categories(&self) -> Result<Vec<ResourceCategory>> {
        self.get_json("/api/resourcecategory").await
    }

    async fn booking_categories(&self) -> Result<Vec<BookingCategory>> {
        self.get_json("/api/bookingcategories").await
    }

    async fn location_resources(&self, resource_location_id: i64) -> Result<LocationResources> {
        self.get_json(&format!(
            "/api/resourcelocation/resources?resourceLocationId={}",
            resource_location_id
        ))
        .await
    }

    async fn maps(&self, resource_location_id: i64) -> Result<Vec<ParkMap>> {
        self.get_json(&format!("/api/maps?resourceLocationId={}", resource_location_id))
            .await
    }

    async fn map_availability(&self, query: &MapAvailabilityQuery) -> Result<MapAvailability> {
        self.get_json(&format!("/api/availability/map?{}", query.to_query_string()))
            .await
    }

    async fn cart(&self) -> Result<Value> {
        self.get_json("/api/cart").await
    }

    async fn new_transaction(&self) -> Result<String> {
        let url = "/api/cart/newtransaction";
        let value: Value = self.get_json(url).await?;
        transaction_uid_from(&value).ok_or_else(|| {
            WatchError::Decode {
                url: url.to_string(),
                reason: "no cartTransactionUid in response".to_string(),
            }
            .into()
        })
    }

    async fn commit_cart(&self, body: &Value) -> Result<Value> {
        let Some(xsrf) = self.xsrf_token.as_deref() else {
            bail!(WatchError::Auth {
                status: None,
                detail: "XSRF-TOKEN cookie missing; cannot write to the cart".to_string(),
            });
        };
        let url = format!("{}{}", self.config.base_url, COMMIT_PATH);
        let url_inner = url.clone();
        let cookie = self.cookie_header.clone();
        let xsrf = xsrf.to_string();
        let app_language = self.config.app_language.clone();
        let app_version = self.config.app_version.clone();
        let client_inner = Arc::clone(&self.client);

        let response = self
            .pacer
            .run_once(move || async move {
                tracing::info!("POST {} (app-version {})", url_inner, app_version);
                let resp = client_inner
                    .post(&url_inner)
                    .header("Cookie", &cookie)
                    .header("x-xsrf-token", &xsrf)
                    .header("app-language", &app_language)
                    .header("app-version", &app_version)
                    .header("Accept", "application/json, text/plain, */*")
                    .json(body)
                    .send()
                    .await?;
                Ok(resp)
            })
            .await
            .map_err(|e| anyhow!("Request failed: {:#}", e.into_inner()))?;

        let status = response.status();
        let text = response.text().await.context("Read body")?;
        tracing::debug!("[commit_cart] HTTP {} ({} bytes)", status.as_u16(), text.len());

        if !status.is_success() {
            return Err(WatchError::from_write_status(status.as_u16(), &url, &text).into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        decode(&url, &text)
    }

    fn can_write(&self) -> bool {
        self.xsrf_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn host_is_extracted() {
        assert_eq!(host_of("https://reservations.ontarioparks.ca"), "reservations.ontarioparks.ca");
        assert_eq!(host_of("http://127.0.0.1:8080/base"), "127.0.0.1");
        assert_eq!(host_of("example.test/x?y"), "example.test");
    }

    #[test]
    fn availability_query_encodes_all_parameters() {
        let query = MapAvailabilityQuery {
            map_id: -2147483464,
            booking_category_id: 2,
            range: StayRange::new(
                NaiveDate::from_ymd_opt(2026, 7, 15).unwrap(),
                NaiveDate::from_ymd_opt(2026, 7, 17).unwrap(),
            )
            .unwrap(),
            party_size: 2,
            cart_uid: "cart-1".to_string(),
            cart_transaction_uid: "tx-1".to_string(),
            daily: true,
            seed: "2026-05-01T12:00:00Z".to_string(),
        };
        let qs = query.to_query_string();
        assert!(qs.starts_with("mapId=-2147483464&bookingCategoryId=2&"));
        assert!(qs.contains("&startDate=2026-07-15&endDate=2026-07-17&"));
        assert!(qs.contains("&getDailyAvailability=true&"));
        assert!(qs.contains("&cartUid=cart-1&cartTransactionUid=tx-1&"));
        assert!(qs.contains("peopleCapacityCategoryCounts=%5B%7B%22capacityCategoryId%22%3A-32768"));
        assert!(qs.contains("&seed=2026-05-01T12%3A00%3A00Z"));
    }

    #[test]
    fn transaction_uid_shapes() {
        assert_eq!(transaction_uid_from(&json!("tx-1")).as_deref(), Some("tx-1"));
        assert_eq!(
            transaction_uid_from(&json!({"cartTransactionUid": "tx-2"})).as_deref(),
            Some("tx-2")
        );
        assert_eq!(
            transaction_uid_from(&json!({"newTransaction": {"cartTransactionUid": "tx-3"}})).as_deref(),
            Some("tx-3")
        );
        assert!(transaction_uid_from(&json!({})).is_none());
    }

    #[test]
    fn decode_failure_is_classified() {
        let err = decode::<Vec<ResourceLocation>>("/api/resourceLocation", "<html>").unwrap_err();
        assert!(matches!(err.downcast_ref::<WatchError>(), Some(WatchError::Decode { .. })));
    }
}
