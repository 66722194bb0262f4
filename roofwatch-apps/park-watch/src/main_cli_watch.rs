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
//!
//! # Prerequisites
//!
//! Export the cookies of a logged-in browser session on
//! reservations.ontarioparks.ca as a JSON array to `tmp/op_cookies.json`
//! (or pass `--cookie-file`).
//!
//! # Examples
//!
//! ## Check two parks
//!
//! ```bash
//! roofwatch --start 2026-07-15 --end 2026-07-17 --party-size 2 \
//!     --parks "Pinery Provincial Park, Killbear Provincial Park"
//! ```
//!
//! ## Prefer specific cabins and put the first match in the cart
//!
//! ```bash
//! roofwatch --start 2026-07-15 --end 2026-07-17 --park Pinery \
//!     --preferred-site "Cabin 1" --preferred-site "Cabin 2" --reserve
//! ```
//!
//! ## Everything from the config file
//!
//! ```bash
//! # writes an example config.json on first use
//! roofwatch --use-config --config config.json
//! ```
//!
//! ## Catalog lookups
//!
//! ```bash
//! roofwatch --list-parks
//! roofwatch --list-categories --category-keyword yurt
//! roofwatch --list-booking-categories
//! ```
//!
//! # Output
//!
//! One JSON document on stdout. `MATCH:`, `RESERVED:` and `RESERVE FAILED:`
//! lines go to stderr together with the logs.
//!
//! Exit status: 0 on success, 1 on a fatal error, 2 when a reservation
//! failed or could not be authorized.

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use roofwatch_park_watch::{
    CliOverrides, CookieJar, DEFAULT_CONFIG_PATH, ReservationsClient, ReserveMode, SessionSettings, WatchConfigFile,
    WatchSettings, list_booking_categories, list_parks, list_roofed_categories, run_watch,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "roofwatch")]
#[command(version = "0.1.0")]
#[command(about = "Watch Ontario Parks roofed accommodation availability")]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, help = "Path to JSON config")]
    config: PathBuf,
    #[arg(long, help = "Read defaults from the config file")]
    use_config: bool,
    #[arg(long, value_parser = parse_date, help = "Arrival date (YYYY-MM-DD)")]
    start: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date, help = "Departure date (YYYY-MM-DD)")]
    end: Option<NaiveDate>,
    #[arg(long)]
    party_size: Option<u32>,
    #[arg(long, help = "Comma-separated park names")]
    parks: Option<String>,
    #[arg(long = "park", help = "Park name (repeatable)")]
    park: Vec<String>,
    #[arg(long = "preferred-site", help = "Preferred site, highest priority first (repeatable)")]
    preferred_site: Vec<String>,
    #[arg(long)]
    cookie_file: Option<PathBuf>,
    #[arg(long)]
    available_code: Option<i64>,
    #[arg(long, help = "Compare one aggregate code instead of per-night codes")]
    aggregate_only: bool,
    #[arg(long, help = "Attempt to add the best match to the cart")]
    reserve: bool,
    #[arg(long, value_enum, help = "Reserve the first match only (default) or all matches")]
    reserve_mode: Option<ReserveModeArg>,
    #[arg(long, help = "Allow auto-reserve even if the cart already has items")]
    allow_existing_cart: bool,
    #[arg(long, help = "Override app-version header for cart commit")]
    app_version: Option<String>,
    #[arg(long, help = "Override app-language header for cart commit")]
    app_language: Option<String>,
    #[arg(
        long = "category-keyword",
        help = "Override roofed-category keywords (repeatable). If omitted, defaults are used"
    )]
    category_keyword: Vec<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    min_request_interval_ms: Option<u64>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    list_parks: bool,
    #[arg(long, help = "List the resource categories counted as roofed")]
    list_categories: bool,
    #[arg(long)]
    list_booking_categories: bool,
    #[arg(short = 'v', long, help = "Debug logging (RUST_LOG takes precedence)")]
    verbose: bool,
}

#[derive(Clone, Debug, ValueEnum)]
enum ReserveModeArg {
    #[clap(name = "first")]
    First,
    #[clap(name = "all")]
    All,
}

impl From<ReserveModeArg> for ReserveMode {
    fn from(arg: ReserveModeArg) -> Self {
        match arg {
            ReserveModeArg::First => ReserveMode::First,
            ReserveModeArg::All => ReserveMode::All,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| "Use ISO date format YYYY-MM-DD".to_string())
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        let mut parks: Vec<String> = self
            .parks
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        parks.extend(self.park.iter().cloned());

        CliOverrides {
            start: self.start,
            end: self.end,
            party_size: self.party_size,
            parks,
            preferred_sites: self.preferred_site.clone(),
            category_keywords: self.category_keyword.clone(),
            available_code: self.available_code,
            reserve: self.reserve,
            reserve_mode: self.reserve_mode.clone().map(ReserveMode::from),
            allow_existing_cart: self.allow_existing_cart,
            app_version: self.app_version.clone(),
            app_language: self.app_language.clone(),
            cookie_file: self.cookie_file.clone(),
            base_url: self.base_url.clone(),
            aggregate_only: self.aggregate_only,
            min_request_interval_ms: self.min_request_interval_ms,
            timeout_secs: self.timeout_secs,
        }
    }

    fn is_listing(&self) -> bool {
        self.list_parks || self.list_categories || self.list_booking_categories
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(args: &Args) -> Result<i32> {
    let file = if args.use_config {
        WatchConfigFile::load_or_bootstrap(&args.config)?
    } else {
        WatchConfigFile::default()
    };
    let overrides = args.overrides();

    // Validate the run before touching the network.
    let settings = if args.is_listing() {
        None
    } else {
        Some(WatchSettings::resolve(&file, &overrides)?)
    };
    let session = match &settings {
        Some(s) => s.session.clone(),
        None => SessionSettings::resolve(&file, &overrides),
    };

    let cookies = CookieJar::load(&session.cookie_file)?;
    tracing::info!("Loaded {} cookies from {}", cookies.len(), session.cookie_file.display());
    let client = ReservationsClient::new(session.transport.clone(), &cookies)?;

    if args.list_parks {
        for name in list_parks(&client).await? {
            println!("{}", name);
        }
        return Ok(0);
    }
    if args.list_categories {
        for (id, name) in list_roofed_categories(&client, &session.category_keywords).await? {
            println!("{}: {}", id, name);
        }
        return Ok(0);
    }
    if args.list_booking_categories {
        for (id, name) in list_booking_categories(&client).await? {
            println!("{}: {}", id, name);
        }
        return Ok(0);
    }

    let Some(settings) = settings else {
        return Ok(0);
    };
    tracing::info!(
        "Watching {} park(s) for {} to {}, party of {}",
        settings.parks.len(),
        settings.range.start(),
        settings.range.end(),
        settings.party_size
    );

    let report = run_watch(&client, &settings).await?;
    println!("{}", report.to_json_pretty()?);
    for line in report.match_lines() {
        eprintln!("{}", line);
    }
    for line in report.reservation_lines() {
        eprintln!("{}", line);
    }
    Ok(report.exit_code())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    let code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
