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

//! Error taxonomy for a watch run.
//!
//! Functions return `anyhow::Result`; callers that must tell the classes apart
//! recover a [`WatchError`] with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    /// Missing or expired session cookies.
    #[error("Session rejected ({detail}). Re-export browser cookies and retry")]
    Auth { status: Option<u16>, detail: String },

    /// Cart commit rejected, usually because the `app-version` header is stale.
    #[error(
        "HTTP {status} on cart commit: {preview}. \
         Refresh cookies or update app_version to the live site's client version"
    )]
    ClientVersionMismatch { status: u16, preview: String },

    #[error("HTTP {status} for {url}: {preview}")]
    Http {
        status: u16,
        url: String,
        preview: String,
    },

    #[error("Unexpected response shape from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Availability data incomplete for {0}")]
    DataIncomplete(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cart already has items; auto-reserve skipped (use --allow-existing-cart to override)")]
    CartConflict,

    #[error("No park matches: {0}")]
    ParkNotFound(String),

    #[error("Multiple parks match '{query}': {candidates}")]
    AmbiguousPark { query: String, candidates: String },
}

impl WatchError {
    /// Map a non-success status on a read request to its error class.
    pub fn from_read_status(status: u16, url: &str, body: &str) -> Self {
        match status {
            401 | 403 => WatchError::Auth {
                status: Some(status),
                detail: format!("HTTP {} for {}", status, url),
            },
            _ => WatchError::Http {
                status,
                url: url.to_string(),
                preview: preview(body),
            },
        }
    }

    /// Map a non-success status on a cart write to its error class.
    pub fn from_write_status(status: u16, url: &str, body: &str) -> Self {
        match status {
            401 | 403 => WatchError::Auth {
                status: Some(status),
                detail: format!("HTTP {} for {}", status, url),
            },
            _ => WatchError::ClientVersionMismatch {
                status,
                preview: preview(body),
            },
        }
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            WatchError::Auth { status, .. } => *status,
            WatchError::ClientVersionMismatch { status, .. }
            | WatchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
