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

//! Browser cookie export loading.
//!
//! The reservation site sits behind bot protection, so requests reuse the
//! cookies of a real browser session. The user exports them as a JSON array of
//! `{name, value, domain, path}` objects (the format written by most cookie
//! export extensions; extra fields are ignored).

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::watch_errors::WatchError;

/// Name of the anti-forgery cookie whose value must be echoed in `x-xsrf-token`.
pub const XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl BrowserCookie {
    /// Whether this cookie would be sent by a browser to `host`.
    fn applies_to(&self, host: &str) -> bool {
        let Some(domain) = self.domain.as_deref() else {
            return true;
        };
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<BrowserCookie>,
}

impl CookieJar {
    pub fn from_json(text: &str) -> Result<Self> {
        let cookies: Vec<BrowserCookie> = serde_json::from_str(text)
            .map_err(|e| WatchError::Config(format!("Cookie file is not a JSON cookie array: {}", e)))?;
        Ok(Self { cookies })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| {
            WatchError::Config(format!(
                "Cookie file not found: {}. Export browser cookies to this path before running.",
                path.display()
            ))
        })?;
        Self::from_json(&text).with_context(|| format!("Reading cookies from {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Build the `Cookie` request header for `host`.
    ///
    /// When a name appears more than once, the later entry wins, matching how
    /// a browser jar overwrites on re-set.
    pub fn cookie_header(&self, host: &str) -> String {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for c in self.cookies.iter().filter(|c| c.applies_to(host)) {
            match pairs.iter_mut().find(|pair| pair.0 == c.name) {
                Some(pair) => pair.1 = c.value.as_str(),
                None => pairs.push((c.name.as_str(), c.value.as_str())),
            }
        }
        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Decoded `XSRF-TOKEN` value, if the export contains one.
    pub fn xsrf_token(&self) -> Option<String> {
        self.cookies
            .iter()
            .rev()
            .find(|c| c.name == XSRF_COOKIE_NAME)
            .map(|c| {
                urlencoding::decode(&c.value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| c.value.clone())
            })
            .filter(|v| !v.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================
