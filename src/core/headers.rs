//! Per-request authentication headers.
//!
//! Key precedence: an explicit enabled-key list, then the caller's
//! comma-separated key string, then the key stored for the provider. With no
//! key at all the access code (when access control is on) authorizes the
//! request against the gateway; otherwise the header is left out.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::access::{AccessPolicy, ServiceProvider, ACCESS_CODE_PREFIX};

pub type HeaderSet = BTreeMap<String, String>;

pub const AZURE_AUTH_HEADER: &str = "api-key";
pub const BEARER_AUTH_HEADER: &str = "Authorization";

pub struct HeaderResolver<'a> {
    provider: ServiceProvider,
    access: &'a AccessPolicy,
    azure: bool,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(provider: ServiceProvider, access: &'a AccessPolicy) -> Self {
        Self {
            provider,
            access,
            azure: provider == ServiceProvider::Azure,
        }
    }

    /// Uses Azure's `api-key` header form; for custom providers declared as
    /// Azure deployments.
    pub fn azure_dialect(mut self, azure: bool) -> Self {
        self.azure = azure;
        self
    }

    fn is_azure(&self) -> bool {
        self.azure
    }

    pub fn auth_header_name(&self) -> &'static str {
        if self.is_azure() {
            AZURE_AUTH_HEADER
        } else {
            BEARER_AUTH_HEADER
        }
    }

    pub fn resolve(
        &self,
        ignore_headers: bool,
        caller_api_key: Option<&str>,
        enable_key_list: Option<&[String]>,
    ) -> HeaderSet {
        let mut headers = HeaderSet::new();
        if !ignore_headers {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
            headers.insert("Accept".to_string(), "application/json".to_string());
        }

        if self.provider == ServiceProvider::Google && self.access.embedded_app {
            debug!("embedded app build; google auth handled by host");
            return headers;
        }

        let key = enable_key_list
            .and_then(select_from_list)
            .or_else(|| caller_api_key.and_then(select_api_key))
            .or_else(|| {
                let stored = self.access.stored_key(self.provider).trim();
                (!stored.is_empty()).then(|| stored.to_string())
            });

        let auth_name = self.auth_header_name().to_string();
        if let Some(key) = key {
            headers.insert(auth_name, self.token_value(key.trim()));
        } else if self.access.access_control_enabled && self.access.has_access_code() {
            let code = format!("{ACCESS_CODE_PREFIX}{}", self.access.access_code.trim());
            headers.insert(auth_name, self.token_value(&code));
        }

        headers
    }

    fn token_value(&self, token: &str) -> String {
        if self.is_azure() {
            token.to_string()
        } else {
            format!("Bearer {token}")
        }
    }
}

/// Picks one key from a comma-separated list.
pub fn select_api_key(keys: &str) -> Option<String> {
    pick(keys.split(',').map(str::trim).filter(|key| !key.is_empty()).collect())
}

pub fn select_from_list(keys: &[String]) -> Option<String> {
    pick(keys.iter().map(|key| key.trim()).filter(|key| !key.is_empty()).collect())
}

fn pick(candidates: Vec<&str>) -> Option<String> {
    match candidates.len() {
        0 => None,
        1 => Some(candidates[0].to_string()),
        len => Some(candidates[random_index(len)].to_string()),
    }
}

fn random_index(len: usize) -> usize {
    let mut bytes = [0_u8; 8];
    match getrandom::fill(&mut bytes) {
        Ok(()) => (u64::from_le_bytes(bytes) % len as u64) as usize,
        Err(err) => {
            warn!("random source unavailable, using first key: {err}");
            0
        }
    }
}
