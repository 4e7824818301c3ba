// src/repository/aur.rs

//! Contributed-source (AUR) RPC client
//!
//! Replies are JSON objects of the form
//! `{ "version", "type", "resultcount", "results": [...], "error" }`.
//! Each element of `results` is mapped onto a descriptor by
//! [`crate::packages::json::from_json`].

use super::Fetcher;
use crate::config::AUR_RPC_URL;
use crate::db::Catalog;
use crate::error::{Error, Result};
use crate::packages::PackageDescriptor;
use crate::packages::json::from_json;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Envelope every RPC reply comes in
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub resultcount: usize,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    /// Parse a reply body, surfacing `type == "error"` as an error
    pub fn parse(body: &[u8]) -> Result<Self> {
        let reply: RpcResponse = serde_json::from_slice(body)?;
        if reply.kind == "error" {
            return Err(Error::RemoteError(
                reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            ));
        }
        if reply.resultcount != reply.results.len() {
            debug!(
                "RPC reported {} results but sent {}",
                reply.resultcount,
                reply.results.len()
            );
        }
        Ok(reply)
    }

    pub fn descriptors(&self) -> Result<Vec<PackageDescriptor>> {
        self.results.iter().map(from_json).collect()
    }
}

pub struct AurClient {
    fetcher: Arc<dyn Fetcher>,
    base: String,
}

impl AurClient {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_base(fetcher, AUR_RPC_URL)
    }

    pub fn with_base(fetcher: Arc<dyn Fetcher>, base: &str) -> Self {
        Self {
            fetcher,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base)
            .map_err(|e| Error::ConfigError(format!("Invalid RPC URL {}: {}", self.base, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("Invalid RPC URL {}", self.base)))?
            .extend(segments);
        Ok(url)
    }

    fn call(&self, url: &Url) -> Result<RpcResponse> {
        debug!("RPC {}", url);
        let body = self.fetcher.fetch_bytes(url.as_str())?;
        RpcResponse::parse(&body)
    }

    /// Packages whose name or description contains `term`
    pub fn search(&self, term: &str) -> Result<Vec<PackageDescriptor>> {
        let mut url = self.endpoint(&["search", term])?;
        url.query_pairs_mut().append_pair("by", "name-desc");
        self.call(&url)?.descriptors()
    }

    /// Full records for the named packages
    pub fn info(&self, names: &[&str]) -> Result<Vec<PackageDescriptor>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.endpoint(&["info"])?;
        {
            let mut query = url.query_pairs_mut();
            for name in names {
                query.append_pair("arg[]", name);
            }
        }
        self.call(&url)?.descriptors()
    }

    /// Search and add the results to the catalog's contributed database
    pub fn search_into(&self, catalog: &mut Catalog, term: &str) -> Result<usize> {
        let found = self.search(term)?;
        let count = catalog.import_contributed(found);
        info!("Imported {} packages from the AUR matching '{}'", count, term);
        Ok(count)
    }
}
