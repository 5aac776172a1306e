//! Contract address resolution
//!
//! Addresses come from the configuration store when possible and from the
//! compiled-in deployment table otherwise. The store has two layouts: a flat
//! document per family holding a `contracts` map, and (for the escrow family) one
//! document per network. Both are flattened here into [`ContractAddressRecord`]s
//! so nothing above this module sees the difference.
//!
//! Lookup order for a network: exact key, suffix/space variants, canonical key,
//! the `default` entry, the fallback table. The zero address never resolves.

use crate::normalize::normalize;
use crate::store::{ConfigStore, Document};
use crate::types::constants::{fallback, networks::DEFAULT_ENTRY, store as layout, tokens};
use crate::types::{format_address, parse_address, ContractAddressRecord, ContractFamily};
use crate::{PaymentError, Result};
use chrono::{DateTime, Utc};
use ethereum_types::Address;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default cache refresh window
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedFamily {
    fetched_at: Instant,
    entries: Vec<ContractAddressRecord>,
}

/// Resolves deployed contract addresses per network and family
pub struct ContractResolver {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    cache: RwLock<HashMap<ContractFamily, CachedFamily>>,
    fallback: RwLock<HashMap<(ContractFamily, String), Address>>,
}

impl ContractResolver {
    /// Create a resolver seeded with the compiled-in deployments
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let mut table = HashMap::new();
        for (family, network, address) in fallback::CONTRACTS {
            match parse_address(address) {
                Ok(parsed) if !parsed.is_zero() => {
                    table.insert((*family, network.to_string()), parsed);
                }
                _ => tracing::warn!(%family, network, "Ignoring malformed fallback address"),
            }
        }

        Self {
            store,
            ttl: DEFAULT_CACHE_TTL,
            cache: RwLock::new(HashMap::new()),
            fallback: RwLock::new(table),
        }
    }

    /// Set the cache refresh window
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the fallback table entries with the given ones
    pub fn with_fallbacks(self, entries: &[(ContractFamily, &str, Address)]) -> Self {
        if let Ok(mut table) = self.fallback.try_write() {
            table.clear();
            for (family, network, address) in entries {
                table.insert((*family, normalize(network)), *address);
            }
        }
        self
    }

    /// Store backing this resolver
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Resolve the contract for `network` (any spelling), `None` when not configured
    pub async fn resolve(&self, network: &str, family: ContractFamily) -> Result<Option<Address>> {
        let canonical = normalize(network);
        if canonical.is_empty() {
            return Ok(None);
        }

        let entries = self.entries(family).await;
        if let Some((address, matched)) = lookup(&entries, network, &canonical) {
            tracing::debug!(%family, network = %canonical, matched, address = %format_address(&address), "Resolved from store");
            let mut table = self.fallback.write().await;
            let previous = table.insert((family, canonical.clone()), address);
            if previous != Some(address) {
                tracing::info!(%family, network = %canonical, "Store address overrides fallback deployment");
            }
            return Ok(Some(address));
        }

        let table = self.fallback.read().await;
        match table.get(&(family, canonical.clone())) {
            Some(address) => {
                tracing::debug!(%family, network = %canonical, "Resolved from fallback table");
                Ok(Some(*address))
            }
            None => {
                tracing::debug!(%family, network = %canonical, "No contract configured");
                Ok(None)
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but fails with `ContractNotConfigured`
    pub async fn require(&self, network: &str, family: ContractFamily) -> Result<Address> {
        self.resolve(network, family)
            .await?
            .ok_or_else(|| PaymentError::not_configured(family, normalize(network)))
    }

    /// All known addresses for a family, keyed by canonical network
    ///
    /// Store entries win over fallback entries for the same network.
    pub async fn records(&self, family: ContractFamily) -> Vec<ContractAddressRecord> {
        let mut by_network: HashMap<String, ContractAddressRecord> = HashMap::new();
        for ((fam, network), address) in self.fallback.read().await.iter() {
            if *fam == family {
                by_network.insert(
                    network.clone(),
                    ContractAddressRecord::new(network.clone(), family, *address),
                );
            }
        }
        for entry in self.entries(family).await {
            let key = normalize(&entry.network_key);
            by_network.insert(
                key.clone(),
                ContractAddressRecord {
                    network_key: key,
                    ..entry
                },
            );
        }

        let mut records: Vec<_> = by_network.into_values().collect();
        records.sort_by(|a, b| a.network_key.cmp(&b.network_key));
        records
    }

    /// Drop the cached store data for a family
    pub async fn invalidate(&self, family: ContractFamily) {
        self.cache.write().await.remove(&family);
    }

    /// Drop all cached store data
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }

    /// Save an address for a network (administrator operation)
    pub async fn set_address(
        &self,
        family: ContractFamily,
        network: &str,
        address: Address,
    ) -> Result<()> {
        if address.is_zero() {
            return Err(PaymentError::invalid_address("zero address"));
        }
        let canonical = normalize(network);
        if canonical.is_empty() {
            return Err(PaymentError::unsupported_network(network));
        }
        let now = Utc::now().to_rfc3339();
        let formatted = format_address(&address);

        let (collection, doc) = family.config_document();
        self.store
            .set_merge(
                collection,
                doc,
                json!({
                    (layout::CONTRACTS_FIELD): { (canonical.as_str()): formatted },
                    "updatedAt": now,
                }),
            )
            .await?;

        if let Some(per_network) = family.per_network_collection() {
            self.store
                .set_merge(
                    per_network,
                    &canonical,
                    json!({
                        (layout::CONTRACT_ADDRESS_FIELD): formatted,
                        "network": canonical,
                        "updatedAt": now,
                    }),
                )
                .await?;
        }

        self.invalidate(family).await;
        self.fallback
            .write()
            .await
            .insert((family, canonical.clone()), address);
        tracing::info!(%family, network = %canonical, address = %formatted, "Contract address updated");
        Ok(())
    }

    /// ERC-20 deployment for `symbol` on `network`
    ///
    /// `paymentConfig.tokens.{network}.{SYMBOL}` wins over the compiled-in USDT
    /// table. A store failure is logged and the table is used.
    pub async fn token_address(&self, network: &str, symbol: &str) -> Result<Option<Address>> {
        let canonical = normalize(network);
        let symbol = symbol.to_uppercase();
        match self
            .store
            .get(layout::SETTINGS_COLLECTION, layout::PAYMENT_CONFIG_DOC)
            .await
        {
            Ok(Some(doc)) => {
                if let Some(address) = doc
                    .field(&[layout::TOKENS_FIELD, canonical.as_str(), symbol.as_str()])
                    .and_then(parse_entry_address)
                {
                    tracing::debug!(network = %canonical, %symbol, "Token resolved from store");
                    return Ok(Some(address));
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(network = %canonical, %symbol, error = %e, "Config store unavailable, using token table")
            }
        }

        if symbol != tokens::USDT {
            return Ok(None);
        }
        tokens::get_usdt_address(&canonical)
            .map(parse_address)
            .transpose()
    }

    /// Store entries for a family, refreshed when older than the TTL
    async fn entries(&self, family: ContractFamily) -> Vec<ContractAddressRecord> {
        if let Some(cached) = self.cache.read().await.get(&family) {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.entries.clone();
            }
        }

        match self.fetch(family).await {
            Ok(entries) => {
                self.cache.write().await.insert(
                    family,
                    CachedFamily {
                        fetched_at: Instant::now(),
                        entries: entries.clone(),
                    },
                );
                entries
            }
            Err(e) => {
                tracing::warn!(%family, error = %e, "Config store unavailable, using cached or fallback addresses");
                self.cache
                    .read()
                    .await
                    .get(&family)
                    .map(|cached| cached.entries.clone())
                    .unwrap_or_default()
            }
        }
    }

    async fn fetch(&self, family: ContractFamily) -> Result<Vec<ContractAddressRecord>> {
        let mut entries = Vec::new();

        let (collection, doc) = family.config_document();
        if let Some(document) = self.store.get(collection, doc).await? {
            entries.extend(flat_entries(family, &document));
        }

        if let Some(per_network) = family.per_network_collection() {
            for document in self.store.list(per_network).await? {
                if let Some(record) = per_network_entry(family, &document) {
                    // per-network documents take precedence over the flat map
                    entries.retain(|e: &ContractAddressRecord| e.network_key != record.network_key);
                    entries.push(record);
                }
            }
        }

        tracing::debug!(%family, count = entries.len(), "Fetched contract addresses");
        Ok(entries)
    }
}

fn parse_entry_address(value: &Value) -> Option<Address> {
    value
        .as_str()
        .and_then(|s| parse_address(s).ok())
        .filter(|address| !address.is_zero())
}

fn updated_at(data: &Value) -> Option<DateTime<Utc>> {
    ["updatedAt", "updateTime"]
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn flat_entries(family: ContractFamily, document: &Document) -> Vec<ContractAddressRecord> {
    let stamp = updated_at(&document.data);
    let mut entries = Vec::new();

    if let Some(map) = document
        .field(&[layout::CONTRACTS_FIELD])
        .and_then(Value::as_object)
    {
        for (network, value) in map {
            match parse_entry_address(value) {
                Some(address) => {
                    let mut record = ContractAddressRecord::new(network.clone(), family, address);
                    record.updated_at = stamp;
                    entries.push(record);
                }
                None => tracing::debug!(%family, network, "Skipping empty or zero contract entry"),
            }
        }
    }

    // single-address documents predate the per-network map
    if entries.is_empty() {
        if let Some(address) = document
            .field(&[layout::CONTRACT_ADDRESS_FIELD])
            .and_then(parse_entry_address)
        {
            let mut record = ContractAddressRecord::new(DEFAULT_ENTRY, family, address);
            record.updated_at = stamp;
            entries.push(record);
        }
    }

    entries
}

fn per_network_entry(family: ContractFamily, document: &Document) -> Option<ContractAddressRecord> {
    let address = document
        .field(&[layout::CONTRACT_ADDRESS_FIELD])
        .or_else(|| document.field(&["address"]))
        .and_then(parse_entry_address)?;
    let mut record = ContractAddressRecord::new(document.id.clone(), family, address);
    record.updated_at = updated_at(&document.data);
    Some(record)
}

fn variants(name: &str) -> Vec<String> {
    let lower = name.trim().to_lowercase();
    let stripped = lower
        .strip_suffix(" mainnet")
        .unwrap_or(&lower)
        .trim()
        .to_string();
    let mut out: Vec<String> = Vec::with_capacity(4);
    for candidate in [
        lower.clone(),
        stripped.clone(),
        lower.replace(' ', ""),
        stripped.replace(' ', ""),
    ] {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Find the entry for a network, returning the address and the rule that matched
fn lookup(
    entries: &[ContractAddressRecord],
    raw: &str,
    canonical: &str,
) -> Option<(Address, &'static str)> {
    let raw = raw.trim();

    if let Some(e) = entries
        .iter()
        .find(|e| e.network_key == raw || e.network_key == canonical)
    {
        return Some((e.address, "exact"));
    }

    let wanted = variants(raw);
    if let Some(e) = entries
        .iter()
        .find(|e| variants(&e.network_key).iter().any(|v| wanted.contains(v)))
    {
        return Some((e.address, "variant"));
    }

    if let Some(e) = entries
        .iter()
        .find(|e| e.network_key != DEFAULT_ENTRY && normalize(&e.network_key) == canonical)
    {
        return Some((e.address, "canonical"));
    }

    entries
        .iter()
        .find(|e| e.network_key == DEFAULT_ENTRY)
        .map(|e| (e.address, "default"))
}
