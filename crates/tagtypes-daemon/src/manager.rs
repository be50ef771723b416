//! Tag definition cache manager
//!
//! Owns the in-memory table of tag definitions and the protocol that
//! keeps it warm: persisted cache first, then remote fetch, then built-in
//! fallback, with a 48 hour staleness window and a legacy-storage
//! migration path. Callers never observe an empty manager after warmup,
//! and a failed refresh never discards previously known definitions.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use tagtypes_core::builtin_records;
use tagtypes_core::record::{self, StoredRecord, TagRecord, WireRecord};

use crate::fetch::{parse_type_id, FetchAdapter};
use crate::store::{StorageAdapter, StoredPayload};

/// Version of the persisted payload format
pub const STORAGE_VERSION: u32 = 1;
/// Key the current payload is persisted under
pub const STORAGE_KEY: &str = "opendisplay_tagtypes";
/// Key used by previous releases, migrated on sight
pub const LEGACY_STORAGE_KEY: &str = "open_display_tagtypes";

/// How long cached definitions stay trustworthy before a refresh attempt
fn cache_duration() -> Duration {
    Duration::hours(48)
}

#[derive(Error, Debug)]
pub enum TagTypesError {
    #[error("Unknown tag type {0}")]
    UnknownType(u16),
}

/// The record table plus its freshness timestamp
///
/// Replaced wholesale on every successful load or refresh, never mutated
/// in place, so readers see a fully-old or fully-new table.
#[derive(Debug, Default)]
struct TableState {
    records: HashMap<u16, TagRecord>,
    last_update: Option<DateTime<Utc>>,
}

/// Manages tag definitions with tiered fallback
///
/// One instance is constructed by the host application and shared by
/// reference; there is no process-global slot. All table-mutating work
/// (warmup, migration, refresh) serializes through one async guard so
/// concurrent callers collapse into a single in-flight load. The
/// non-warming accessors ([`get_dimensions`](Self::get_dimensions),
/// [`get_name`](Self::get_name), [`contains`](Self::contains)) read the
/// table synchronously and degrade to safe defaults.
pub struct TagTypesManager {
    store: Arc<dyn StorageAdapter>,
    fetcher: Arc<dyn FetchAdapter>,
    /// On-disk artifact written by pre-storage-adapter releases
    legacy_file: PathBuf,
    table: RwLock<TableState>,
    load_guard: Mutex<()>,
}

impl TagTypesManager {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        fetcher: Arc<dyn FetchAdapter>,
        legacy_file: PathBuf,
    ) -> Self {
        debug!("Tag definition manager created");
        Self {
            store,
            fetcher,
            legacy_file,
            table: RwLock::new(TableState::default()),
            load_guard: Mutex::new(()),
        }
    }

    /// Ensure definitions are loaded and not too old
    ///
    /// Idempotent warmup: on an empty table runs the load protocol
    /// (storage, then legacy storage with migration, then remote fetch,
    /// then built-in fallback), afterwards attempts one refresh if the
    /// freshness timestamp is missing or older than 48 hours. A failed
    /// refresh is logged and the existing table retained.
    pub async fn ensure_loaded(&self) {
        let _guard = self.load_guard.lock().await;

        if self.table_is_empty() {
            self.load_stored_data().await;
        }

        if self.table_is_empty() {
            // The load protocol always leaves something behind; this is a
            // last resort against a regression in it.
            error!("No tag definitions available after loading, installing fallback");
            self.install_fallback();
        }

        let expired = match self.last_update() {
            Some(ts) => Utc::now() - ts > cache_duration(),
            None => true,
        };
        if expired {
            debug!("Tag definition cache expired, attempting refresh");
            if !self.refresh_locked().await {
                warn!("Failed to refresh tag definitions, keeping existing table");
            }
        }
    }

    /// Cold-start load: storage, legacy storage, remote, fallback - in
    /// that order - then one legacy reconciliation pass
    async fn load_stored_data(&self) {
        let migrated = self.populate_from_sources().await;
        self.reconcile_legacy(migrated).await;
    }

    /// Returns true when the table was populated by legacy-store migration
    async fn populate_from_sources(&self) -> bool {
        match self.store.load(STORAGE_KEY).await {
            Ok(Some(payload)) if payload.version == STORAGE_VERSION => {
                self.install_payload(payload);
                return false;
            }
            Ok(Some(payload)) => {
                warn!(
                    found = payload.version,
                    expected = STORAGE_VERSION,
                    "Stored tag definitions version mismatch, refetching fresh definitions"
                );
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "Error loading tag definitions from storage"),
        }

        match self.store.load(LEGACY_STORAGE_KEY).await {
            Ok(Some(payload)) if payload.version == STORAGE_VERSION => {
                self.install_payload(payload);
                self.save_to_store().await;
                return true;
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Error loading legacy tag definitions from storage"),
        }

        if !self.refresh_locked().await && self.table_is_empty() {
            warn!(
                "Failed to fetch tag definitions and no stored data available, \
                 loading fallback definitions"
            );
            self.install_fallback();
        }
        false
    }

    /// Best-effort cleanup of legacy storage, funnel for every load path
    async fn reconcile_legacy(&self, migrated: bool) {
        if migrated {
            match self.store.remove(LEGACY_STORAGE_KEY).await {
                Ok(()) => debug!("Removed legacy tag definition store"),
                Err(e) => warn!(error = %e, "Failed to remove legacy tag definition store"),
            }
        }

        match tokio::fs::remove_file(&self.legacy_file).await {
            Ok(()) => info!(
                path = %self.legacy_file.display(),
                "Migrated tag definitions, legacy file removed"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(
                path = %self.legacy_file.display(),
                error = %e,
                "Error removing legacy tag definition file"
            ),
        }
    }

    /// Populate the table from a persisted payload
    ///
    /// Entries with unparsable ID keys or invalid record bodies are
    /// skipped individually; a missing or malformed timestamp falls back
    /// to now.
    fn install_payload(&self, payload: StoredPayload) {
        let last_update = payload
            .last_update
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut records = HashMap::new();
        for (id_str, value) in payload.tag_types {
            let type_id = match id_str.parse::<u16>() {
                Ok(id) => id,
                Err(_) => {
                    error!(id = %id_str, "Skipping stored tag definition with invalid ID key");
                    continue;
                }
            };
            match serde_json::from_value::<StoredRecord>(value) {
                Ok(stored) => {
                    let tag = TagRecord::from_stored(type_id, stored);
                    debug!(type_id, name = %tag.name, "Loaded tag definition");
                    records.insert(type_id, tag);
                }
                Err(e) => error!(type_id, error = %e, "Skipping invalid stored tag definition"),
            }
        }

        info!(count = records.len(), "Loaded tag definitions from storage");
        self.swap_table(records, Some(last_update));
    }

    /// Persist the current table under the current storage key
    ///
    /// Storage failures are logged, never propagated.
    async fn save_to_store(&self) {
        let payload = {
            let mut table = self.write_table();
            if table.last_update.is_none() {
                table.last_update = Some(Utc::now());
            }

            let mut tag_types = HashMap::new();
            for (type_id, tag) in &table.records {
                match serde_json::to_value(tag.to_stored()) {
                    Ok(value) => {
                        tag_types.insert(type_id.to_string(), value);
                    }
                    Err(e) => error!(
                        type_id = *type_id,
                        error = %e,
                        "Failed to serialize tag definition"
                    ),
                }
            }

            StoredPayload {
                version: STORAGE_VERSION,
                last_update: table.last_update.map(|t| t.to_rfc3339()),
                tag_types,
            }
        };

        if let Err(e) = self.store.save(STORAGE_KEY, &payload).await {
            error!(error = %e, "Error saving tag definitions to storage");
        }
    }

    /// Fetch fresh definitions from the remote repository
    ///
    /// Two phases: list the definition directory, then download and
    /// validate each entry. Invalid entries are skipped individually.
    /// The new table is assembled on the side and installed (and
    /// persisted) only if non-empty, so a failed or empty refresh leaves
    /// existing definitions untouched. On success the remote set replaces
    /// the table wholesale - IDs absent from the new listing are dropped.
    ///
    /// Returns whether a new table was installed.
    pub async fn refresh(&self) -> bool {
        // Table mutation serializes through the same guard as warmup, so
        // concurrent refreshers never run parallel fetches or interleave
        // saves with an in-flight load.
        let _guard = self.load_guard.lock().await;
        self.refresh_locked().await
    }

    /// Refresh body, caller must hold `load_guard`
    async fn refresh_locked(&self) -> bool {
        let entries = match self.fetcher.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Error listing remote tag definitions");
                return false;
            }
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let Some(base) = entry.name.strip_suffix(".json") else {
                continue;
            };
            match parse_type_id(base) {
                Some(type_id) => {
                    debug!(file = %entry.name, type_id, "Parsed tag type ID");
                    candidates.push((type_id, entry.download_url));
                }
                None => warn!(file = %entry.name, "Could not parse tag type ID from filename"),
            }
        }

        let mut new_types = HashMap::new();
        for (type_id, url) in candidates {
            let text = match self.fetcher.fetch_text(&url).await {
                Ok(text) => text,
                Err(e) => {
                    error!(type_id, error = %e, "Error downloading tag definition");
                    continue;
                }
            };
            match serde_json::from_str::<WireRecord>(&text) {
                Ok(wire) if wire.has_required_fields() => {
                    let tag = TagRecord::from_wire(type_id, wire);
                    debug!(type_id, name = %tag.name, "Fetched tag definition");
                    new_types.insert(type_id, tag);
                }
                Ok(_) => warn!(type_id, "Tag definition missing required fields, skipping"),
                Err(e) => error!(type_id, error = %e, "Invalid JSON in tag definition"),
            }
        }

        if new_types.is_empty() {
            warn!("No valid tag definitions found in remote repository");
            return false;
        }

        let count = new_types.len();
        self.swap_table(new_types, Some(Utc::now()));
        info!(count, "Loaded tag definitions from remote repository");
        self.save_to_store().await;
        true
    }

    /// Install the built-in fallback table
    fn install_fallback(&self) {
        let records = builtin_records();
        warn!(count = records.len(), "Loaded built-in fallback tag definitions");
        self.swap_table(records, Some(Utc::now()));
    }

    /// Get the definition for a tag type, warming the cache first
    pub async fn get_record(&self, type_id: u16) -> Result<TagRecord, TagTypesError> {
        self.ensure_loaded().await;
        self.read_table()
            .records
            .get(&type_id)
            .cloned()
            .ok_or(TagTypesError::UnknownType(type_id))
    }

    /// Display dimensions for a tag type, `(296, 128)` when unknown
    pub fn get_dimensions(&self, type_id: u16) -> (u32, u32) {
        self.read_table()
            .records
            .get(&type_id)
            .map(|tag| tag.dimensions())
            .unwrap_or((record::DEFAULT_WIDTH, record::DEFAULT_HEIGHT))
    }

    /// Display name for a tag type, `"Unknown Type {id}"` when unknown
    pub fn get_name(&self, type_id: u16) -> String {
        self.read_table()
            .records
            .get(&type_id)
            .map(|tag| tag.name.clone())
            .unwrap_or_else(|| record::unknown_type_name(type_id))
    }

    /// Whether a definition exists for the given tag type
    pub fn contains(&self, type_id: u16) -> bool {
        self.read_table().records.contains_key(&type_id)
    }

    /// A copy of the full table; caller mutation does not affect the manager
    pub fn all_records(&self) -> HashMap<u16, TagRecord> {
        self.read_table().records.clone()
    }

    /// Number of known tag definitions
    pub fn count(&self) -> usize {
        self.read_table().records.len()
    }

    /// When the table was last populated from storage or remote
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.read_table().last_update
    }

    /// Discard the table and timestamp; the next access re-warms
    ///
    /// Intended for hosts that wipe persisted state externally.
    pub fn reset(&self) {
        self.swap_table(HashMap::new(), None);
        info!("Tag definition manager reset");
    }

    fn table_is_empty(&self) -> bool {
        self.read_table().records.is_empty()
    }

    /// Replace the table wholesale; the only mutation path
    fn swap_table(&self, records: HashMap<u16, TagRecord>, last_update: Option<DateTime<Utc>>) {
        *self.write_table() = TableState {
            records,
            last_update,
        };
    }

    fn read_table(&self) -> RwLockReadGuard<'_, TableState> {
        self.table.read().expect("tag table lock poisoned")
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, TableState> {
        self.table.write().expect("tag table lock poisoned")
    }
}
