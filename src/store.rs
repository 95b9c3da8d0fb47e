use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use tracing::debug;

use crate::constants::store::{
    BITCODE_PREFIX, DEFAULT_STORE_DIR, DEFAULT_STORE_FILENAME, INDEX_ENTRY_PREFIX, INDEX_LEN_KEY,
    META_KEY, RECORD_PREFIX, RECORD_VERSION, STORE_VERSION,
};
use crate::data::{
    CanonicalPosting, PostingRecord, PostingStatus, RawPostingId, SalaryRange, SkillTag,
};
use crate::errors::PipelineError;
use crate::taxonomy::Taxonomy;
use crate::trends::TimeRange;
use crate::types::PostingKey;

/// Storage collaborator for canonical posting records.
///
/// `scan` returns a point-in-time snapshot ordered by first-seen, then key, so
/// aggregation can run while ingestion keeps writing.
pub trait PostingStore: Send + Sync {
    /// Record stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<PostingRecord>, PipelineError>;
    /// Insert or replace the record under its posting key.
    fn put(&self, record: PostingRecord) -> Result<(), PipelineError>;
    /// Records whose first-seen falls inside `range`.
    fn scan(&self, range: &TimeRange) -> Result<Vec<PostingRecord>, PipelineError>;

    /// Insert or replace several records.
    fn put_all(&self, records: Vec<PostingRecord>) -> Result<(), PipelineError> {
        for record in records {
            self.put(record)?;
        }
        Ok(())
    }
}

fn sort_snapshot(records: &mut [PostingRecord]) {
    records.sort_by(|a, b| {
        a.posting
            .first_seen
            .cmp(&b.posting.first_seen)
            .then_with(|| a.posting.key.cmp(&b.posting.key))
    });
}

/// Volatile store for tests and single-run pipelines.
#[derive(Debug, Default)]
pub struct InMemoryPostingStore {
    records: RwLock<IndexMap<PostingKey, PostingRecord>>,
}

impl InMemoryPostingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().expect("posting store poisoned").len()
    }

    /// Returns `true` when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PostingStore for InMemoryPostingStore {
    fn get(&self, key: &str) -> Result<Option<PostingRecord>, PipelineError> {
        let records = self.records.read().expect("posting store poisoned");
        Ok(records.get(key).cloned())
    }

    fn put(&self, record: PostingRecord) -> Result<(), PipelineError> {
        let mut records = self.records.write().expect("posting store poisoned");
        records.insert(record.key().clone(), record);
        Ok(())
    }

    fn scan(&self, range: &TimeRange) -> Result<Vec<PostingRecord>, PipelineError> {
        let records = self.records.read().expect("posting store poisoned");
        let mut snapshot: Vec<PostingRecord> = records
            .values()
            .filter(|record| range.contains(record.posting.first_seen))
            .cloned()
            .collect();
        drop(records);
        sort_snapshot(&mut snapshot);
        Ok(snapshot)
    }
}

/// Versioned metadata header stored in file-backed posting stores.
#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
struct StoreMeta {
    version: u8,
    taxonomy_version: String,
    taxonomy_fingerprint: u64,
}

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
struct StoredTimestamp {
    secs: i64,
    nanos: u32,
}

impl From<DateTime<Utc>> for StoredTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            secs: value.timestamp(),
            nanos: value.timestamp_subsec_nanos(),
        }
    }
}

impl TryFrom<StoredTimestamp> for DateTime<Utc> {
    type Error = PipelineError;

    fn try_from(value: StoredTimestamp) -> Result<Self, Self::Error> {
        DateTime::<Utc>::from_timestamp(value.secs, value.nanos).ok_or_else(|| {
            PipelineError::Store(format!(
                "stored timestamp out of range: {}s {}ns",
                value.secs, value.nanos
            ))
        })
    }
}

/// Bitcode mirror of [`PostingRecord`].
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct StoredRecord {
    key: PostingKey,
    company: String,
    title: String,
    provenance: Vec<RawPostingId>,
    urls: Vec<String>,
    first_seen: StoredTimestamp,
    last_seen: StoredTimestamp,
    status: PostingStatus,
    latest_title: String,
    latest_body: String,
    latest_scraped_at: StoredTimestamp,
    skills: Vec<SkillTag>,
    salary: Option<SalaryRange>,
}

impl From<&PostingRecord> for StoredRecord {
    fn from(record: &PostingRecord) -> Self {
        let posting = &record.posting;
        Self {
            key: posting.key.clone(),
            company: posting.company.clone(),
            title: posting.title.clone(),
            provenance: posting.provenance.clone(),
            urls: posting.urls.clone(),
            first_seen: posting.first_seen.into(),
            last_seen: posting.last_seen.into(),
            status: posting.status,
            latest_title: posting.latest_title.clone(),
            latest_body: posting.latest_body.clone(),
            latest_scraped_at: posting.latest_scraped_at.into(),
            skills: record.skills.clone(),
            salary: record.salary.clone(),
        }
    }
}

impl TryFrom<StoredRecord> for PostingRecord {
    type Error = PipelineError;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        Ok(PostingRecord {
            posting: CanonicalPosting {
                key: stored.key,
                company: stored.company,
                title: stored.title,
                provenance: stored.provenance,
                urls: stored.urls,
                first_seen: stored.first_seen.try_into()?,
                last_seen: stored.last_seen.try_into()?,
                status: stored.status,
                latest_title: stored.latest_title,
                latest_body: stored.latest_body,
                latest_scraped_at: stored.latest_scraped_at.try_into()?,
            },
            skills: stored.skills,
            salary: stored.salary,
        })
    }
}

/// File-backed posting store on `simd-r-drive`.
///
/// The header records the store format and the taxonomy the records were
/// extracted with; opening with a different taxonomy fails instead of mixing
/// tags from two alias tables.
pub struct FilePostingStore {
    store: DataStore,
    path: PathBuf,
    keys: RwLock<BTreeSet<PostingKey>>,
    meta: StoreMeta,
}

impl fmt::Debug for FilePostingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePostingStore")
            .field("path", &self.path)
            .field("taxonomy_version", &self.meta.taxonomy_version)
            .finish()
    }
}

impl FilePostingStore {
    /// Open (or create) a store at `path` for records extracted with `taxonomy`.
    pub fn open<P: Into<PathBuf>>(path: P, taxonomy: &Taxonomy) -> Result<Self, PipelineError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let meta = StoreMeta {
            version: STORE_VERSION,
            taxonomy_version: taxonomy.version().to_string(),
            taxonomy_fingerprint: taxonomy.fingerprint(),
        };
        let store = Self {
            store,
            path,
            keys: RwLock::new(BTreeSet::new()),
            meta,
        };
        store.verify_metadata()?;
        let keys = store.load_index()?;
        debug!(path = %store.path.display(), records = keys.len(), "posting store opened");
        *store.keys.write().expect("posting index poisoned") = keys;
        Ok(store)
    }

    /// Default store file path under the crate's default store directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default store file path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.keys.read().expect("posting index poisoned").len()
    }

    /// Returns `true` when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn verify_metadata(&self) -> Result<(), PipelineError> {
        match read_bytes(&self.store, META_KEY)? {
            Some(bytes) => {
                let meta: StoreMeta = decode_payload(&bytes, "store metadata")?;
                if meta.version != STORE_VERSION {
                    return Err(PipelineError::Store(format!(
                        "posting store version mismatch (expected {}, found {})",
                        STORE_VERSION, meta.version
                    )));
                }
                if meta.taxonomy_version != self.meta.taxonomy_version
                    || meta.taxonomy_fingerprint != self.meta.taxonomy_fingerprint
                {
                    return Err(PipelineError::Store(format!(
                        "posting store taxonomy mismatch (store has '{}', pipeline uses '{}')",
                        meta.taxonomy_version, self.meta.taxonomy_version
                    )));
                }
            }
            None => {
                let payload = encode_payload(&bitcode::encode(&self.meta));
                write_bytes(&self.store, META_KEY, &payload)?;
            }
        }
        Ok(())
    }

    fn load_index(&self) -> Result<BTreeSet<PostingKey>, PipelineError> {
        let len: u64 = match read_bytes(&self.store, INDEX_LEN_KEY)? {
            Some(bytes) => decode_payload(&bytes, "posting index length")?,
            None => 0,
        };
        let mut keys = BTreeSet::new();
        for position in 0..len {
            let Some(bytes) = read_bytes(&self.store, &index_entry_key(position))? else {
                return Err(PipelineError::Store(format!(
                    "posting index entry {position} missing"
                )));
            };
            let key = String::from_utf8(bytes).map_err(|err| {
                PipelineError::Store(format!("posting index entry {position} is not UTF-8: {err}"))
            })?;
            keys.insert(key);
        }
        Ok(keys)
    }

    /// Write `record`, appending one index entry when its key is new.
    ///
    /// Returns `true` when the key was added to `keys`.
    fn write_record(
        &self,
        keys: &mut BTreeSet<PostingKey>,
        record: &PostingRecord,
    ) -> Result<bool, PipelineError> {
        let payload = encode_payload(&bitcode::encode(&StoredRecord::from(record)));
        let mut buf = Vec::with_capacity(1 + payload.len());
        buf.push(RECORD_VERSION);
        buf.extend_from_slice(&payload);
        write_bytes(&self.store, &record_key(record.key()), &buf)?;

        if keys.contains(record.key()) {
            return Ok(false);
        }
        let position = keys.len() as u64;
        write_bytes(&self.store, &index_entry_key(position), record.key().as_bytes())?;
        keys.insert(record.key().clone());
        Ok(true)
    }

    // Entries past the stored length are ignored on open, so the length is
    // written last.
    fn write_index_len(&self, len: usize) -> Result<(), PipelineError> {
        let payload = encode_payload(&bitcode::encode(&(len as u64)));
        write_bytes(&self.store, INDEX_LEN_KEY, &payload)
    }

    fn read_record(&self, key: &str) -> Result<Option<PostingRecord>, PipelineError> {
        let Some(bytes) = read_bytes(&self.store, &record_key(key))? else {
            return Ok(None);
        };
        if bytes.first().copied() != Some(RECORD_VERSION) {
            return Err(PipelineError::Store(format!(
                "posting record '{key}' version mismatch"
            )));
        }
        let stored: StoredRecord = decode_payload(&bytes[1..], "posting record")?;
        stored.try_into().map(Some)
    }
}

impl PostingStore for FilePostingStore {
    fn get(&self, key: &str) -> Result<Option<PostingRecord>, PipelineError> {
        self.read_record(key)
    }

    fn put(&self, record: PostingRecord) -> Result<(), PipelineError> {
        let mut keys = self.keys.write().expect("posting index poisoned");
        if self.write_record(&mut keys, &record)? {
            self.write_index_len(keys.len())?;
        }
        Ok(())
    }

    fn put_all(&self, records: Vec<PostingRecord>) -> Result<(), PipelineError> {
        let mut keys = self.keys.write().expect("posting index poisoned");
        let mut added = 0usize;
        let mut result = Ok(());
        for record in &records {
            match self.write_record(&mut keys, record) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        if added > 0 {
            self.write_index_len(keys.len())?;
        }
        result
    }

    fn scan(&self, range: &TimeRange) -> Result<Vec<PostingRecord>, PipelineError> {
        let keys: Vec<PostingKey> = self
            .keys
            .read()
            .expect("posting index poisoned")
            .iter()
            .cloned()
            .collect();
        let mut snapshot = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.read_record(&key)?
                && range.contains(record.posting.first_seen)
            {
                snapshot.push(record);
            }
        }
        sort_snapshot(&mut snapshot);
        Ok(snapshot)
    }
}

fn record_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_PREFIX.len() + key.len());
    out.extend_from_slice(RECORD_PREFIX);
    out.extend_from_slice(key.as_bytes());
    out
}

fn index_entry_key(position: u64) -> Vec<u8> {
    let mut out = INDEX_ENTRY_PREFIX.to_vec();
    out.extend_from_slice(position.to_string().as_bytes());
    out
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), PipelineError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn encode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_payload<T>(bytes: &[u8], what: &str) -> Result<T, PipelineError>
where
    T: for<'a> bitcode::Decode<'a>,
{
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(PipelineError::Store(format!(
            "{what} payload missing expected prefix"
        )));
    }
    bitcode::decode(&bytes[1..])
        .map_err(|err| PipelineError::Store(format!("corrupt {what}: {err}")))
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> PipelineError {
    PipelineError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SalaryPeriod, SkillCategory};
    use crate::taxonomy::{SalaryConventions, SkillEntry};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap() + Duration::days(n)
    }

    fn record(key: &str, first_seen: DateTime<Utc>) -> PostingRecord {
        PostingRecord {
            posting: CanonicalPosting {
                key: key.to_string(),
                company: "Acme".into(),
                title: "Engineer".into(),
                provenance: vec![RawPostingId {
                    source: "board".into(),
                    native_id: key.to_string(),
                }],
                urls: vec!["https://acme.test/jobs/1".into()],
                first_seen,
                last_seen: first_seen + Duration::milliseconds(1_500),
                status: PostingStatus::Stale,
                latest_title: "Engineer".into(),
                latest_body: "Rust and Kafka".into(),
                latest_scraped_at: first_seen,
            },
            skills: vec![SkillTag {
                name: "rust".into(),
                category: SkillCategory::Language,
                confidence: 1.0,
                matched: "Rust".into(),
                span_start: 0,
                span_end: 4,
            }],
            salary: Some(SalaryRange {
                min: 100_000.0,
                max: 120_000.0,
                currency: "USD".into(),
                period: SalaryPeriod::Year,
                is_estimated: false,
            }),
        }
    }

    #[test]
    fn in_memory_scan_filters_and_orders() {
        let store = InMemoryPostingStore::new();
        store.put(record("b::x", day(2))).unwrap();
        store.put(record("a::x", day(2))).unwrap();
        store.put(record("c::x", day(0))).unwrap();
        store.put(record("d::x", day(9))).unwrap();

        let range = TimeRange::new(day(0), day(5)).unwrap();
        let keys: Vec<String> = store
            .scan(&range)
            .unwrap()
            .into_iter()
            .map(|record| record.posting.key)
            .collect();
        assert_eq!(keys, vec!["c::x", "a::x", "b::x"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn in_memory_put_replaces_by_key() {
        let store = InMemoryPostingStore::new();
        store.put(record("a::x", day(0))).unwrap();
        let mut updated = record("a::x", day(0));
        updated.salary = None;
        store.put(updated.clone()).unwrap();
        assert_eq!(store.get("a::x").unwrap(), Some(updated));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn file_store_persists_records_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let taxonomy = Taxonomy::builtin().unwrap();
        let original = record("acme::engineer", day(1));
        {
            let store = FilePostingStore::open(&path, &taxonomy).unwrap();
            store.put(original.clone()).unwrap();
            store.put(record("globex::engineer", day(3))).unwrap();
            assert_eq!(store.len(), 2);
        }

        let reopened = FilePostingStore::open(&path, &taxonomy).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("acme::engineer").unwrap(), Some(original));
        let all = reopened.scan(&TimeRange::all()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].posting.key, "acme::engineer");
    }

    #[test]
    fn file_store_growth_stays_linear_in_record_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let taxonomy = Taxonomy::builtin().unwrap();
        let store = FilePostingStore::open(&path, &taxonomy).unwrap();
        let put_range = |range: std::ops::Range<usize>| {
            for idx in range {
                store
                    .put(record(&format!("company{idx}::engineer"), day(0)))
                    .unwrap();
            }
        };

        put_range(0..1_000);
        let per_record_small = fs::metadata(&path).unwrap().len() / 1_000;
        put_range(1_000..3_000);
        let per_record_large = fs::metadata(&path).unwrap().len() / 3_000;
        assert!(
            per_record_large * 2 <= per_record_small * 3,
            "bytes per record grew from {per_record_small} to {per_record_large}"
        );

        store
            .put_all(
                (3_000..3_500)
                    .map(|idx| record(&format!("company{idx}::engineer"), day(1)))
                    .collect(),
            )
            .unwrap();
        drop(store);
        let reopened = FilePostingStore::open(&path, &taxonomy).unwrap();
        assert_eq!(reopened.len(), 3_500);
        assert!(reopened.get("company3499::engineer").unwrap().is_some());
    }

    #[test]
    fn file_store_rejects_different_taxonomy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let builtin = Taxonomy::builtin().unwrap();
        FilePostingStore::open(&path, &builtin).unwrap();

        let custom = Taxonomy::new(
            "custom-1",
            vec![SkillEntry {
                name: "rust".into(),
                category: SkillCategory::Language,
                priority: 0,
                aliases: vec![],
            }],
            SalaryConventions::default(),
        )
        .unwrap();
        let err = FilePostingStore::open(&path, &custom).unwrap_err();
        assert!(matches!(err, PipelineError::Store(msg) if msg.contains("taxonomy mismatch")));
    }

    #[test]
    fn file_store_accepts_directory_path() {
        let dir = tempdir().unwrap();
        let taxonomy = Taxonomy::builtin().unwrap();
        let store = FilePostingStore::open(dir.path(), &taxonomy).unwrap();
        store.put(record("a::x", day(0))).unwrap();
        assert!(dir.path().join(DEFAULT_STORE_FILENAME).is_file());
        assert!(format!("{store:?}").contains("FilePostingStore"));
    }

    #[test]
    fn payload_requires_prefix() {
        let err = decode_payload::<StoreMeta>(&[0x00, 0x01], "store metadata").unwrap_err();
        assert!(matches!(err, PipelineError::Store(msg) if msg.contains("missing expected prefix")));
    }

    #[test]
    fn default_paths_use_store_filename() {
        assert_eq!(
            FilePostingStore::default_path_in_dir("/tmp/jobs"),
            PathBuf::from("/tmp/jobs").join(DEFAULT_STORE_FILENAME)
        );
        assert!(FilePostingStore::default_path().starts_with(DEFAULT_STORE_DIR));
    }
}
