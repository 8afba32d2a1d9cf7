use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, DB};

use crate::metrics_const::STORE_SIZE_GAUGE;

/// Durable set of already-observed dedup keys for one topic partition.
///
/// Writes go through the RocksDB WAL, so everything flushed at a commit
/// barrier survives restart. Atomicity of `check_and_record` relies on the
/// partition's single-writer discipline: each partition's records are
/// processed sequentially by the consumer that owns it, never concurrently.
#[derive(Clone)]
pub struct DedupStore {
    db: Arc<DB>,
    topic: String,
    partition: i32,
}

impl DedupStore {
    const SEEN_KEYS_CF: &'static str = "seen_keys";
    const SEEN_MARKER: &'static [u8] = &[1];

    pub fn new(path: &Path, topic: String, partition: i32) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf_descriptors(
            &opts,
            path,
            vec![ColumnFamilyDescriptor::new(
                Self::SEEN_KEYS_CF,
                Options::default(),
            )],
        )
        .with_context(|| {
            format!(
                "Failed to open dedup store for {}:{} at {}",
                topic,
                partition,
                path.display()
            )
        })?;

        Ok(Self {
            db: Arc::new(db),
            topic,
            partition,
        })
    }

    fn seen_keys_cf(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(Self::SEEN_KEYS_CF)
            .ok_or_else(|| anyhow::anyhow!("Missing column family '{}'", Self::SEEN_KEYS_CF))
    }

    /// True iff the key was previously recorded as observed.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let cf = self.seen_keys_cf()?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    /// Mark a key as observed. Visible to subsequent reads immediately;
    /// durable once the WAL is flushed at the next commit barrier.
    pub fn record(&self, key: &str) -> Result<()> {
        let cf = self.seen_keys_cf()?;
        self.db.put_cf(cf, key, Self::SEEN_MARKER)?;
        Ok(())
    }

    /// Atomic check-then-set under the partition's single writer. Returns
    /// true when the key is first-seen (and records it), false for a
    /// duplicate (no write).
    pub fn check_and_record(&self, key: &str) -> Result<bool> {
        if self.contains(key)? {
            return Ok(false);
        }
        self.record(key)?;
        Ok(true)
    }

    /// Sync the WAL to disk. Called at every commit barrier, before offsets
    /// are committed, so recorded keys are never less durable than the read
    /// offsets that produced them.
    pub fn flush_wal(&self) -> Result<()> {
        self.db.flush_wal(true).with_context(|| {
            format!("Failed to flush WAL for {}:{}", self.topic, self.partition)
        })?;
        self.publish_size_gauge();
        Ok(())
    }

    /// Full flush of memtables and WAL. Used on revocation and shutdown.
    pub fn flush(&self) -> Result<()> {
        let cf = self.seen_keys_cf()?;
        self.db.flush_cf(cf).with_context(|| {
            format!("Failed to flush store for {}:{}", self.topic, self.partition)
        })?;
        self.flush_wal()
    }

    /// Estimated live data size, exposed so unbounded key retention stays an
    /// observable quantity rather than a silent one.
    pub fn estimated_size(&self) -> Result<u64> {
        let cf = self.seen_keys_cf()?;
        Ok(self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-live-data-size")?
            .unwrap_or(0))
    }

    fn publish_size_gauge(&self) {
        if let Ok(size) = self.estimated_size() {
            metrics::gauge!(
                STORE_SIZE_GAUGE,
                "topic" => self.topic.clone(),
                "partition" => self.partition.to_string(),
            )
            .set(size as f64);
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> DedupStore {
        DedupStore::new(dir.path(), "events".to_string(), 0).unwrap()
    }

    #[test]
    fn first_seen_then_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(store.check_and_record("HOST1:42").unwrap());
        assert!(!store.check_and_record("HOST1:42").unwrap());
        assert!(store.check_and_record("HOST1:43").unwrap());
    }

    #[test]
    fn record_is_visible_to_contains() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(!store.contains("HOST1:42").unwrap());
        store.record("HOST1:42").unwrap();
        assert!(store.contains("HOST1:42").unwrap());
    }

    #[test]
    fn recorded_keys_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            assert!(store.check_and_record("HOST1:42").unwrap());
            store.flush().unwrap();
        }

        let store = open(&dir);
        assert!(!store.check_and_record("HOST1:42").unwrap());
        assert!(store.check_and_record("HOST2:42").unwrap());
    }

    #[test]
    fn distinct_pairs_never_collide() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(store.check_and_record("HOST1:23").unwrap());
        assert!(store.check_and_record("HOST12:3").unwrap());
    }
}
