use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{RawRecord, Table, TableRow};

/// Current schema version, recorded in the `meta` partition. Evolution is
/// additive-only: new partitions may appear between versions, existing rows
/// stay readable. A keyspace written by a newer version is refused.
pub const SCHEMA_VERSION: u64 = 1;

const META_PARTITION: &str = "meta";
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// File-backed store owning the persisted schema and all write access.
/// One fjall partition per table; rows are JSON values keyed by their
/// natural-key string, so a second upsert of an identical record is
/// observably a no-op.
pub struct Store {
    keyspace: Keyspace,
    partitions: HashMap<Table, PartitionHandle>,
    meta: PartitionHandle,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path.as_ref())?;
        info!("Opening store at {}", path.as_ref().display());

        let keyspace = fjall::Config::new(path.as_ref()).open()?;
        let meta = keyspace.open_partition(META_PARTITION, PartitionCreateOptions::default())?;

        let mut partitions = HashMap::new();
        for table in Table::ALL {
            let partition =
                keyspace.open_partition(table.name(), PartitionCreateOptions::default())?;
            partitions.insert(table, partition);
        }

        let store = Store {
            keyspace,
            partitions,
            meta,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Consults the schema version marker and applies additive migrations.
    /// Opening the partitions above already created any tables new to this
    /// version, so all that remains is bumping the marker, or refusing a
    /// keyspace written by a newer schema.
    fn migrate(&self) -> Result<(), StoreError> {
        let stored = match self.meta.get(SCHEMA_VERSION_KEY)? {
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes).to_string();
                Some(text.parse::<u64>().map_err(|_| {
                    StoreError::Schema(format!("unreadable schema version marker: {text:?}"))
                })?)
            }
            None => None,
        };

        match stored {
            None => {
                debug!("Initializing schema at version {SCHEMA_VERSION}");
                self.meta
                    .insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_string())?;
            }
            Some(version) if version > SCHEMA_VERSION => {
                return Err(StoreError::Schema(format!(
                    "store was written by schema version {version}, \
                     this build supports up to {SCHEMA_VERSION}"
                )));
            }
            Some(version) if version < SCHEMA_VERSION => {
                info!("Migrating schema from version {version} to {SCHEMA_VERSION}");
                self.meta
                    .insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_string())?;
            }
            Some(_) => debug!("Schema up to date at version {SCHEMA_VERSION}"),
        }
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .meta
            .get(SCHEMA_VERSION_KEY)?
            .and_then(|bytes| String::from_utf8_lossy(&bytes).parse::<u64>().ok()))
    }

    #[cfg(test)]
    pub(crate) fn force_schema_version(&self, version: u64) -> Result<(), StoreError> {
        self.meta.insert(SCHEMA_VERSION_KEY, version.to_string())?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn partition(&self, table: Table) -> &PartitionHandle {
        // Every table is opened in `open`; a miss is a programming error.
        &self.partitions[&table]
    }

    /// Upserts a typed batch into its table atomically: either all rows land
    /// or none do. Rows sharing a natural key with an existing row replace it.
    pub fn upsert<R: TableRow>(&self, rows: &[R]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let partition = self.partition(R::TABLE);
        let mut batch = self.keyspace.batch();
        for row in rows {
            batch.insert(partition, row.key(), serde_json::to_vec(row)?);
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Upserted {} rows into {}", rows.len(), R::TABLE.name());
        Ok(rows.len() as u64)
    }

    /// Upserts a mixed connector batch, routing each record to its raw table
    /// inside one atomic write batch.
    pub fn upsert_raw(&self, records: &[RawRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut batch = self.keyspace.batch();
        for record in records {
            let partition = self.partition(record.table());
            batch.insert(partition, record.key(), record.to_value()?);
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Upserted {} raw records", records.len());
        Ok(records.len() as u64)
    }

    pub fn get<R: TableRow>(&self, key: &str) -> Result<Option<R>, StoreError> {
        match self.partition(R::TABLE).get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All rows of a table in natural-key order.
    pub fn scan<R: TableRow>(&self) -> Result<Vec<R>, StoreError> {
        let mut rows = Vec::new();
        for item in self.partition(R::TABLE).iter() {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Rows whose natural key starts with `prefix`, in key order.
    pub fn scan_prefix<R: TableRow>(&self, prefix: &str) -> Result<Vec<R>, StoreError> {
        let mut rows = Vec::new();
        for item in self.partition(R::TABLE).prefix(prefix) {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Filtered read access for the aggregator and external collaborators.
    /// Rows are visited in key order, so results are deterministic.
    pub fn query<R, F>(&self, filter: F) -> Result<Vec<R>, StoreError>
    where
        R: TableRow,
        F: Fn(&R) -> bool,
    {
        let mut rows = Vec::new();
        for item in self.partition(R::TABLE).iter() {
            let (_, value) = item?;
            let row: R = serde_json::from_slice(&value)?;
            if filter(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub fn count(&self, table: Table) -> Result<u64, StoreError> {
        Ok(self.partition(table).len()? as u64)
    }

    /// Per-table row counts, used by `status()` and the run report.
    pub fn record_counts(&self) -> Result<BTreeMap<&'static str, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for table in Table::ALL {
            counts.insert(table.name(), self.count(table)?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EtfFlowRow, FearGreedRow, OhlcRow, Session};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn fng_row(date: &str, value: i64) -> FearGreedRow {
        FearGreedRow {
            as_of_date: date.parse().unwrap(),
            value,
            classification: "FEAR".to_string(),
        }
    }

    fn ohlc_row(asset: &str, hour: u32, close: f64) -> OhlcRow {
        OhlcRow {
            asset: asset.to_string(),
            ts_utc: Utc.with_ymd_and_hms(2025, 6, 9, hour, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            session: Session::classify(hour),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let rows = vec![fng_row("2025-06-08", 30), fng_row("2025-06-09", 35)];
        store.upsert(&rows).unwrap();
        let first: Vec<FearGreedRow> = store.scan().unwrap();

        store.upsert(&rows).unwrap();
        let second: Vec<FearGreedRow> = store.scan().unwrap();

        assert_eq!(store.count(Table::SentimentDaily).unwrap(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_natural_key_replaces_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.upsert(&[fng_row("2025-06-09", 35)]).unwrap();
        store.upsert(&[fng_row("2025-06-09", 60)]).unwrap();

        assert_eq!(store.count(Table::SentimentDaily).unwrap(), 1);
        let stored: FearGreedRow = store.get("2025-06-09").unwrap().unwrap();
        assert_eq!(stored.value, 60);
    }

    #[test]
    fn test_scan_prefix_scopes_by_asset_and_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store
            .upsert(&[
                ohlc_row("BTC", 0, 100.0),
                ohlc_row("BTC", 23, 110.0),
                ohlc_row("ETH", 12, 2000.0),
            ])
            .unwrap();

        let btc: Vec<OhlcRow> = store.scan_prefix("BTC/2025-06-09T").unwrap();
        assert_eq!(btc.len(), 2);
        // Key order is chronological within a day
        assert_eq!(btc[0].close, 100.0);
        assert_eq!(btc[1].close, 110.0);

        let eth: Vec<OhlcRow> = store.scan_prefix("ETH/").unwrap();
        assert_eq!(eth.len(), 1);
    }

    #[test]
    fn test_query_filters_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        store
            .upsert(&[
                EtfFlowRow {
                    as_of_date: date,
                    ticker: "IBIT".to_string(),
                    net_flow_usd: Some(100.0),
                    aum_usd: None,
                    source: "API".to_string(),
                },
                EtfFlowRow {
                    as_of_date: date,
                    ticker: "FBTC".to_string(),
                    net_flow_usd: Some(-40.0),
                    aum_usd: None,
                    source: "API".to_string(),
                },
            ])
            .unwrap();

        let inflows: Vec<EtfFlowRow> = store
            .query(|row: &EtfFlowRow| row.net_flow_usd.unwrap_or(0.0) > 0.0)
            .unwrap();
        assert_eq!(inflows.len(), 1);
        assert_eq!(inflows[0].ticker, "IBIT");
    }

    #[test]
    fn test_schema_version_recorded_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION));
        }
        // Reopen reads the marker back
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_newer_schema_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.force_schema_version(SCHEMA_VERSION + 1).unwrap();
        }
        let result = Store::open(dir.path());
        assert!(matches!(result, Err(StoreError::Schema(_))));
    }

    #[test]
    fn test_record_counts_cover_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.upsert(&[fng_row("2025-06-09", 35)]).unwrap();

        let counts = store.record_counts().unwrap();
        assert_eq!(counts.len(), Table::ALL.len());
        assert_eq!(counts["sentiment_daily"], 1);
        assert_eq!(counts["ohlc_hourly"], 0);
    }
}
