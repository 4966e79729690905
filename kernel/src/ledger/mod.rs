// Nightly Build Ledger
//
// The authoritative, ordered record of installed nightly builds.
// Records are kept sorted newest-first and every mutation renumbers
// the derived `ordinal` so it always equals the record's rank.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub mod eviction;
pub mod store;

pub use store::{InMemoryLedgerStore, JsonLedgerStore, LedgerChange, LedgerStore};

/// Fixed textual format used for persisted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger is locked by another process (waited {waited:?} for {path})")]
    Busy { path: PathBuf, waited: Duration },

    #[error("{}", describe_not_found(.selector, .candidates))]
    NotFound {
        selector: String,
        candidates: Vec<DateTime<Utc>>,
    },

    #[error("no nightly builds are installed")]
    Empty,

    #[error("nightly build {id} is already installed")]
    AlreadyInstalled { id: String },

    #[error("directory {0} is already recorded in the ledger")]
    DirectoryInUse(PathBuf),

    #[error("invalid nightly date `{0}`: expected YYYY-MM-DD, YYYY-MM-DD-HHMM or an RFC 3339 timestamp")]
    InvalidDate(String),

    #[error("ledger i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_not_found(selector: &str, candidates: &[DateTime<Utc>]) -> String {
    if candidates.is_empty() {
        return format!("no nightly build matches {selector}");
    }
    let listed: Vec<String> = candidates
        .iter()
        .map(|ts| ts.format("%Y-%m-%d-%H%M").to_string())
        .collect();
    format!(
        "{} nightly builds match {selector}; pick one of: {}",
        candidates.len(),
        listed.join(", ")
    )
}

/// One installed nightly build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Upstream build identifier, used only for dedup.
    #[serde(rename = "node_id")]
    pub id: String,

    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// Absolute install directory.
    pub directory: PathBuf,

    /// Recency rank, 0 = newest. Derived.
    #[serde(rename = "unique_number")]
    pub ordinal: usize,
}

impl VersionRecord {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, directory: PathBuf) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.trunc_subsecs(0),
            directory,
            ordinal: 0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Newest first. Identical timestamps order the lexicographically
/// smaller id as older.
pub fn recency_order(a: &VersionRecord, b: &VersionRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Ordered set of installed nightly builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<VersionRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Build a ledger from records in any order.
    pub fn from_records(records: Vec<VersionRecord>) -> Self {
        let mut ledger = Self { records };
        ledger.normalize();
        ledger
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&VersionRecord> {
        self.records.first()
    }

    pub fn get(&self, ordinal: usize) -> Option<&VersionRecord> {
        self.records.get(ordinal)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn find_by_directory(&self, directory: &Path) -> Option<&VersionRecord> {
        self.records.iter().find(|r| r.directory == directory)
    }

    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &VersionRecord> {
        self.records.iter().filter(move |r| r.date() == date)
    }

    /// Insert a record and evict the oldest entries beyond `limit`.
    ///
    /// Returns the evicted records.
    pub fn insert(
        &mut self,
        record: VersionRecord,
        limit: usize,
    ) -> Result<Vec<VersionRecord>, LedgerError> {
        if self.contains_id(&record.id) {
            return Err(LedgerError::AlreadyInstalled { id: record.id });
        }
        if self.find_by_directory(&record.directory).is_some() {
            return Err(LedgerError::DirectoryInUse(record.directory));
        }

        self.records.push(record);
        self.normalize();

        let (kept, evicted) = eviction::evict(std::mem::take(self), limit);
        *self = kept;
        Ok(evicted)
    }

    /// Remove the newest record.
    pub fn remove_latest(&mut self) -> Result<VersionRecord, LedgerError> {
        if self.records.is_empty() {
            return Err(LedgerError::Empty);
        }
        let removed = self.records.remove(0);
        self.normalize();
        Ok(removed)
    }

    /// Remove the single record matching `selector`.
    ///
    /// Fails with `NotFound` when nothing matches and when more than one
    /// record matches; an ambiguous date never picks an arbitrary build.
    pub fn remove_matching(&mut self, selector: &DateSelector) -> Result<VersionRecord, LedgerError> {
        let matches: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| selector.matches(&r.created_at))
            .map(|(idx, _)| idx)
            .collect();

        match matches.as_slice() {
            [idx] => {
                let removed = self.records.remove(*idx);
                self.normalize();
                Ok(removed)
            }
            _ => Err(LedgerError::NotFound {
                selector: selector.to_string(),
                candidates: matches
                    .iter()
                    .map(|idx| self.records[*idx].created_at)
                    .collect(),
            }),
        }
    }

    pub fn remove_all(&mut self) -> Vec<VersionRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn into_records(self) -> Vec<VersionRecord> {
        self.records
    }

    fn normalize(&mut self) {
        self.records.sort_by(recency_order);
        for (rank, record) in self.records.iter_mut().enumerate() {
            record.ordinal = rank;
        }
    }
}

/// User-supplied identification of a nightly build by time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSelector {
    /// Calendar date (UTC).
    Day(NaiveDate),
    /// Date plus hour and minute, as used in disambiguated directory names.
    Minute(NaiveDateTime),
    /// Full timestamp.
    Exact(DateTime<Utc>),
}

impl DateSelector {
    pub fn matches(&self, ts: &DateTime<Utc>) -> bool {
        match self {
            DateSelector::Day(date) => ts.date_naive() == *date,
            DateSelector::Minute(minute) => {
                let naive = ts.naive_utc();
                naive.date() == minute.date()
                    && naive.hour() == minute.hour()
                    && naive.minute() == minute.minute()
            }
            DateSelector::Exact(exact) => ts == exact,
        }
    }

    /// Whether `input` looks like a nightly date rather than a version.
    pub fn looks_like_date(input: &str) -> bool {
        input.parse::<DateSelector>().is_ok()
    }
}

impl FromStr for DateSelector {
    type Err = LedgerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Ok(DateSelector::Day(date));
        }
        if let Ok(minute) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d-%H%M") {
            return Ok(DateSelector::Minute(minute));
        }
        if let Ok(second) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d-%H%M%S") {
            return Ok(DateSelector::Exact(second.and_utc()));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
            return Ok(DateSelector::Exact(ts.with_timezone(&Utc)));
        }
        Err(LedgerError::InvalidDate(input.to_string()))
    }
}

impl fmt::Display for DateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSelector::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateSelector::Minute(minute) => write!(f, "{}", minute.format("%Y-%m-%d-%H%M")),
            DateSelector::Exact(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    pub(crate) fn record(id: &str, created_at: &str) -> VersionRecord {
        VersionRecord::new(
            id,
            ts(created_at),
            PathBuf::from(format!("/nm/nightly/{id}")),
        )
    }

    fn ids(ledger: &Ledger) -> Vec<&str> {
        ledger.records().iter().map(|r| r.id.as_str()).collect()
    }

    fn assert_ranked(ledger: &Ledger) {
        for (rank, record) in ledger.records().iter().enumerate() {
            assert_eq!(record.ordinal, rank);
        }
        for pair in ledger.records().windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn from_records_sorts_and_renumbers() {
        let ledger = Ledger::from_records(vec![
            record("b", "2024-01-02T00:00:00Z"),
            record("c", "2024-01-03T00:00:00Z"),
            record("a", "2024-01-01T00:00:00Z"),
        ]);

        assert_eq!(ids(&ledger), vec!["c", "b", "a"]);
        assert_ranked(&ledger);
        assert_eq!(ledger.latest().unwrap().id, "c");
    }

    #[test]
    fn insert_beyond_limit_evicts_oldest() {
        let mut ledger = Ledger::from_records(vec![
            record("d1", "2024-01-01T00:00:00Z"),
            record("d2", "2024-01-02T00:00:00Z"),
            record("d3", "2024-01-03T00:00:00Z"),
        ]);

        let evicted = ledger
            .insert(record("d4", "2024-01-04T00:00:00Z"), 3)
            .unwrap();

        assert_eq!(ids(&ledger), vec!["d4", "d3", "d2"]);
        assert_ranked(&ledger);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].directory, PathBuf::from("/nm/nightly/d1"));
    }

    #[test]
    fn insert_never_exceeds_limit() {
        let mut ledger = Ledger::new();
        for day in 1..=12 {
            let id = format!("n{day:02}");
            let created = format!("2024-03-{day:02}T06:00:00Z");
            ledger.insert(record(&id, &created), 5).unwrap();
            assert!(ledger.len() <= 5);
            assert_ranked(&ledger);
        }
        assert_eq!(ledger.latest().unwrap().id, "n12");
        assert_eq!(ledger.get(4).unwrap().id, "n08");
    }

    #[test]
    fn duplicate_id_is_already_installed() {
        let mut ledger = Ledger::from_records(vec![record("a", "2024-01-01T00:00:00Z")]);
        let err = ledger
            .insert(record("a", "2024-01-01T00:00:00Z"), 7)
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyInstalled { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn duplicate_directory_is_rejected() {
        let mut ledger = Ledger::from_records(vec![record("a", "2024-01-01T00:00:00Z")]);
        let mut clash = record("b", "2024-01-02T00:00:00Z");
        clash.directory = PathBuf::from("/nm/nightly/a");

        let err = ledger.insert(clash, 7).unwrap_err();
        assert!(matches!(err, LedgerError::DirectoryInUse(_)));
    }

    #[test]
    fn remove_latest_renumbers() {
        let mut ledger = Ledger::from_records(vec![
            record("a", "2024-01-01T00:00:00Z"),
            record("b", "2024-01-02T00:00:00Z"),
        ]);

        let removed = ledger.remove_latest().unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(ledger.latest().unwrap().ordinal, 0);
        assert_eq!(ledger.latest().unwrap().id, "a");
    }

    #[test]
    fn remove_latest_on_empty_fails() {
        let mut ledger = Ledger::new();
        assert!(matches!(ledger.remove_latest(), Err(LedgerError::Empty)));
    }

    #[test]
    fn remove_by_unique_date() {
        let mut ledger = Ledger::from_records(vec![
            record("a", "2024-02-09T10:00:00Z"),
            record("b", "2024-02-10T10:00:00Z"),
            record("c", "2024-02-11T10:00:00Z"),
        ]);

        let removed = ledger
            .remove_matching(&"2024-02-10".parse().unwrap())
            .unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(ids(&ledger), vec!["c", "a"]);
        assert_ranked(&ledger);
    }

    #[test]
    fn ambiguous_date_is_not_found() {
        let mut ledger = Ledger::from_records(vec![
            record("early", "2024-02-10T03:15:00Z"),
            record("late", "2024-02-10T21:40:00Z"),
        ]);

        let err = ledger
            .remove_matching(&"2024-02-10".parse().unwrap())
            .unwrap_err();
        match &err {
            LedgerError::NotFound { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("2024-02-10-2140"));
        assert_eq!(ledger.len(), 2);

        let removed = ledger
            .remove_matching(&"2024-02-10-2140".parse().unwrap())
            .unwrap();
        assert_eq!(removed.id, "late");
    }

    #[test]
    fn missing_date_is_not_found() {
        let mut ledger = Ledger::from_records(vec![record("a", "2024-02-10T03:15:00Z")]);
        let err = ledger
            .remove_matching(&"2023-12-31".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { ref candidates, .. } if candidates.is_empty()));
    }

    #[test]
    fn remove_all_twice_is_empty() {
        let mut ledger = Ledger::from_records(vec![
            record("a", "2024-01-01T00:00:00Z"),
            record("b", "2024-01-02T00:00:00Z"),
        ]);

        assert_eq!(ledger.remove_all().len(), 2);
        assert!(ledger.is_empty());
        assert!(ledger.remove_all().is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn selector_parsing() {
        assert!(matches!(
            "2024-02-10".parse::<DateSelector>().unwrap(),
            DateSelector::Day(_)
        ));
        assert!(matches!(
            "2024-02-10-1504".parse::<DateSelector>().unwrap(),
            DateSelector::Minute(_)
        ));
        assert!(matches!(
            "2024-02-10T15:04:05Z".parse::<DateSelector>().unwrap(),
            DateSelector::Exact(_)
        ));
        assert!("0.9.5".parse::<DateSelector>().is_err());
        assert!(!DateSelector::looks_like_date("nightly"));
    }

    #[test]
    fn record_json_shape() {
        let json = serde_json::to_value(record("MDc6UmVsZWFzZQ", "2024-01-04T09:30:00Z")).unwrap();
        assert_eq!(json["node_id"], "MDc6UmVsZWFzZQ");
        assert_eq!(json["created_at"], "2024-01-04T09:30:00Z");
        assert_eq!(json["unique_number"], 0);
    }
}
