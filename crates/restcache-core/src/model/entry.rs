// ── Cache entries ──
//
// One RecordEntry per cached record id, one CollectionEntry per cached
// list query. Both carry the fetch time that drives invalidation and GC.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{QueryParams, RecordId, RequestFailure};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// How long a fetched entry stays fresh: ten minutes.
pub const STALE_AFTER_MS: Millis = 10 * 60 * 1000;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

// ── FetchTime ───────────────────────────────────────────────────────

/// Fetch state of an entry. On the wire: `null`, `0`, or the timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchTime {
    /// Never fetched, or invalidated and due for a refetch.
    #[default]
    Unfetched,
    /// A request is in flight.
    InFlight,
    /// Fetched at this time.
    At(Millis),
}

impl FetchTime {
    pub fn timestamp(self) -> Option<Millis> {
        match self {
            Self::At(t) => Some(t),
            Self::Unfetched | Self::InFlight => None,
        }
    }

    pub fn is_in_flight(self) -> bool {
        self == Self::InFlight
    }

    /// `true` once a real timestamp has fallen out of the freshness window.
    ///
    /// Entries without a timestamp carry no staleness signal and are never
    /// expired.
    pub fn is_expired(self, now: Millis) -> bool {
        self.timestamp()
            .is_some_and(|t| t <= now - STALE_AFTER_MS)
    }
}

impl From<Option<Millis>> for FetchTime {
    fn from(raw: Option<Millis>) -> Self {
        match raw {
            None => Self::Unfetched,
            Some(0) => Self::InFlight,
            Some(t) => Self::At(t),
        }
    }
}

impl Serialize for FetchTime {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unfetched => s.serialize_none(),
            Self::InFlight => s.serialize_i64(0),
            Self::At(t) => s.serialize_i64(*t),
        }
    }
}

impl<'de> Deserialize<'de> for FetchTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Option::<Millis>::deserialize(d)?.into())
    }
}

// ── RecordEntry ─────────────────────────────────────────────────────

/// Canonical cached copy of one record.
///
/// Once `fetch_time` is a timestamp exactly one of `record` / `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub record: Option<Value>,
    pub fetch_time: FetchTime,
    pub error: Option<RequestFailure>,
}

impl RecordEntry {
    pub fn in_flight() -> Self {
        Self {
            record: None,
            fetch_time: FetchTime::InFlight,
            error: None,
        }
    }

    pub fn fetched(record: Value, at: Millis) -> Self {
        Self {
            record: Some(record),
            fetch_time: FetchTime::At(at),
            error: None,
        }
    }

    pub fn failed(error: RequestFailure, at: Millis) -> Self {
        Self {
            record: None,
            fetch_time: FetchTime::At(at),
            error: Some(error),
        }
    }
}

// ── CollectionEntry ─────────────────────────────────────────────────

/// Cached result of one parameterized list query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub params: QueryParams,
    pub ids: Vec<RecordId>,
    pub other_info: Map<String, Value>,
    pub fetch_time: FetchTime,
    pub error: Option<RequestFailure>,
}
