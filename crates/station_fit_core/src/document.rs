//! crates/station_fit_core/src/document.rs
//!
//! The schemaless document model shared by every store adapter: slash-separated
//! paths, field maps, queries with client-side evaluation, and batched writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::ports::{PortError, PortResult};

/// The field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

//=========================================================================================
// Paths
//=========================================================================================

/// Path of a single document, e.g. `profiles/abc/checkoffs/std-1`.
///
/// A well-formed document path has an even, non-zero number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(String);

/// Path of a collection, e.g. `weekly_logs/2024-W05/entries`.
///
/// A well-formed collection path has an odd number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

fn segment_count(raw: &str) -> Option<usize> {
    let mut count = 0;
    for segment in raw.split('/') {
        if segment.trim().is_empty() {
            return None;
        }
        count += 1;
    }
    Some(count)
}

impl DocPath {
    /// Parses and validates a document path.
    pub fn parse(raw: &str) -> PortResult<Self> {
        match segment_count(raw) {
            Some(n) if n % 2 == 0 => Ok(Self(raw.to_string())),
            _ => Err(PortError::Invalid(format!("'{}' is not a document path", raw))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').collect()
    }

    /// The last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The collection that contains this document.
    pub fn collection(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(segment_count(&self.0), Some(n) if n % 2 == 0)
    }
}

impl CollectionPath {
    /// Parses and validates a collection path.
    pub fn parse(raw: &str) -> PortResult<Self> {
        match segment_count(raw) {
            Some(n) if n % 2 == 1 => Ok(Self(raw.to_string())),
            _ => Err(PortError::Invalid(format!("'{}' is not a collection path", raw))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the path of a document inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    /// The owning document for sub-collections, `None` for root collections.
    pub fn parent(&self) -> Option<DocPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocPath(parent.to_string()))
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(segment_count(&self.0), Some(n) if n % 2 == 1)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects identifiers that would change the shape of a path.
pub fn ensure_id(id: &str) -> PortResult<()> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(PortError::Invalid(format!("'{}' is not a valid document id", id)));
    }
    Ok(())
}

/// Well-known collection and document locations.
pub mod paths {
    use super::{CollectionPath, DocPath};

    fn collection(raw: String) -> CollectionPath {
        CollectionPath(raw)
    }

    pub fn profiles() -> CollectionPath {
        collection("profiles".into())
    }

    pub fn profile(id: &str) -> DocPath {
        profiles().doc(id)
    }

    pub fn checkoffs(profile_id: &str) -> CollectionPath {
        collection(format!("profiles/{}/checkoffs", profile_id))
    }

    pub fn checkoff(profile_id: &str, standard_id: &str) -> DocPath {
        checkoffs(profile_id).doc(standard_id)
    }

    pub fn standards() -> CollectionPath {
        collection("standards".into())
    }

    pub fn standard(id: &str) -> DocPath {
        standards().doc(id)
    }

    pub fn record(standard_id: &str) -> DocPath {
        collection(format!("standards/{}/record", standard_id)).doc("current")
    }

    pub fn weekly_challenges() -> CollectionPath {
        collection("weeklyChallenges".into())
    }

    pub fn weekly_challenge(week_id: &str) -> DocPath {
        weekly_challenges().doc(week_id)
    }

    pub fn weekly_logs(week_id: &str) -> CollectionPath {
        collection(format!("weekly_logs/{}/entries", week_id))
    }

    pub fn monthly_entries(month_id: &str) -> CollectionPath {
        collection(format!("monthly_history/{}/entries", month_id))
    }

    pub fn meta() -> CollectionPath {
        collection("meta".into())
    }

    pub fn monthly_meta(month_id: &str) -> DocPath {
        meta().doc(&format!("monthly_{}", month_id))
    }

    /// Pointer document naming the current monthly challenge.
    pub fn monthly_pointer() -> DocPath {
        meta().doc("monthly")
    }

    pub fn tier_checkoffs() -> CollectionPath {
        collection("tier_checkoffs".into())
    }

    pub fn tier_checkoff(profile_id: &str, tier: &str) -> DocPath {
        tier_checkoffs().doc(&format!("{}_{}", profile_id, tier))
    }

    pub fn messages() -> CollectionPath {
        collection("messages".into())
    }

    pub fn message(id: &str) -> DocPath {
        messages().doc(id)
    }

    pub fn settings(key: &str) -> DocPath {
        collection("settings".into()).doc(key)
    }

    pub fn standards_master() -> DocPath {
        collection("config".into()).doc("standards_master")
    }
}

//=========================================================================================
// Documents and writes
//=========================================================================================

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// How a `set` combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Only the given fields are replaced; other fields survive.
    Merge,
    /// The document becomes exactly the given fields.
    Overwrite,
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        path: DocPath,
        fields: Fields,
        mode: SetMode,
    },
    Delete {
        path: DocPath,
    },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Delete { path } => path,
        }
    }
}

/// Applies `incoming` onto `existing`. Nested objects merge recursively.
pub fn merge_fields(existing: &mut Fields, incoming: Fields) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(Value::Object(current)), Value::Object(update)) => merge_fields(current, update),
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}

//=========================================================================================
// Queries
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A standing or one-shot query against a single collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }

    /// Orders documents by the query's ordering, then by document id.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| {
            for order in &self.order_by {
                let ord = compare_values(a.fields.get(&order.field), b.fields.get(&order.field));
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.path.cmp(&b.path)
        });
    }

    /// Filters, sorts and truncates a full collection listing.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        self.sort(&mut selected);
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }

    /// Whether serving this query needs a declared composite index.
    ///
    /// Single-field orderings and pure equality filters are always served. An ordering
    /// combined with a filter on a different field, or more than one ordering, is not.
    pub fn needs_composite_index(&self) -> bool {
        if self.order_by.len() > 1 {
            return true;
        }
        match self.order_by.first() {
            Some(order) => self.filters.iter().any(|f| f.field != order.field),
            None => false,
        }
    }

    /// Key under which a composite index for this query is declared.
    pub fn index_key(&self) -> String {
        let mut fields: Vec<String> = self.filters.iter().map(|f| f.field.clone()).collect();
        fields.extend(self.order_by.iter().map(|o| {
            let dir = match o.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            format!("{}:{}", o.field, dir)
        }));
        format!("{}({})", collection_group(&self.collection), fields.join(","))
    }

    /// The same query with ordering and limit removed, for client-side sorting.
    pub fn without_ordering(&self) -> Query {
        Query {
            collection: self.collection.clone(),
            filters: self.filters.clone(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}

/// The collection id without its parent documents, e.g. `entries`.
fn collection_group(path: &CollectionPath) -> &str {
    path.as_str().rsplit('/').next().unwrap_or_default()
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total ordering over JSON values: missing < null < bool < number < string.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Composite indexes the backend has been told about.
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    declared: HashSet<String>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, query: &Query) -> Self {
        self.declared.insert(query.index_key());
        self
    }

    /// Fails with `MissingIndex` when the query needs an index that was never declared.
    pub fn check(&self, query: &Query) -> PortResult<()> {
        if query.needs_composite_index() && !self.declared.contains(&query.index_key()) {
            return Err(PortError::MissingIndex(query.index_key()));
        }
        Ok(())
    }
}

/// A full result set delivered by a live query.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub docs: Vec<Document>,
    pub read_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(path: &str, fields: Value) -> Document {
        Document {
            path: DocPath::parse(path).unwrap(),
            fields: fields.as_object().cloned().unwrap(),
            update_time: Utc::now(),
        }
    }

    #[test]
    fn path_shapes_are_validated() {
        assert!(DocPath::parse("profiles/abc").is_ok());
        assert!(DocPath::parse("profiles").is_err());
        assert!(DocPath::parse("profiles//x").is_err());
        assert!(CollectionPath::parse("weekly_logs/2024-W05/entries").is_ok());
        assert!(CollectionPath::parse("weekly_logs/2024-W05").is_err());
        assert!(ensure_id("a/b").is_err());
    }

    #[test]
    fn well_known_paths() {
        assert_eq!(paths::record("s1").as_str(), "standards/s1/record/current");
        assert_eq!(paths::tier_checkoff("p1", "elite").as_str(), "tier_checkoffs/p1_elite");
        assert_eq!(paths::monthly_meta("2024-03").as_str(), "meta/monthly_2024-03");
        let checkoff = paths::checkoff("p1", "s1");
        assert_eq!(checkoff.id(), "s1");
        assert_eq!(checkoff.collection().as_str(), "profiles/p1/checkoffs");
        assert_eq!(checkoff.collection().parent().unwrap().as_str(), "profiles/p1");
    }

    #[test]
    fn merge_keeps_untouched_fields_and_nests() {
        let mut existing = json!({"role": "member", "name": "A", "meta": {"a": 1}})
            .as_object()
            .cloned()
            .unwrap();
        let incoming = json!({"role": "mentor", "meta": {"b": 2}})
            .as_object()
            .cloned()
            .unwrap();
        merge_fields(&mut existing, incoming);
        assert_eq!(existing["role"], "mentor");
        assert_eq!(existing["name"], "A");
        assert_eq!(existing["meta"], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn query_filters_sorts_and_limits() {
        let docs = vec![
            doc("standards/a", json!({"tier": "elite", "order": 2})),
            doc("standards/b", json!({"tier": "elite", "order": 1})),
            doc("standards/c", json!({"tier": "committed", "order": 0})),
            doc("standards/d", json!({"tier": "elite"})),
        ];
        let query = Query::new(paths::standards())
            .where_eq("tier", "elite")
            .order_by("order", Direction::Asc)
            .limit(2);
        let ids: Vec<_> = query.apply(docs).iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["d", "b"]);
    }

    #[test]
    fn composite_index_detection() {
        let simple = Query::new(paths::standards()).order_by("order", Direction::Asc);
        assert!(!simple.needs_composite_index());

        let compound = Query::new(paths::standards())
            .where_eq("tier", "elite")
            .order_by("order", Direction::Asc);
        assert!(compound.needs_composite_index());
        assert!(IndexSet::new().check(&compound).is_err());
        assert!(IndexSet::new().declare(&compound).check(&compound).is_ok());
        assert!(!compound.without_ordering().needs_composite_index());
    }
}
