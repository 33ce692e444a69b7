//! In-process document collection
//!
//! [`MemoryCollection`] implements [`DocumentCollection`] without a server.
//! It understands the subset of the query language the store and its callers
//! rely on:
//!
//! - filters: equality (with array membership and dotted paths), `$eq`, `$ne`,
//!   `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$and`, `$or`, `$nor`
//! - updates: `$set`, `$unset`
//! - projections: inclusion or exclusion of top-level fields
//! - pipelines: `$match`, `$group` (`$avg`, `$sum`), `$sort`, `$limit`
//!
//! Anything else is reported as a query error rather than silently ignored.

use crate::collection::{DocumentCollection, InsertOutcome, UpdateOutcome};
use crate::record::FIELD_ID;
use crate::Result;
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use parking_lot::RwLock;
use shelter_common::ShelterError;
use std::cmp::Ordering;

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<BsonDocument>,
    indexes: Vec<String>,
    unavailable: bool,
}

/// Collection held entirely in memory
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    state: RwLock<MemoryState>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Make every subsequent call fail with a connection error (or recover)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    /// Names of the indexes created so far, in creation order
    pub fn index_names(&self) -> Vec<String> {
        self.state.read().indexes.clone()
    }

    /// Copy of every stored document, identifiers included
    pub fn documents(&self) -> Vec<BsonDocument> {
        self.state.read().documents.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self, state: &MemoryState) -> Result<()> {
        if state.unavailable {
            return Err(ShelterError::Connection(format!(
                "Collection '{}' is unavailable",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_index(&self, keys: BsonDocument) -> Result<String> {
        let mut state = self.state.write();
        self.check_available(&state)?;

        if keys.is_empty() {
            return Err(ShelterError::Query("Index keys cannot be empty".to_string()));
        }
        let name = keys
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order))
            .collect::<Vec<_>>()
            .join("_");
        if !state.indexes.contains(&name) {
            state.indexes.push(name.clone());
        }
        Ok(name)
    }

    async fn insert_one(&self, document: BsonDocument) -> Result<InsertOutcome> {
        let mut state = self.state.write();
        self.check_available(&state)?;

        let stored = match document.get(FIELD_ID).cloned() {
            Some(id) => {
                if state.documents.iter().any(|d| d.get(FIELD_ID) == Some(&id)) {
                    return Err(ShelterError::MongoDB(format!(
                        "E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
                        self.name, id
                    )));
                }
                document
            }
            None => {
                let mut stored = BsonDocument::new();
                stored.insert(FIELD_ID, ObjectId::new());
                for (key, value) in document {
                    stored.insert(key, value);
                }
                stored
            }
        };
        state.documents.push(stored);
        Ok(InsertOutcome { acknowledged: true })
    }

    async fn find(
        &self,
        filter: BsonDocument,
        projection: Option<BsonDocument>,
    ) -> Result<Vec<BsonDocument>> {
        let state = self.state.read();
        self.check_available(&state)?;

        let mut results = Vec::new();
        for doc in &state.documents {
            if matches_filter(doc, &filter)? {
                results.push(match &projection {
                    Some(projection) => apply_projection(doc, projection),
                    None => doc.clone(),
                });
            }
        }
        Ok(results)
    }

    async fn update_many(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<UpdateOutcome> {
        let mut state = self.state.write();
        self.check_available(&state)?;
        validate_update(&update)?;

        // Match first so a bad filter leaves every document untouched
        let mut targets = Vec::new();
        for (i, doc) in state.documents.iter().enumerate() {
            if matches_filter(doc, &filter)? {
                targets.push(i);
            }
        }

        let mut outcome = UpdateOutcome {
            matched_count: targets.len() as u64,
            modified_count: 0,
        };
        for i in targets {
            if apply_update(&mut state.documents[i], &update) {
                outcome.modified_count += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete_many(&self, filter: BsonDocument) -> Result<u64> {
        let mut state = self.state.write();
        self.check_available(&state)?;

        let mut keep = Vec::with_capacity(state.documents.len());
        for doc in &state.documents {
            keep.push(!matches_filter(doc, &filter)?);
        }
        let before = state.documents.len();
        let mut flags = keep.into_iter();
        state.documents.retain(|_| flags.next().unwrap_or(true));
        Ok((before - state.documents.len()) as u64)
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> Result<Vec<BsonDocument>> {
        let state = self.state.read();
        self.check_available(&state)?;

        let mut docs = state.documents.clone();
        drop(state);

        for stage in &pipeline {
            let (name, body) = single_entry(stage, "Pipeline stage")?;
            docs = match name {
                "$match" => {
                    let filter = as_document(body, "$match")?;
                    let mut kept = Vec::new();
                    for doc in docs {
                        if matches_filter(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                "$group" => group_stage(docs, as_document(body, "$group")?)?,
                "$sort" => {
                    let keys = as_document(body, "$sort")?;
                    let mut sorted = docs;
                    sorted.sort_by(|a, b| compare_by_sort_keys(a, b, keys));
                    sorted
                }
                "$limit" => {
                    let limit = as_f64(body)
                        .filter(|n| *n >= 0.0)
                        .ok_or_else(|| ShelterError::Query("$limit must be a non-negative number".into()))?;
                    let mut limited = docs;
                    limited.truncate(limit as usize);
                    limited
                }
                other => {
                    return Err(ShelterError::Query(format!(
                        "Unsupported pipeline stage '{}'",
                        other
                    )))
                }
            };
        }
        Ok(docs)
    }
}

// =====================
// Filter matching
// =====================

fn matches_filter(doc: &BsonDocument, filter: &BsonDocument) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition, "$and")? {
                    all &= matches_filter(doc, clause)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(condition, "$or")? {
                    any |= matches_filter(doc, clause)?;
                }
                any
            }
            "$nor" => {
                let mut any = false;
                for clause in clauses(condition, "$nor")? {
                    any |= matches_filter(doc, clause)?;
                }
                !any
            }
            op if op.starts_with('$') => {
                return Err(ShelterError::Query(format!(
                    "Unsupported top-level operator '{}'",
                    op
                )))
            }
            path => matches_condition(lookup(doc, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(value: &'a Bson, op: &str) -> Result<Vec<&'a BsonDocument>> {
    let Bson::Array(items) = value else {
        return Err(ShelterError::Query(format!("{} requires an array", op)));
    };
    if items.is_empty() {
        return Err(ShelterError::Query(format!("{} requires a non-empty array", op)));
    }
    items.iter().map(|item| as_document(item, op)).collect()
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let operators = match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => ops,
        _ => return Ok(equals(value, condition)),
    };

    for (op, arg) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => in_list(value, arg, "$in")?,
            "$nin" => !in_list(value, arg, "$nin")?,
            "$exists" => value.is_some() == truthy(arg),
            other => {
                return Err(ShelterError::Query(format!(
                    "Unsupported query operator '{}'",
                    other
                )))
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(value: Option<&Bson>, list: &Bson, op: &str) -> Result<bool> {
    let Bson::Array(items) = list else {
        return Err(ShelterError::Query(format!("{} requires an array", op)));
    };
    Ok(items.iter().any(|item| equals(value, item)))
}

/// Equality with the server's rules: a missing field equals null and an
/// array matches any of its elements
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| comparable(item, target).is_some_and(&accept)),
        Some(v) => comparable(v, target).is_some_and(accept),
        None => false,
    }
}

/// Ordering for range operators, which only compare like with like
fn comparable(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

fn lookup<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

// =====================
// Updates and projections
// =====================

fn validate_update(update: &BsonDocument) -> Result<()> {
    if update.is_empty() {
        return Err(ShelterError::Query("Update document cannot be empty".to_string()));
    }
    for (op, fields) in update {
        match op.as_str() {
            "$set" | "$unset" => {
                as_document(fields, op)?;
            }
            other if other.starts_with('$') => {
                return Err(ShelterError::Query(format!(
                    "Unsupported update operator '{}'",
                    other
                )))
            }
            _ => {
                return Err(ShelterError::Query(
                    "Update document requires atomic operators".to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Apply a validated update, returning whether the document changed
fn apply_update(doc: &mut BsonDocument, update: &BsonDocument) -> bool {
    let mut changed = false;
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };
        for (path, value) in fields {
            changed |= match op.as_str() {
                "$set" => set_path(doc, path, value.clone()),
                "$unset" => unset_path(doc, path),
                _ => false,
            };
        }
    }
    changed
}

fn set_path(doc: &mut BsonDocument, path: &str, value: Bson) -> bool {
    match path.split_once('.') {
        None => {
            let unchanged = doc.get(path) == Some(&value);
            if !unchanged {
                doc.insert(path, value);
            }
            !unchanged
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, BsonDocument::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => false,
            }
        }
    }
}

fn unset_path(doc: &mut BsonDocument, path: &str) -> bool {
    match path.split_once('.') {
        None => doc.remove(path).is_some(),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => unset_path(inner, rest),
            _ => false,
        },
    }
}

fn apply_projection(doc: &BsonDocument, projection: &BsonDocument) -> BsonDocument {
    let included: Vec<&str> = projection
        .iter()
        .filter(|(k, v)| k.as_str() != FIELD_ID && truthy(v))
        .map(|(k, _)| k.as_str())
        .collect();
    let keep_id = projection.get(FIELD_ID).map(truthy).unwrap_or(true);

    if included.is_empty() {
        let mut out = doc.clone();
        for (key, value) in projection {
            if !truthy(value) {
                out.remove(key);
            }
        }
        return out;
    }

    let mut out = BsonDocument::new();
    for (key, value) in doc {
        let wanted = if key == FIELD_ID {
            keep_id
        } else {
            included.contains(&key.as_str())
        };
        if wanted {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

// =====================
// Aggregation
// =====================

#[derive(Debug)]
enum Accumulator {
    Avg { total: f64, n: u64 },
    Sum { total: f64, saw_double: bool, saw_int64: bool },
}

impl Accumulator {
    fn add(&mut self, value: Option<&Bson>) {
        let Some(value) = value else { return };
        let Some(number) = as_f64(value) else { return };
        match self {
            Accumulator::Avg { total, n } => {
                *total += number;
                *n += 1;
            }
            Accumulator::Sum {
                total,
                saw_double,
                saw_int64,
            } => {
                *total += number;
                *saw_double |= matches!(value, Bson::Double(_));
                *saw_int64 |= matches!(value, Bson::Int64(_));
            }
        }
    }

    fn finish(&self) -> Bson {
        match self {
            Accumulator::Avg { n: 0, .. } => Bson::Null,
            Accumulator::Avg { total, n } => Bson::Double(total / *n as f64),
            Accumulator::Sum { total, saw_double: true, .. } => Bson::Double(*total),
            Accumulator::Sum { total, saw_int64, .. } => {
                let total = *total as i64;
                match i32::try_from(total) {
                    Ok(small) if !saw_int64 => Bson::Int32(small),
                    _ => Bson::Int64(total),
                }
            }
        }
    }
}

/// Evaluate a `$field` reference or a literal against a document
fn evaluate<'a>(doc: &'a BsonDocument, expr: &'a Bson) -> Option<&'a Bson> {
    match expr {
        Bson::String(s) if s.starts_with('$') => lookup(doc, &s[1..]),
        literal => Some(literal),
    }
}

fn group_stage(docs: Vec<BsonDocument>, body: &BsonDocument) -> Result<Vec<BsonDocument>> {
    let key_expr = body
        .get(FIELD_ID)
        .ok_or_else(|| ShelterError::Query("$group requires an _id expression".to_string()))?;

    let mut outputs: Vec<(&str, &str, &Bson)> = Vec::new();
    for (field, accumulator) in body.iter().filter(|(k, _)| k.as_str() != FIELD_ID) {
        let (op, expr) = single_entry(as_document(accumulator, field)?, "Accumulator")?;
        if op != "$avg" && op != "$sum" {
            return Err(ShelterError::Query(format!(
                "Unsupported accumulator '{}'",
                op
            )));
        }
        outputs.push((field.as_str(), op, expr));
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for doc in &docs {
        let key = evaluate(doc, key_expr).cloned().unwrap_or(Bson::Null);
        let index = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(i) => i,
            None => {
                let accumulators = outputs
                    .iter()
                    .map(|(_, op, _)| match *op {
                        "$avg" => Accumulator::Avg { total: 0.0, n: 0 },
                        _ => Accumulator::Sum {
                            total: 0.0,
                            saw_double: false,
                            saw_int64: false,
                        },
                    })
                    .collect();
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };
        for ((_, _, expr), accumulator) in outputs.iter().zip(groups[index].1.iter_mut()) {
            accumulator.add(evaluate(doc, expr));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut out = BsonDocument::new();
            out.insert(FIELD_ID, key);
            for ((field, _, _), accumulator) in outputs.iter().zip(accumulators.iter()) {
                out.insert(*field, accumulator.finish());
            }
            out
        })
        .collect())
}

fn compare_by_sort_keys(a: &BsonDocument, b: &BsonDocument, keys: &BsonDocument) -> Ordering {
    for (path, direction) in keys {
        let ordering = sort_order(lookup(a, path), lookup(b, path));
        let ordering = if as_f64(direction).is_some_and(|d| d < 0.0) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Total order across types: null, numbers, strings, documents, arrays, booleans
fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) => 0,
            Some(v) if as_f64(v).is_some() => 1,
            Some(Bson::String(_)) => 2,
            Some(Bson::Document(_)) => 3,
            Some(Bson::Array(_)) => 4,
            Some(Bson::Boolean(_)) => 5,
            Some(_) => 6,
        }
    }

    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Some(Bson::Boolean(x)), Some(Bson::Boolean(y))) => x.cmp(y),
        (Some(x), Some(y)) => comparable(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

// =====================
// Helpers
// =====================

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map(|n| n != 0.0).unwrap_or(true),
    }
}

fn as_document<'a>(value: &'a Bson, context: &str) -> Result<&'a BsonDocument> {
    match value {
        Bson::Document(doc) => Ok(doc),
        _ => Err(ShelterError::Query(format!("{} requires a document", context))),
    }
}

fn single_entry<'a>(doc: &'a BsonDocument, context: &str) -> Result<(&'a str, &'a Bson)> {
    let mut iter = doc.iter();
    match (iter.next(), iter.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        _ => Err(ShelterError::Query(format!(
            "{} must have exactly one field",
            context
        ))),
    }
}
