//! Query execution
//!
//! Equality and membership over indexed columns push down into the store's
//! filters. Everything else (LIKE, ranges, grouping, having, ordering,
//! limit/offset) evaluates in memory over the fetched rows.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Value, json};

use lattice_core::store::{EdgeFilter, NodeFilter};
use lattice_core::{Error, GraphEdge, GraphNode, GraphStore, NodeKind, Result};

use crate::ast::{Condition, GraphQuery, Operator, OrderBy, QueryTarget, WhereClause};

pub type Row = BTreeMap<String, Value>;

pub struct QueryExecutor {
    store: Arc<GraphStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<GraphStore>) -> Self {
        QueryExecutor { store }
    }

    pub fn run(&self, query: &GraphQuery) -> Result<Vec<Row>> {
        let mut rows = match query.target {
            QueryTarget::Nodes => {
                let filter = node_pushdown(query.where_clause.as_ref());
                self.store
                    .find_nodes(&filter)?
                    .into_iter()
                    .map(node_row)
                    .collect::<Vec<_>>()
            }
            QueryTarget::Edges => {
                let filter = edge_pushdown(query.where_clause.as_ref());
                self.store
                    .find_edges(&filter)?
                    .into_iter()
                    .map(edge_row)
                    .collect::<Vec<_>>()
            }
        };

        if let Some(clause) = &query.where_clause {
            let mut filtered = Vec::with_capacity(rows.len());
            for row in rows {
                if evaluate(clause, &row)? {
                    filtered.push(row);
                }
            }
            rows = filtered;
        }

        if let Some(group_fields) = &query.group_by {
            rows = group(rows, group_fields);
            if let Some(having) = &query.having {
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    if evaluate_condition(having, &row)? {
                        kept.push(row);
                    }
                }
                rows = kept;
            }
        } else if query.having.is_some() {
            return Err(Error::ConstraintViolation(
                "having requires group_by".to_string(),
            ));
        }

        order(&mut rows, &query.order_by);

        let offset = query.offset.unwrap_or(0) as usize;
        if offset > 0 {
            rows = rows.into_iter().skip(offset).collect();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        if let Some(fields) = &query.select {
            rows = rows
                .into_iter()
                .map(|row| {
                    fields
                        .iter()
                        .map(|field| {
                            (field.clone(), field_value(&row, field).unwrap_or(Value::Null))
                        })
                        .collect()
                })
                .collect();
        }

        Ok(rows)
    }
}

fn node_row(node: GraphNode) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), json!(node.id.0));
    row.insert("identifier".into(), json!(node.identifier.to_string()));
    row.insert("kind".into(), json!(node.kind.as_str()));
    row.insert("name".into(), json!(node.name));
    row.insert("source_file".into(), json!(node.source_file));
    row.insert(
        "language".into(),
        node.language.map(|l| json!(l.as_str())).unwrap_or(Value::Null),
    );
    row.insert("metadata".into(), json!(node.metadata));
    row.insert("created_at".into(), json!(node.created_at.to_rfc3339()));
    row.insert("updated_at".into(), json!(node.updated_at.to_rfc3339()));
    row
}

fn edge_row(edge: GraphEdge) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), json!(edge.id.0));
    row.insert("from_node_id".into(), json!(edge.source.0));
    row.insert("to_node_id".into(), json!(edge.target.0));
    row.insert("type".into(), json!(edge.edge_type));
    row.insert("derived".into(), json!(edge.derived));
    row.insert("rule".into(), json!(edge.rule));
    row.insert("metadata".into(), json!(edge.metadata));
    row.insert("created_at".into(), json!(edge.created_at.to_rfc3339()));
    row
}

/// Conditions under a top-level `All` (or a bare condition) that the node
/// filter can answer natively.
fn node_pushdown(clause: Option<&WhereClause>) -> NodeFilter {
    let mut filter = NodeFilter::default();
    for condition in pushdown_conditions(clause) {
        match (condition.field.as_str(), condition.op) {
            ("identifier", Operator::Eq) => {
                filter.identifier = condition.value.as_ref().and_then(Value::as_str).map(String::from);
            }
            ("kind", Operator::Eq) => {
                if let Some(kind) = condition.value.as_ref().and_then(Value::as_str).and_then(NodeKind::parse) {
                    filter.kinds = Some(vec![kind]);
                }
            }
            ("kind", Operator::In) => {
                if let Some(values) = condition.value.as_ref().and_then(Value::as_array) {
                    let kinds: Vec<NodeKind> = values
                        .iter()
                        .filter_map(|v| v.as_str())
                        .filter_map(NodeKind::parse)
                        .collect();
                    if !kinds.is_empty() {
                        filter.kinds = Some(kinds);
                    }
                }
            }
            ("source_file", Operator::Eq) => {
                if let Some(path) = condition.value.as_ref().and_then(Value::as_str) {
                    filter.source_files = Some(vec![path.to_string()]);
                }
            }
            ("source_file", Operator::In) => {
                if let Some(values) = condition.value.as_ref().and_then(Value::as_array) {
                    filter.source_files = Some(
                        values
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(String::from)
                            .collect(),
                    );
                }
            }
            ("language", Operator::Eq) => {
                filter.language = condition
                    .value
                    .as_ref()
                    .and_then(Value::as_str)
                    .and_then(lattice_core::Language::parse);
            }
            ("name", Operator::Eq) => {
                filter.name = condition.value.as_ref().and_then(Value::as_str).map(String::from);
            }
            _ => {}
        }
    }
    filter
}

fn edge_pushdown(clause: Option<&WhereClause>) -> EdgeFilter {
    let mut filter = EdgeFilter::default();
    for condition in pushdown_conditions(clause) {
        match (condition.field.as_str(), condition.op) {
            ("type", Operator::Eq) => {
                if let Some(t) = condition.value.as_ref().and_then(Value::as_str) {
                    filter.edge_types = Some(vec![t.to_string()]);
                }
            }
            ("type", Operator::In) => {
                if let Some(values) = condition.value.as_ref().and_then(Value::as_array) {
                    filter.edge_types = Some(
                        values
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(String::from)
                            .collect(),
                    );
                }
            }
            ("derived", Operator::Eq) => {
                filter.derived = condition.value.as_ref().and_then(Value::as_bool);
            }
            ("rule", Operator::Eq) => {
                filter.rule = condition.value.as_ref().and_then(Value::as_str).map(String::from);
            }
            _ => {}
        }
    }
    filter
}

fn pushdown_conditions(clause: Option<&WhereClause>) -> Vec<&Condition> {
    match clause {
        Some(WhereClause::Cond(condition)) => vec![condition],
        Some(WhereClause::All(clauses)) => clauses
            .iter()
            .filter_map(|c| match c {
                WhereClause::Cond(condition) => Some(condition),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn evaluate(clause: &WhereClause, row: &Row) -> Result<bool> {
    match clause {
        WhereClause::All(clauses) => {
            for c in clauses {
                if !evaluate(c, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        WhereClause::Any(clauses) => {
            for c in clauses {
                if evaluate(c, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        WhereClause::Not(inner) => Ok(!evaluate(inner, row)?),
        WhereClause::Cond(condition) => evaluate_condition(condition, row),
    }
}

fn evaluate_condition(condition: &Condition, row: &Row) -> Result<bool> {
    let actual = field_value(row, &condition.field);

    match condition.op {
        Operator::Exists => return Ok(matches!(actual, Some(v) if !v.is_null())),
        Operator::NotExists => return Ok(!matches!(actual, Some(v) if !v.is_null())),
        _ => {}
    }

    let expected = condition.value.as_ref().ok_or_else(|| {
        Error::ConstraintViolation(format!("operator on '{}' requires a value", condition.field))
    })?;
    let Some(actual) = actual else {
        return Ok(condition.op == Operator::Ne);
    };

    Ok(match condition.op {
        Operator::Eq => values_equal(&actual, expected),
        Operator::Ne => !values_equal(&actual, expected),
        Operator::Gt => compare(&actual, expected) == Some(Ordering::Greater),
        Operator::Lt => compare(&actual, expected) == Some(Ordering::Less),
        Operator::Ge => matches!(
            compare(&actual, expected),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        Operator::Le => matches!(
            compare(&actual, expected),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        Operator::Like => like_matches(&actual, expected)?,
        Operator::In => expected
            .as_array()
            .is_some_and(|values| values.iter().any(|v| values_equal(&actual, v))),
        Operator::NotIn => !expected
            .as_array()
            .is_some_and(|values| values.iter().any(|v| values_equal(&actual, v))),
        Operator::Exists | Operator::NotExists => unreachable!("handled above"),
    })
}

/// Dotted paths reach into object fields: `metadata.namespace`.
fn field_value(row: &Row, field: &str) -> Option<Value> {
    let mut parts = field.split('.');
    let head = parts.next()?;
    let mut current = row.get(head)?.clone();
    for part in parts {
        current = current.get(part)?.clone();
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE semantics: `%` any run, `_` one character; case-insensitive,
/// anchored both ends.
fn like_matches(actual: &Value, pattern: &Value) -> Result<bool> {
    let Some(actual) = actual.as_str() else {
        return Ok(false);
    };
    let Some(pattern) = pattern.as_str() else {
        return Ok(false);
    };
    let mut regex_pattern = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            c => regex_pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_pattern.push('$');
    let regex = Regex::new(&regex_pattern).map_err(|e| {
        Error::ConstraintViolation(format!("bad LIKE pattern '{pattern}': {e}"))
    })?;
    Ok(regex.is_match(actual))
}

/// Collapse rows into one per group key, with a `count` aggregate.
fn group(rows: Vec<Row>, fields: &[String]) -> Vec<Row> {
    let mut groups: BTreeMap<String, Row> = BTreeMap::new();
    for row in rows {
        let key: Vec<String> = fields
            .iter()
            .map(|f| field_value(&row, f).unwrap_or(Value::Null).to_string())
            .collect();
        let key = key.join("\u{1f}");
        let entry = groups.entry(key).or_insert_with(|| {
            let mut grouped = Row::new();
            for f in fields {
                grouped.insert(f.clone(), field_value(&row, f).unwrap_or(Value::Null));
            }
            grouped.insert("count".into(), json!(0));
            grouped
        });
        let count = entry.get("count").and_then(Value::as_u64).unwrap_or(0);
        entry.insert("count".into(), json!(count + 1));
    }
    groups.into_values().collect()
}

fn order(rows: &mut [Row], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for clause in order_by {
            let left = field_value(a, &clause.field).unwrap_or(Value::Null);
            let right = field_value(b, &clause.field).unwrap_or(Value::Null);
            let ordering = compare(&left, &right)
                .unwrap_or_else(|| left.to_string().cmp(&right.to_string()));
            let ordering = if clause.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
