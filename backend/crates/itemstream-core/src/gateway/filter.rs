//! Query evaluation for the in-memory store
//!
//! Supports the subset of the item query language that makes sense without a
//! database behind it: `filter`, `search`, `sort`, `offset`, `page`, `limit`
//! and `fields`. `group`, `aggregate`, `deep` and `alias` are accepted and
//! ignored.
//!
//! Filters use the operator-object form:
//! ```json
//! { "_and": [ { "status": { "_eq": "published" } }, { "views": { "_gte": 10 } } ] }
//! ```
//! A bare value in operator position is shorthand for `_eq`.

use std::cmp::Ordering;

use itemstream_commons::Query;
use serde_json::{Map, Value};

use super::GatewayError;

/// Maximum nesting of `_and` / `_or` groups
const MAX_FILTER_DEPTH: usize = 32;

/// Evaluate a filter object against one record
#[inline]
pub fn matches(filter: &Value, record: &Value) -> Result<bool, GatewayError> {
    evaluate_group(filter, record, 0)
}

fn evaluate_group(filter: &Value, record: &Value, depth: usize) -> Result<bool, GatewayError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(GatewayError::InvalidPayload(format!(
            "Filter too deeply nested (max {} levels)",
            MAX_FILTER_DEPTH
        )));
    }
    let Value::Object(clauses) = filter else {
        return Err(GatewayError::InvalidPayload("filter must be an object".to_string()));
    };

    for (field, condition) in clauses {
        let matched = match field.as_str() {
            "_and" => all_of(condition, record, depth)?,
            "_or" => any_of(condition, record, depth)?,
            _ => evaluate_field(record.get(field.as_str()), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_of(groups: &Value, record: &Value, depth: usize) -> Result<bool, GatewayError> {
    for group in group_list(groups, "_and")? {
        if !evaluate_group(group, record, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(groups: &Value, record: &Value, depth: usize) -> Result<bool, GatewayError> {
    for group in group_list(groups, "_or")? {
        if evaluate_group(group, record, depth + 1)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn group_list<'a>(groups: &'a Value, op: &str) -> Result<&'a [Value], GatewayError> {
    groups
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| GatewayError::InvalidPayload(format!("'{}' expects an array", op)))
}

fn evaluate_field(actual: Option<&Value>, condition: &Value) -> Result<bool, GatewayError> {
    let Value::Object(operators) = condition else {
        return Ok(actual.is_some_and(|a| loosely_equal(a, condition)));
    };

    for (op, expected) in operators {
        if !apply_operator(op, actual, expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_operator(op: &str, actual: Option<&Value>, expected: &Value) -> Result<bool, GatewayError> {
    let actual_or_null = actual.unwrap_or(&Value::Null);
    let result = match op {
        "_eq" => loosely_equal(actual_or_null, expected),
        "_neq" => !loosely_equal(actual_or_null, expected),
        "_in" => in_list(actual_or_null, expected, op)?,
        "_nin" => !in_list(actual_or_null, expected, op)?,
        "_null" => actual_or_null.is_null() == expected.as_bool().unwrap_or(true),
        "_nnull" => !actual_or_null.is_null() == expected.as_bool().unwrap_or(true),
        "_gt" => compare(actual_or_null, expected) == Some(Ordering::Greater),
        "_gte" => matches!(
            compare(actual_or_null, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "_lt" => compare(actual_or_null, expected) == Some(Ordering::Less),
        "_lte" => matches!(
            compare(actual_or_null, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "_contains" => match (actual_or_null, expected) {
            (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
            _ => false,
        },
        other => {
            return Err(GatewayError::InvalidPayload(format!("Unknown filter operator '{}'", other)))
        },
    };
    Ok(result)
}

fn in_list(actual: &Value, expected: &Value, op: &str) -> Result<bool, GatewayError> {
    let list = expected
        .as_array()
        .ok_or_else(|| GatewayError::InvalidPayload(format!("'{}' expects an array", op)))?;
    Ok(list.iter().any(|candidate| loosely_equal(actual, candidate)))
}

/// Numbers compare by value, and a number equals its string rendering
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok() == n.as_f64()
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Field list from either `["a", "b"]` or `"a,b"`
fn name_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_count(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn search_matches(record: &Value, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    record
        .as_object()
        .is_some_and(|fields| {
            fields.values().any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(&needle)))
        })
}

fn sort_records(records: &mut [Value], sort: &Value) {
    let keys = name_list(sort);
    if keys.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for key in &keys {
            let (field, descending) = match key.strip_prefix('-') {
                Some(field) => (field, true),
                None => (key.as_str(), false),
            };
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ordering = compare(left, right).unwrap_or(Ordering::Equal);
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Keep only the requested fields. `*` or an empty list keeps everything.
pub fn project(record: &Value, fields: Option<&Value>) -> Value {
    let Some(names) = fields.map(name_list) else {
        return record.clone();
    };
    if names.is_empty() || names.iter().any(|n| n == "*") {
        return record.clone();
    }
    let Value::Object(source) = record else {
        return record.clone();
    };
    let projected: Map<String, Value> = names
        .iter()
        .filter_map(|name| source.get(name).map(|v| (name.clone(), v.clone())))
        .collect();
    Value::Object(projected)
}

/// Run a full query over a set of records
pub fn apply(records: Vec<Value>, query: &Query) -> Result<Vec<Value>, GatewayError> {
    let mut selected = Vec::with_capacity(records.len());
    for record in records {
        if let Some(filter) = &query.filter {
            if !matches(filter, &record)? {
                continue;
            }
        }
        if let Some(Value::String(needle)) = &query.search {
            if !search_matches(&record, needle) {
                continue;
            }
        }
        selected.push(record);
    }

    if let Some(sort) = &query.sort {
        sort_records(&mut selected, sort);
    }

    let limit = as_count(query.limit.as_ref());
    let offset = match (as_count(query.offset.as_ref()), as_count(query.page.as_ref()), limit) {
        (Some(offset), _, _) => offset,
        (None, Some(page), Some(limit)) if page > 0 => (page - 1) * limit,
        _ => 0,
    };

    Ok(selected
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| project(&record, query.fields.as_ref()))
        .collect())
}
