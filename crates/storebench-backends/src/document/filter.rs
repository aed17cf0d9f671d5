//! Filter documents.
//!
//! A filter document maps dotted field paths to either a literal (equality) or
//! an operator document:
//!
//! ```json
//! {"basic_info.price": {"$gte": 3000000, "$lte": 8000000}, "features.airconditioning": true}
//! ```
//!
//! Supported operators: `$eq $ne $lt $lte $gt $gte $in $nin`, plus top-level
//! `$and` / `$or` over arrays of filter documents. Every field entry of a
//! document must hold.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use storebench_core::OperationError;

/// A parsed filter document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { path: Vec<String>, op: FieldOp },
}

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Filter {
    /// Parse a filter document. `null` and `{}` match everything.
    pub fn parse(filter: &Value) -> Result<Filter, OperationError> {
        match filter {
            Value::Null => Ok(Filter::All),
            Value::Object(map) => Self::parse_object(map),
            other => Err(invalid(format!("filter must be an object, got {}", other))),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Filter, OperationError> {
        let mut clauses = Vec::with_capacity(map.len());

        for (key, value) in map {
            match key.as_str() {
                "$and" => clauses.push(Filter::And(Self::parse_list(key, value)?)),
                "$or" => clauses.push(Filter::Or(Self::parse_list(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unknown top-level operator {}", op)))
                }
                path => {
                    let path: Vec<String> = path.split('.').map(str::to_string).collect();
                    for op in Self::parse_field_ops(value)? {
                        clauses.push(Filter::Field {
                            path: path.clone(),
                            op,
                        });
                    }
                }
            }
        }

        Ok(match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        })
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Filter>, OperationError> {
        let items = value
            .as_array()
            .ok_or_else(|| invalid(format!("{} expects an array", op)))?;
        items.iter().map(Self::parse).collect()
    }

    fn parse_field_ops(value: &Value) -> Result<Vec<FieldOp>, OperationError> {
        let ops = match value {
            Value::Object(map) if map.keys().all(|k| k.starts_with('$')) && !map.is_empty() => map,
            literal => return Ok(vec![FieldOp::Eq(literal.clone())]),
        };

        ops.iter()
            .map(|(op, operand)| {
                Ok(match op.as_str() {
                    "$eq" => FieldOp::Eq(operand.clone()),
                    "$ne" => FieldOp::Ne(operand.clone()),
                    "$lt" => FieldOp::Lt(operand.clone()),
                    "$lte" => FieldOp::Lte(operand.clone()),
                    "$gt" => FieldOp::Gt(operand.clone()),
                    "$gte" => FieldOp::Gte(operand.clone()),
                    "$in" => FieldOp::In(array_operand(op, operand)?),
                    "$nin" => FieldOp::Nin(array_operand(op, operand)?),
                    other => return Err(invalid(format!("unknown field operator {}", other))),
                })
            })
            .collect()
    }

    /// Whether `doc` satisfies the filter.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Field { path, op } => {
                let field = lookup(doc, path);
                match op {
                    // A missing field equals null and differs from everything else.
                    FieldOp::Eq(v) => values_equal(field.unwrap_or(&Value::Null), v),
                    FieldOp::Ne(v) => !values_equal(field.unwrap_or(&Value::Null), v),
                    FieldOp::Lt(v) => compare_field(field, v, Ordering::is_lt),
                    FieldOp::Lte(v) => compare_field(field, v, Ordering::is_le),
                    FieldOp::Gt(v) => compare_field(field, v, Ordering::is_gt),
                    FieldOp::Gte(v) => compare_field(field, v, Ordering::is_ge),
                    FieldOp::In(values) => field
                        .map(|fv| values.iter().any(|v| values_equal(fv, v)))
                        .unwrap_or(false),
                    FieldOp::Nin(values) => field
                        .map(|fv| !values.iter().any(|v| values_equal(fv, v)))
                        .unwrap_or(true),
                }
            }
        }
    }
}

/// Resolve a dotted path inside a document.
pub fn lookup<'a, S: AsRef<str>>(doc: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |current, segment| current.get(segment.as_ref()))
}

fn compare_field(field: Option<&Value>, value: &Value, accept: fn(Ordering) -> bool) -> bool {
    field
        .and_then(|fv| compare_values(fv, value))
        .map(accept)
        .unwrap_or(false)
}

/// Equality with integers and floats compared numerically.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => a == b,
    }
}

/// Ordering between values of the same kind; `None` across kinds.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>, OperationError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("{} expects an array", op)))
}

fn invalid(message: String) -> OperationError {
    OperationError::InvalidDescriptor(message)
}
