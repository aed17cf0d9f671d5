//! Aggregation pipelines.
//!
//! Stages run in order over the documents of one collection:
//!
//! - `{"$match": <filter>}` keeps documents matching a filter document
//! - `{"$group": {"_id": <expr>, <field>: {<accumulator>: <expr>}}}` groups
//!   documents by key; accumulators are `$sum $avg $min $max`
//! - `{"$limit": n}` keeps the first `n` documents
//!
//! An expression is either a literal or a `"$dotted.path"` field reference.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};
use storebench_core::OperationError;

use super::filter::{compare_values, lookup, Filter};

/// A parsed pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

#[derive(Debug, Clone)]
enum Stage {
    Match(Filter),
    Group {
        key: Expr,
        fields: Vec<(String, Accumulator)>,
    },
    Limit(usize),
}

#[derive(Debug, Clone)]
enum Expr {
    Field(Vec<String>),
    Literal(Value),
}

impl Expr {
    fn parse(value: &Value) -> Expr {
        match value.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(path) => Expr::Field(path.split('.').map(str::to_string).collect()),
            None => Expr::Literal(value.clone()),
        }
    }

    fn eval(&self, doc: &Value) -> Value {
        match self {
            Expr::Field(path) => lookup(doc, path).cloned().unwrap_or(Value::Null),
            Expr::Literal(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
}

impl Accumulator {
    fn parse(field: &str, spec: &Value) -> Result<Accumulator, OperationError> {
        let (op, expr) = spec
            .as_object()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
            .ok_or_else(|| invalid(format!("accumulator for {} must be a single-key object", field)))?;

        let expr = Expr::parse(expr);
        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(expr)),
            "$avg" => Ok(Accumulator::Avg(expr)),
            "$min" => Ok(Accumulator::Min(expr)),
            "$max" => Ok(Accumulator::Max(expr)),
            other => Err(invalid(format!("unknown accumulator {}", other))),
        }
    }
}

/// Running state of one accumulator within one group.
#[derive(Debug, Clone)]
enum AccState {
    Sum(f64),
    Avg { total: f64, count: u64 },
    Extreme(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum(0.0),
            Accumulator::Avg(_) => AccState::Avg { total: 0.0, count: 0 },
            Accumulator::Min(_) | Accumulator::Max(_) => AccState::Extreme(None),
        }
    }

    fn update(&mut self, acc: &Accumulator, doc: &Value) {
        match (self, acc) {
            (AccState::Sum(total), Accumulator::Sum(expr)) => {
                if let Some(n) = expr.eval(doc).as_f64() {
                    *total += n;
                }
            }
            (AccState::Avg { total, count }, Accumulator::Avg(expr)) => {
                if let Some(n) = expr.eval(doc).as_f64() {
                    *total += n;
                    *count += 1;
                }
            }
            (AccState::Extreme(best), Accumulator::Min(expr)) => {
                keep_extreme(best, expr.eval(doc), Ordering::Less)
            }
            (AccState::Extreme(best), Accumulator::Max(expr)) => {
                keep_extreme(best, expr.eval(doc), Ordering::Greater)
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => number(total),
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { total, count } => number(total / count as f64),
            AccState::Extreme(best) => best.unwrap_or(Value::Null),
        }
    }
}

fn keep_extreme(best: &mut Option<Value>, candidate: Value, wanted: Ordering) {
    if candidate.is_null() {
        return;
    }
    let replace = match best {
        None => true,
        Some(current) => compare_values(&candidate, current) == Some(wanted),
    };
    if replace {
        *best = Some(candidate);
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

impl Pipeline {
    /// Parse pipeline stages.
    pub fn parse(stages: &[Value]) -> Result<Pipeline, OperationError> {
        let stages = stages
            .iter()
            .map(|stage| {
                let (name, body) = stage
                    .as_object()
                    .filter(|m| m.len() == 1)
                    .and_then(|m| m.iter().next())
                    .ok_or_else(|| invalid("each stage must be a single-key object".to_string()))?;

                match name.as_str() {
                    "$match" => Ok(Stage::Match(Filter::parse(body)?)),
                    "$group" => parse_group(body),
                    "$limit" => body
                        .as_u64()
                        .map(|n| Stage::Limit(n as usize))
                        .ok_or_else(|| invalid("$limit expects a non-negative integer".to_string())),
                    other => Err(invalid(format!("unsupported stage {}", other))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline { stages })
    }

    /// Run the pipeline over `docs`.
    pub fn run(&self, docs: Vec<Value>) -> Vec<Value> {
        self.stages.iter().fold(docs, |docs, stage| match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Group { key, fields } => group(docs, key, fields),
        })
    }
}

fn parse_group(body: &Value) -> Result<Stage, OperationError> {
    let spec: &Map<String, Value> = body
        .as_object()
        .ok_or_else(|| invalid("$group expects an object".to_string()))?;
    let key = spec
        .get("_id")
        .map(Expr::parse)
        .ok_or_else(|| invalid("$group requires an _id".to_string()))?;

    let fields = spec
        .iter()
        .filter(|(name, _)| name.as_str() != "_id")
        .map(|(name, acc)| Ok((name.clone(), Accumulator::parse(name, acc)?)))
        .collect::<Result<Vec<_>, OperationError>>()?;

    Ok(Stage::Group { key, fields })
}

/// Group documents by key. Groups come out in order of first appearance.
fn group(docs: Vec<Value>, key: &Expr, fields: &[(String, Accumulator)]) -> Vec<Value> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for doc in &docs {
        let key_value = key.eval(doc);
        let slot = *index.entry(key_value.to_string()).or_insert_with(|| {
            groups.push((
                key_value.clone(),
                fields.iter().map(|(_, acc)| AccState::new(acc)).collect(),
            ));
            groups.len() - 1
        });

        for (state, (_, acc)) in groups[slot].1.iter_mut().zip(fields) {
            state.update(acc, doc);
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            for (state, (name, _)) in states.into_iter().zip(fields) {
                out.insert(name.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect()
}

fn invalid(message: String) -> OperationError {
    OperationError::InvalidDescriptor(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Value> {
        vec![
            json!({"basic_info": {"price": 100.0, "area": 10.0}, "furnishing_status": "furnished"}),
            json!({"basic_info": {"price": 300.0, "area": 30.0}, "furnishing_status": "furnished"}),
            json!({"basic_info": {"price": 200.0, "area": 20.0}, "furnishing_status": "unfurnished"}),
        ]
    }

    #[test]
    fn test_group_by_furnishing() {
        let pipeline = Pipeline::parse(&[json!({
            "$group": {
                "_id": "$furnishing_status",
                "count": {"$sum": 1},
                "avg_price": {"$avg": "$basic_info.price"},
                "avg_area": {"$avg": "$basic_info.area"},
            }
        })])
        .unwrap();

        let out = pipeline.run(docs());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], "furnished");
        assert_eq!(out[0]["count"], 2.0);
        assert_eq!(out[0]["avg_price"], 200.0);
        assert_eq!(out[0]["avg_area"], 20.0);
        assert_eq!(out[1]["_id"], "unfurnished");
        assert_eq!(out[1]["count"], 1.0);
    }

    #[test]
    fn test_match_then_min_max() {
        let pipeline = Pipeline::parse(&[
            json!({"$match": {"basic_info.price": {"$gte": 200}}}),
            json!({"$group": {
                "_id": null,
                "low": {"$min": "$basic_info.price"},
                "high": {"$max": "$basic_info.price"},
            }}),
        ])
        .unwrap();

        let out = pipeline.run(docs());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["_id"], Value::Null);
        assert_eq!(out[0]["low"], 200.0);
        assert_eq!(out[0]["high"], 300.0);
    }

    #[test]
    fn test_limit() {
        let pipeline = Pipeline::parse(&[json!({"$limit": 2})]).unwrap();
        assert_eq!(pipeline.run(docs()).len(), 2);
    }

    #[test]
    fn test_avg_over_missing_field_is_null() {
        let pipeline = Pipeline::parse(&[json!({
            "$group": {"_id": null, "avg": {"$avg": "$nope"}}
        })])
        .unwrap();
        assert_eq!(pipeline.run(docs())[0]["avg"], Value::Null);
    }

    #[test]
    fn test_invalid_stages() {
        assert!(Pipeline::parse(&[json!({"$sort": {"a": 1}})]).is_err());
        assert!(Pipeline::parse(&[json!({"$group": {"count": {"$sum": 1}}})]).is_err());
        assert!(Pipeline::parse(&[json!({"$group": {"_id": null, "x": {"$median": "$a"}}})]).is_err());
        assert!(Pipeline::parse(&[json!({"$limit": -1})]).is_err());
        assert!(Pipeline::parse(&[json!({"$match": {}, "$limit": 1})]).is_err());
    }
}
