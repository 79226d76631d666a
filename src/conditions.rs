//! Targeting conditions used by the default evaluator.
//!
//! A condition is a JSON object mapping attribute paths to expected values or operator objects,
//! e.g. `{"country": {"$in": ["US", "CA"]}, "beta": true}`. All entries must match. The logical
//! operators `$and`, `$or`, `$nor` and `$not` combine nested conditions.
use std::cmp::Ordering;

use derive_more::From;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw targeting condition. Kept as JSON so that definitions round-trip losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct Condition(pub Value);

impl Condition {
    /// Evaluate the condition against `attributes`. Malformed conditions never match.
    pub fn eval(&self, attributes: &Value) -> bool {
        match &self.0 {
            Value::Object(entries) => eval_entries(entries, attributes),
            _ => false,
        }
    }
}

fn eval_entries(entries: &Map<String, Value>, attributes: &Value) -> bool {
    entries.iter().all(|(key, expected)| match key.as_str() {
        "$and" => eval_list(expected, attributes).is_some_and(|mut it| it.all(|m| m)),
        "$or" => match eval_list(expected, attributes) {
            Some(results) => {
                let results: Vec<bool> = results.collect();
                // An empty $or places no constraint.
                results.is_empty() || results.into_iter().any(|m| m)
            }
            None => false,
        },
        "$nor" => eval_list(expected, attributes).is_some_and(|mut it| !it.any(|m| m)),
        "$not" => !Condition(expected.clone()).eval(attributes),
        path => eval_value(lookup(attributes, path), expected),
    })
}

fn eval_list<'a>(
    conditions: &'a Value,
    attributes: &'a Value,
) -> Option<impl Iterator<Item = bool> + 'a> {
    let list = conditions.as_array()?;
    Some(
        list.iter()
            .map(move |condition| Condition(condition.clone()).eval(attributes)),
    )
}

/// Resolve a dotted attribute path, e.g. `"user.country"`.
fn lookup<'a>(attributes: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(attributes, |value, segment| value.as_object()?.get(segment))
}

fn eval_value(attribute: Option<&Value>, expected: &Value) -> bool {
    match expected {
        Value::Object(ops) if is_operator_object(ops) => ops.iter().all(|(op, operand)| {
            Operator::parse(op).is_some_and(|op| op.eval(attribute, operand))
        }),
        _ => attribute.unwrap_or(&Value::Null) == expected,
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Regex,
    Exists,
    VersionEq,
    VersionNe,
    VersionGt,
    VersionGte,
    VersionLt,
    VersionLte,
}

impl Operator {
    pub(crate) fn parse(op: &str) -> Option<Operator> {
        Some(match op {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$regex" => Self::Regex,
            "$exists" => Self::Exists,
            "$veq" => Self::VersionEq,
            "$vne" => Self::VersionNe,
            "$vgt" => Self::VersionGt,
            "$vgte" => Self::VersionGte,
            "$vlt" => Self::VersionLt,
            "$vlte" => Self::VersionLte,
            _ => return None,
        })
    }

    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    pub(crate) fn eval(&self, attribute: Option<&Value>, operand: &Value) -> bool {
        self.try_eval(attribute, operand).unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied.
    fn try_eval(&self, attribute: Option<&Value>, operand: &Value) -> Option<bool> {
        match self {
            Self::Eq => Some(attribute? == operand),
            Self::Ne => Some(attribute.unwrap_or(&Value::Null) != operand),

            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                let ordering = compare(attribute?, operand)?;
                Some(match self {
                    Self::Gt => ordering == Ordering::Greater,
                    Self::Gte => ordering != Ordering::Less,
                    Self::Lt => ordering == Ordering::Less,
                    Self::Lte => ordering != Ordering::Greater,
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }

            Self::In | Self::Nin => {
                let values = operand.as_array()?;
                let is_in = match attribute {
                    // Array attributes match when any element is listed.
                    Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                    Some(v) => values.contains(v),
                    None => false,
                };
                Some(if *self == Self::In { is_in } else { !is_in })
            }

            Self::Regex => {
                let s = attribute?.as_str()?;
                let regex = Regex::new(operand.as_str()?).ok()?;
                Some(regex.is_match(s))
            }

            Self::Exists => {
                let exists = !matches!(attribute, None | Some(Value::Null));
                Some(exists == operand.as_bool()?)
            }

            Self::VersionEq
            | Self::VersionNe
            | Self::VersionGt
            | Self::VersionGte
            | Self::VersionLt
            | Self::VersionLte => {
                let attribute_version = parse_version(attribute?.as_str()?)?;
                let condition_version = parse_version(operand.as_str()?)?;
                let ordering = attribute_version.cmp(&condition_version);
                Some(match self {
                    Self::VersionEq => ordering == Ordering::Equal,
                    Self::VersionNe => ordering != Ordering::Equal,
                    Self::VersionGt => ordering == Ordering::Greater,
                    Self::VersionGte => ordering != Ordering::Less,
                    Self::VersionLt => ordering == Ordering::Less,
                    Self::VersionLte => ordering != Ordering::Greater,
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }
        }
    }
}

/// Numbers compare numerically, strings lexicographically. Mixed types do not compare.
fn compare(attribute: &Value, operand: &Value) -> Option<Ordering> {
    match (attribute, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Lenient semver parsing: a leading `v` is allowed and missing minor/patch default to zero.
fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim().trim_start_matches('v');
    Version::parse(s).ok().or_else(|| {
        let (core, rest) = match s.find(['-', '+']) {
            Some(i) => s.split_at(i),
            None => (s, ""),
        };
        let mut parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return None;
        }
        parts.resize(3, "0");
        Version::parse(&format!("{}{}", parts.join("."), rest)).ok()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Condition, Operator};

    fn cond(value: serde_json::Value) -> Condition {
        Condition(value)
    }

    #[test]
    fn plain_equality() {
        let c = cond(json!({"id": "1234"}));
        assert!(c.eval(&json!({"id": "1234"})));
        assert!(!c.eval(&json!({"id": "4321"})));
        assert!(!c.eval(&json!({})));
    }

    #[test]
    fn empty_condition_matches() {
        assert!(cond(json!({})).eval(&json!({"id": 1})));
    }

    #[test]
    fn non_object_condition_never_matches() {
        assert!(!cond(json!("id")).eval(&json!({"id": "id"})));
    }

    #[test]
    fn nested_path() {
        let c = cond(json!({"user.country": "US"}));
        assert!(c.eval(&json!({"user": {"country": "US"}})));
        assert!(!c.eval(&json!({"user": "US"})));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(Operator::Gt.eval(Some(&json!(19)), &json!(18)));
        assert!(!Operator::Gt.eval(Some(&json!(18)), &json!(18)));
        assert!(Operator::Gte.eval(Some(&json!(18)), &json!(18)));
        assert!(Operator::Lt.eval(Some(&json!(17.5)), &json!(18)));
        assert!(Operator::Lte.eval(Some(&json!(18)), &json!(18)));
        assert!(!Operator::Lt.eval(None, &json!(18)));
        assert!(!Operator::Lt.eval(Some(&json!(true)), &json!(18)));
    }

    #[test]
    fn in_and_nin() {
        let list = json!(["alice", "bob"]);
        assert!(Operator::In.eval(Some(&json!("alice")), &list));
        assert!(!Operator::In.eval(Some(&json!("charlie")), &list));
        assert!(Operator::In.eval(Some(&json!(["x", "bob"])), &list));
        assert!(!Operator::In.eval(None, &list));
        assert!(Operator::Nin.eval(Some(&json!("charlie")), &list));
        assert!(!Operator::Nin.eval(Some(&json!("bob")), &list));
        assert!(!Operator::In.eval(Some(&json!("alice")), &json!("alice")));
    }

    #[test]
    fn regex() {
        assert!(Operator::Regex.eval(Some(&json!("test@example.com")), &json!("^test.*")));
        assert!(!Operator::Regex.eval(Some(&json!("example@test.com")), &json!("^test.*")));
        assert!(!Operator::Regex.eval(Some(&json!("a")), &json!("(")));
    }

    #[test]
    fn exists() {
        assert!(Operator::Exists.eval(Some(&json!(0)), &json!(true)));
        assert!(!Operator::Exists.eval(None, &json!(true)));
        assert!(Operator::Exists.eval(None, &json!(false)));
        assert!(Operator::Exists.eval(Some(&json!(null)), &json!(false)));
    }

    #[test]
    fn semver() {
        assert!(Operator::VersionGt.eval(Some(&json!("1.13.0")), &json!("1.5.0")));
        assert!(!Operator::VersionGte.eval(Some(&json!("1.2.0")), &json!("1.10.0")));
        assert!(Operator::VersionEq.eval(Some(&json!("v1.2")), &json!("1.2.0")));
        assert!(Operator::VersionLt.eval(Some(&json!("1.0.0-beta")), &json!("1.0.0")));
        assert!(Operator::VersionNe.eval(Some(&json!("2.0.0")), &json!("1.0.0")));
        assert!(!Operator::VersionLte.eval(Some(&json!("not a version")), &json!("1.0.0")));
    }

    #[test]
    fn logical_operators() {
        let attrs = json!({"age": 20, "country": "US"});

        assert!(cond(json!({"$or": [{"age": 30}, {"country": "US"}]})).eval(&attrs));
        assert!(!cond(json!({"$and": [{"age": 20}, {"country": "CA"}]})).eval(&attrs));
        assert!(cond(json!({"$nor": [{"age": 30}, {"country": "CA"}]})).eval(&attrs));
        assert!(cond(json!({"$not": {"country": "CA"}})).eval(&attrs));
        assert!(cond(json!({"$or": []})).eval(&attrs));
    }

    #[test]
    fn operator_objects() {
        let c = cond(json!({"age": {"$gt": 18, "$lt": 100}}));
        assert!(c.eval(&json!({"age": 20})));
        assert!(!c.eval(&json!({"age": 17})));
        assert!(!c.eval(&json!({"age": 110})));

        assert!(!cond(json!({"age": {"$unknown": 1}})).eval(&json!({"age": 1})));
    }
}
