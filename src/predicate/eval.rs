//! In-memory predicate evaluation over a decoded event's JSON form.
//!
//! Mirrors the SQL semantics of the compiled form closely enough to filter
//! rows the database could not: NULL propagates through comparisons and
//! arithmetic, and only a definite `true` selects a row.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use super::{method, BinaryOp, Expr, Literal, PredicateError, UnaryOp};

type Result<T> = std::result::Result<T, PredicateError>;

/// `true` when `expr` definitely holds for `event`.
pub fn evaluate(expr: &Expr, event: &Map<String, Json>) -> Result<bool> {
    Ok(matches!(condition(expr, event)?, Some(true)))
}

/// Three-valued truth: `None` is SQL's UNKNOWN.
fn condition(expr: &Expr, event: &Map<String, Json>) -> Result<Option<bool>> {
    match value(expr, event)? {
        None => Ok(None),
        Some(Json::Bool(b)) => Ok(Some(b)),
        Some(other) => Err(PredicateError::TypeMismatch(format!(
            "{} is not a condition",
            other
        ))),
    }
}

fn value(expr: &Expr, event: &Map<String, Json>) -> Result<Option<Json>> {
    match expr {
        Expr::Constant(Literal::List(_)) => Err(PredicateError::TypeMismatch(
            "list constant outside of IN".to_string(),
        )),
        Expr::Constant(lit) => Ok(literal_json(lit)),
        Expr::Member(path) => Ok(lookup(event, path)),
        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => Ok(condition(operand, event)?.map(|b| Json::Bool(!b))),
            UnaryOp::Negate => Ok(value(operand, event)?
                .and_then(|v| v.as_f64())
                .map(|n| number(-n))),
            UnaryOp::Identity => value(operand, event),
        },
        Expr::Binary { op, left, right } => binary(*op, left, right, event),
        Expr::Call {
            method,
            target,
            args,
        } => call(method, target, args, event),
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, event: &Map<String, Json>) -> Result<Option<Json>> {
    match op {
        BinaryOp::And => {
            let l = condition(left, event)?;
            if l == Some(false) {
                return Ok(Some(Json::Bool(false)));
            }
            let r = condition(right, event)?;
            Ok(match (l, r) {
                (_, Some(false)) => Some(Json::Bool(false)),
                (Some(true), Some(true)) => Some(Json::Bool(true)),
                _ => None,
            })
        }
        BinaryOp::Or => {
            let l = condition(left, event)?;
            if l == Some(true) {
                return Ok(Some(Json::Bool(true)));
            }
            let r = condition(right, event)?;
            Ok(match (l, r) {
                (_, Some(true)) => Some(Json::Bool(true)),
                (Some(false), Some(false)) => Some(Json::Bool(false)),
                _ => None,
            })
        }
        BinaryOp::Eq | BinaryOp::Ne if is_null_literal(left) || is_null_literal(right) => {
            let other = if is_null_literal(right) { left } else { right };
            let is_null = value(other, event)?.is_none();
            Ok(Some(Json::Bool(is_null == (op == BinaryOp::Eq))))
        }
        _ if op.is_comparison() => {
            let (Some(l), Some(r)) = (value(left, event)?, value(right, event)?) else {
                return Ok(None);
            };
            let Some(ordering) = compare(&l, &r) else {
                return Ok(match op {
                    BinaryOp::Eq => Some(Json::Bool(l == r)),
                    BinaryOp::Ne => Some(Json::Bool(l != r)),
                    _ => None,
                });
            };
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Some(Json::Bool(result)))
        }
        _ => {
            let (Some(l), Some(r)) = (value(left, event)?, value(right, event)?) else {
                return Ok(None);
            };
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(PredicateError::TypeMismatch(format!(
                    "{} applied to non-numeric operands",
                    op.sql()
                )));
            };
            let n = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b == 0.0 => return Ok(None),
                BinaryOp::Div => a / b,
                BinaryOp::Mod if b == 0.0 => return Ok(None),
                _ => a % b,
            };
            Ok(Some(number(n)))
        }
    }
}

fn call(name: &str, target: &Expr, args: &[Expr], event: &Map<String, Json>) -> Result<Option<Json>> {
    let [arg] = args else {
        return Err(PredicateError::UnsupportedCall(format!(
            "{} with {} arguments",
            name,
            args.len()
        )));
    };

    match name {
        method::CONTAINS if matches!(target, Expr::Constant(Literal::List(_))) => {
            membership(arg, target, event)
        }
        method::CONTAINS | method::STARTS_WITH | method::ENDS_WITH => {
            let Expr::Constant(Literal::String(pattern)) = arg else {
                return Err(PredicateError::NonConstantPattern(name.to_string()));
            };
            let Some(subject) = value(target, event)? else {
                return Ok(None);
            };
            let subject = match subject {
                Json::String(s) => s,
                other => other.to_string(),
            };
            let hit = match name {
                method::CONTAINS => subject.contains(pattern.as_str()),
                method::STARTS_WITH => subject.starts_with(pattern.as_str()),
                _ => subject.ends_with(pattern.as_str()),
            };
            Ok(Some(Json::Bool(hit)))
        }
        method::IN => membership(target, arg, event),
        other => Err(PredicateError::UnsupportedCall(other.to_string())),
    }
}

fn membership(target: &Expr, collection: &Expr, event: &Map<String, Json>) -> Result<Option<Json>> {
    let Expr::Constant(Literal::List(items)) = collection else {
        return Err(PredicateError::NonConstantCollection);
    };
    let Some(subject) = value(target, event)? else {
        return Ok(None);
    };

    let mut saw_null = false;
    for item in items {
        match literal_json(item) {
            Some(candidate) if equal(&subject, &candidate) => return Ok(Some(Json::Bool(true))),
            Some(_) => {}
            None => saw_null = true,
        }
    }
    Ok(if saw_null { None } else { Some(Json::Bool(false)) })
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(Literal::Null))
}

fn literal_json(lit: &Literal) -> Option<Json> {
    match lit {
        Literal::Null => None,
        Literal::Bool(b) => Some(Json::Bool(*b)),
        Literal::Int(n) => Some(Json::from(*n)),
        Literal::Float(f) => Some(number(*f)),
        Literal::String(s) => Some(Json::String(s.clone())),
        Literal::Uuid(u) => Some(Json::String(u.to_string())),
        Literal::DateTime(t) => Some(Json::String(t.to_rfc3339())),
        Literal::List(items) => Some(Json::Array(items.iter().filter_map(literal_json).collect())),
    }
}

fn number(n: f64) -> Json {
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Walk a member path; keys match case-insensitively, numeric segments
/// index arrays. JSON null reads as absent.
fn lookup(event: &Map<String, Json>, path: &[String]) -> Option<Json> {
    let (first, rest) = path.split_first()?;
    let mut current = get_ignore_case(event, first)?;
    for segment in rest {
        current = match current {
            Json::Object(map) => get_ignore_case(map, segment)?,
            Json::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Json::Null => None,
        other => Some(other.clone()),
    }
}

fn get_ignore_case<'a>(map: &'a Map<String, Json>, key: &str) -> Option<&'a Json> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn equal(a: &Json, b: &Json) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Order two scalars: numbers numerically, then timestamps and UUIDs when
/// both strings parse as such, then plain strings and booleans.
fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        (Json::String(x), Json::String(y)) => {
            if let (Ok(x), Ok(y)) = (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                return Some(x.with_timezone(&Utc).cmp(&y.with_timezone(&Utc)));
            }
            if let (Ok(x), Ok(y)) = (Uuid::parse_str(x), Uuid::parse_str(y)) {
                return Some(x.cmp(&y));
            }
            Some(x.cmp(y))
        }
        _ => None,
    }
}
