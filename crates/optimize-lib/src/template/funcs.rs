//! Functions available to templates

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use super::exec::{print, truthy, type_name};
use crate::quantity::Quantity;

pub type Func = fn(&[Value]) -> Result<Value, String>;

pub type FuncMap = BTreeMap<&'static str, Func>;

/// The default function table
pub fn func_map() -> FuncMap {
    let mut funcs = FuncMap::new();
    funcs.insert("duration", duration as Func);
    funcs.insert("percent", percent);
    funcs.insert("resourceRequests", resource_requests);
    funcs.insert("index", index);
    funcs.insert("default", default);
    funcs.insert("quote", quote);
    funcs.insert("lower", lower);
    funcs.insert("upper", upper);
    funcs.insert("eq", eq);
    funcs.insert("ne", ne);
    funcs.insert("not", not);
    funcs.insert("and", and);
    funcs.insert("or", or);
    funcs.insert("len", len);
    funcs.insert("print", print_values);
    funcs
}

fn arity(args: &[Value], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!("wrong number of args: want {n} got {}", args.len()));
    }
    Ok(())
}

fn float(v: f64) -> Result<Value, String> {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| format!("{v} is not a finite number"))
}

fn as_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("invalid number {n}")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("invalid number {s:?}")),
        other => Err(format!("expected a number, got {}", type_name(other))),
    }
}

/// Timestamps are RFC 3339 strings; null and year one both mean "not set"
fn as_time(value: &Value) -> Option<DateTime<Utc>> {
    let Value::String(s) = value else {
        return None;
    };
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
}

/// Seconds between two timestamps, zero if either is missing
fn duration(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    match (as_time(&args[0]), as_time(&args[1])) {
        (Some(start), Some(end)) => {
            float((end - start).num_milliseconds() as f64 / 1000.0)
        }
        _ => Ok(Value::from(0)),
    }
}

/// Integer percentage of a value, as a string
fn percent(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let value = as_f64(&args[0])?;
    let pct = as_f64(&args[1])?;
    Ok(Value::String(((value * (pct / 100.0)) as i64).to_string()))
}

/// Weighted sum of the resource requests of every container in a pod list.
///
/// Weights are given as `name=weight` pairs; each request contributes its
/// value multiplied by the weight.
fn resource_requests(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let Value::String(spec) = &args[1] else {
        return Err("weights must be a string".to_string());
    };

    let mut weights = Vec::new();
    for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
        let (name, weight) = entry
            .split_once('=')
            .ok_or_else(|| format!("invalid weight {entry:?}"))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|_| format!("invalid weight {entry:?}"))?;
        weights.push((name.trim().to_string(), weight));
    }

    let pods: Vec<&Value> = match args[0].get("items") {
        Some(Value::Array(items)) => items.iter().collect(),
        _ if args[0].get("spec").is_some() => vec![&args[0]],
        _ => Vec::new(),
    };

    let mut total = 0.0;
    for pod in pods {
        let containers = pod
            .pointer("/spec/containers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for container in containers {
            for (name, weight) in &weights {
                let Some(request) = container
                    .pointer("/resources/requests")
                    .and_then(|r| r.get(name))
                else {
                    continue;
                };
                let quantity = match request {
                    Value::String(s) => Quantity::parse(s).map_err(|e| e.to_string())?,
                    other => Quantity::parse(&print(other)).map_err(|e| e.to_string())?,
                };
                total += quantity.milli_value() as f64 * weight / 1000.0;
            }
        }
    }
    float(total)
}

fn index(args: &[Value]) -> Result<Value, String> {
    let (collection, keys) = args
        .split_first()
        .ok_or_else(|| "wrong number of args: want at least 1 got 0".to_string())?;
    let mut current = collection.clone();
    for key in keys {
        current = match (&current, key) {
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Array(items), Value::Number(n)) => {
                let i = n
                    .as_u64()
                    .ok_or_else(|| format!("cannot index slice with {n}"))?;
                items
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| format!("index out of range: {i}"))?
            }
            (Value::Null, _) => Value::Null,
            (c, k) => {
                return Err(format!(
                    "cannot index {} with {}",
                    type_name(c),
                    type_name(k)
                ))
            }
        };
    }
    Ok(current)
}

/// `default FALLBACK VALUE` returns the fallback when the value is empty
fn default(args: &[Value]) -> Result<Value, String> {
    match args {
        [fallback] => Ok(fallback.clone()),
        [fallback, given] if !truthy(given) => Ok(fallback.clone()),
        [_, given] => Ok(given.clone()),
        _ => Err(format!("wrong number of args: want 1 or 2 got {}", args.len())),
    }
}

fn quote(args: &[Value]) -> Result<Value, String> {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| format!("{:?}", print(v)))
        .collect();
    Ok(Value::String(quoted.join(" ")))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(print(&args[0]).to_lowercase()))
}

fn upper(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(print(&args[0]).to_uppercase()))
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// `eq ARG1 ARG2...` is true when the first argument equals any other
fn eq(args: &[Value]) -> Result<Value, String> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| "missing argument for comparison".to_string())?;
    if rest.is_empty() {
        return Err("missing argument for comparison".to_string());
    }
    Ok(Value::Bool(rest.iter().any(|v| same(first, v))))
}

fn ne(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(!same(&args[0], &args[1])))
}

fn not(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Bool(!truthy(&args[0])))
}

fn and(args: &[Value]) -> Result<Value, String> {
    Ok(args
        .iter()
        .find(|v| !truthy(v))
        .or(args.last())
        .cloned()
        .unwrap_or(Value::Null))
}

fn or(args: &[Value]) -> Result<Value, String> {
    Ok(args
        .iter()
        .find(|v| truthy(v))
        .or(args.last())
        .cloned()
        .unwrap_or(Value::Null))
}

fn len(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => return Err(format!("len of type {}", type_name(other))),
    };
    Ok(Value::from(n))
}

/// Concatenate operands, separating them with a space when neither is a string
fn print_values(args: &[Value]) -> Result<Value, String> {
    let mut out = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 && !value.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&print(value));
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duration() {
        let start = json!("2020-01-01T00:00:00Z");
        let end = json!("2020-01-01T00:02:30Z");
        assert_eq!(duration(&[start.clone(), end]).unwrap(), json!(150.0));
        assert_eq!(
            duration(&[start, json!("0001-01-01T00:00:00Z")]).unwrap(),
            json!(0)
        );
        assert_eq!(duration(&[Value::Null, Value::Null]).unwrap(), json!(0));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(&[json!(2000), json!(50)]).unwrap(), json!("1000"));
        assert_eq!(percent(&[json!("300"), json!(33)]).unwrap(), json!("99"));
        assert!(percent(&[json!("x"), json!(1)]).is_err());
    }

    #[test]
    fn test_resource_requests() {
        let pods = json!({
            "items": [
                {"spec": {"containers": [
                    {"resources": {"requests": {"cpu": "500m", "memory": "1Gi"}}},
                    {"resources": {"requests": {"cpu": "1"}}}
                ]}},
                {"spec": {"containers": [{"name": "no-requests"}]}}
            ]
        });
        let cpu_only = resource_requests(&[pods.clone(), json!("cpu=2")]).unwrap();
        assert_eq!(cpu_only, json!(3.0));

        let memory = resource_requests(&[pods.clone(), json!("memory=0.000000001")]).unwrap();
        let bytes = 1024.0 * 1024.0 * 1024.0;
        assert!((memory.as_f64().unwrap() - bytes * 1e-9).abs() < 1e-9);

        assert!(resource_requests(&[pods, json!("cpu")]).is_err());
        assert_eq!(
            resource_requests(&[Value::Null, json!("cpu=1")]).unwrap(),
            json!(0.0)
        );
    }

    #[test]
    fn test_index_and_default() {
        let data = json!({"a": [10, 20]});
        assert_eq!(index(&[data.clone(), json!("a"), json!(1)]).unwrap(), json!(20));
        assert!(index(&[data.clone(), json!("a"), json!(5)]).is_err());
        assert_eq!(index(&[data, json!("b")]).unwrap(), Value::Null);
        assert_eq!(default(&[json!("x"), json!("")]).unwrap(), json!("x"));
        assert_eq!(default(&[json!("x"), json!("y")]).unwrap(), json!("y"));
        assert_eq!(default(&[json!("x")]).unwrap(), json!("x"));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(quote(&[json!("a b")]).unwrap(), json!("\"a b\""));
        assert_eq!(lower(&[json!("ABC")]).unwrap(), json!("abc"));
        assert_eq!(upper(&[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(print_values(&[json!(1), json!(2), json!("x")]).unwrap(), json!("1 2x"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eq(&[json!(1), json!(1.0)]).unwrap(), json!(true));
        assert_eq!(eq(&[json!("a"), json!("b"), json!("a")]).unwrap(), json!(true));
        assert_eq!(ne(&[json!("a"), json!("b")]).unwrap(), json!(true));
        assert_eq!(not(&[json!("")]).unwrap(), json!(true));
        assert_eq!(and(&[json!(1), json!(0)]).unwrap(), json!(0));
        assert_eq!(or(&[json!(0), json!("x")]).unwrap(), json!("x"));
        assert_eq!(len(&[json!([1, 2, 3])]).unwrap(), json!(3));
    }
}
