//! Evaluation of parsed templates against JSON data

use serde_json::Value;

use super::funcs::FuncMap;
use super::parse::{Arg, Branch, Command, Node, Pipeline};

pub(crate) struct Exec<'a> {
    funcs: &'a FuncMap,
    root: &'a Value,
    out: String,
}

impl<'a> Exec<'a> {
    pub(crate) fn new(funcs: &'a FuncMap, root: &'a Value) -> Self {
        Self {
            funcs,
            root,
            out: String::new(),
        }
    }

    pub(crate) fn run(mut self, nodes: &[Node]) -> Result<String, String> {
        let root = self.root;
        self.walk(root, nodes)?;
        Ok(self.out)
    }

    fn walk(&mut self, dot: &Value, nodes: &[Node]) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(dot, pipe)?;
                    self.out.push_str(&print(&value));
                }
                Node::If(branch) => {
                    let value = self.eval_pipeline(dot, &branch.pipe)?;
                    let list = if truthy(&value) {
                        &branch.list
                    } else {
                        &branch.else_list
                    };
                    self.walk(dot, list)?;
                }
                Node::With(branch) => {
                    let value = self.eval_pipeline(dot, &branch.pipe)?;
                    if truthy(&value) {
                        self.walk(&value, &branch.list)?;
                    } else {
                        self.walk(dot, &branch.else_list)?;
                    }
                }
                Node::Range(branch) => self.walk_range(dot, branch)?,
            }
        }
        Ok(())
    }

    fn walk_range(&mut self, dot: &Value, branch: &Branch) -> Result<(), String> {
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let items: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Number(n) if n.as_i64().is_some() => {
                (0..n.as_i64().unwrap_or_default()).map(Value::from).collect()
            }
            Value::Null => Vec::new(),
            other => return Err(format!("range can't iterate over {}", print(&other))),
        };

        if items.is_empty() {
            return self.walk(dot, &branch.else_list);
        }
        for item in &items {
            self.walk(item, &branch.list)?;
        }
        Ok(())
    }

    fn eval_pipeline(&self, dot: &Value, pipe: &Pipeline) -> Result<Value, String> {
        let mut result = None;
        for cmd in &pipe.cmds {
            result = Some(self.eval_command(dot, cmd, result.take())?);
        }
        Ok(result.unwrap_or(Value::Null))
    }

    fn eval_command(&self, dot: &Value, cmd: &Command, piped: Option<Value>) -> Result<Value, String> {
        match cmd.args.as_slice() {
            [Arg::Func(name), rest @ ..] => {
                let mut args = rest
                    .iter()
                    .map(|arg| self.eval_arg(dot, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                args.extend(piped);
                self.call(name, &args)
            }
            [single] if piped.is_none() => self.eval_arg(dot, single),
            _ => Err("can't give argument to non-function".to_string()),
        }
    }

    fn eval_arg(&self, dot: &Value, arg: &Arg) -> Result<Value, String> {
        match arg {
            Arg::Field(chain) => lookup_chain(dot, chain),
            Arg::Root(chain) => lookup_chain(self.root, chain),
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Func(name) => self.call(name, &[]),
            Arg::Pipe(pipe) => self.eval_pipeline(dot, pipe),
        }
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let func = self
            .funcs
            .get(name)
            .ok_or_else(|| format!("function {name:?} not defined"))?;
        func(args).map_err(|e| format!("error calling {name}: {e}"))
    }
}

fn lookup_chain(start: &Value, chain: &[String]) -> Result<Value, String> {
    let mut current = start.clone();
    for name in chain {
        current = lookup(&current, name)?;
    }
    Ok(current)
}

/// Resolve a field, accepting exported (capitalized) spellings of JSON keys
/// and promoting fields from an embedded `metadata` object.
fn lookup(value: &Value, name: &str) -> Result<Value, String> {
    match value {
        Value::Object(map) => {
            let lower_first = lower_first(name);
            let candidates = [name.to_string(), lower_first, name.to_lowercase()];
            if let Some(found) = candidates.iter().find_map(|key| map.get(key)) {
                return Ok(found.clone());
            }
            if let Some(meta @ Value::Object(_)) = map.get("metadata") {
                return lookup(meta, name);
            }
            Ok(Value::Null)
        }
        Value::Null => Ok(Value::Null),
        other => Err(format!(
            "can't evaluate field {name} in type {}",
            type_name(other)
        )),
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Format a value the way the template output expects
pub(crate) fn print(value: &Value) -> String {
    match value {
        Value::Null => "<no value>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(print).collect();
            format!("[{}]", inner.join(" "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map.iter().map(|(k, v)| format!("{k}:{}", print(v))).collect();
            format!("map[{}]", inner.join(" "))
        }
    }
}
