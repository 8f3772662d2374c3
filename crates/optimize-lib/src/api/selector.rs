//! Label selector parsing and matching
//!
//! Accepts the string form used on the command line and in manifests, e.g.
//! `app=web,tier!=cache,env in (prod, staging),!legacy`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::error::{Error, Result};

/// Parse a selector string into a structured label selector.
///
/// Equality requirements become `matchLabels`, everything else becomes a
/// `matchExpressions` entry. An empty string selects everything.
pub fn parse_label_selector(selector: &str) -> Result<LabelSelector> {
    let mut match_labels = BTreeMap::new();
    let mut match_expressions = Vec::new();

    for requirement in split_requirements(selector)? {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            continue;
        }

        if let Some(key) = requirement.strip_prefix('!') {
            match_expressions.push(expression(key, "DoesNotExist", None)?);
        } else if let Some((key, value)) = requirement.split_once("!=") {
            match_expressions.push(expression(key, "NotIn", Some(vec![value.trim().to_string()]))?);
        } else if let Some((key, value)) = requirement
            .split_once("==")
            .or_else(|| requirement.split_once('='))
        {
            let key = validate_key(key)?;
            match_labels.insert(key, value.trim().to_string());
        } else if let Some((key, values)) = split_set(requirement, " notin ") {
            match_expressions.push(expression(key, "NotIn", Some(parse_set(selector, values)?))?);
        } else if let Some((key, values)) = split_set(requirement, " in ") {
            match_expressions.push(expression(key, "In", Some(parse_set(selector, values)?))?);
        } else {
            match_expressions.push(expression(requirement, "Exists", None)?);
        }
    }

    Ok(LabelSelector {
        match_labels: (!match_labels.is_empty()).then_some(match_labels),
        match_expressions: (!match_expressions.is_empty()).then_some(match_expressions),
    })
}

/// Check whether a set of labels satisfies the selector
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    let expressions_match = selector.match_expressions.iter().flatten().all(|req| {
        let values = req.values.as_deref().unwrap_or_default();
        let actual = labels.get(&req.key);
        match req.operator.as_str() {
            "In" => actual.is_some_and(|a| values.contains(a)),
            "NotIn" => actual.map_or(true, |a| !values.contains(a)),
            "Exists" => actual.is_some(),
            "DoesNotExist" => actual.is_none(),
            _ => false,
        }
    });

    labels_match && expressions_match
}

/// Split on commas that are not inside a parenthesized value set
fn split_requirements(selector: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if depth < 0 {
            return Err(Error::input(format!("unbalanced parentheses in selector {selector:?}")));
        }
    }
    if depth != 0 {
        return Err(Error::input(format!("unbalanced parentheses in selector {selector:?}")));
    }
    parts.push(&selector[start..]);
    Ok(parts)
}

fn split_set<'a>(requirement: &'a str, operator: &str) -> Option<(&'a str, &'a str)> {
    requirement.split_once(operator)
}

fn parse_set(selector: &str, values: &str) -> Result<Vec<String>> {
    let values = values.trim();
    let inner = values
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| Error::input(format!("expected a value set in selector {selector:?}")))?;
    Ok(inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

fn expression(
    key: &str,
    operator: &str,
    values: Option<Vec<String>>,
) -> Result<LabelSelectorRequirement> {
    Ok(LabelSelectorRequirement {
        key: validate_key(key)?,
        operator: operator.to_string(),
        values,
    })
}

fn validate_key(key: &str) -> Result<String> {
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(key.to_string())
    } else {
        Err(Error::input(format!("invalid label key {key:?}")))
    }
}
