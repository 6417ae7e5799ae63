//! Translation of structured label selectors into the flat query strings
//! accepted by the `labelSelector` list parameter.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Render a `LabelSelector` (`matchLabels` plus `matchExpressions`) as a label query.
///
/// Requirements are ordered by key. An empty selector yields an empty query,
/// which the API server treats as "match everything".
pub fn label_selector_query(selector: &LabelSelector) -> Result<String, String> {
    let mut requirements: Vec<(&str, String)> = Vec::new();

    if let Some(labels) = &selector.match_labels {
        for (key, value) in labels {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push((key.as_str(), format!("{key}={value}")));
        }
    }

    for expr in selector.match_expressions.iter().flatten() {
        requirements.push((expr.key.as_str(), render_requirement(expr)?));
    }

    requirements.sort_by(|a, b| a.0.cmp(b.0));
    Ok(requirements
        .into_iter()
        .map(|(_, rendered)| rendered)
        .collect::<Vec<_>>()
        .join(","))
}

/// Equality-only query over a plain label map, as used by replication
/// controllers and services.
pub fn equality_query(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_requirement(expr: &LabelSelectorRequirement) -> Result<String, String> {
    let key = expr.key.as_str();
    validate_key(key)?;

    let mut values: Vec<&str> = expr
        .values
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    values.sort_unstable();
    values.dedup();

    match expr.operator.as_str() {
        op @ ("In" | "NotIn") => {
            if values.is_empty() {
                return Err(format!(
                    "values for key {key:?} can't be empty with operator {op}"
                ));
            }
            for value in &values {
                validate_value(key, value)?;
            }
            let word = if op == "In" { "in" } else { "notin" };
            Ok(format!("{key} {word} ({})", values.join(",")))
        }
        op @ ("Exists" | "DoesNotExist") => {
            if !values.is_empty() {
                return Err(format!(
                    "values for key {key:?} must be empty with operator {op}"
                ));
            }
            if op == "Exists" {
                Ok(key.to_string())
            } else {
                Ok(format!("!{key}"))
            }
        }
        other => Err(format!("{other:?} is not a valid label selector operator")),
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(format!("invalid label key {key:?}: bad prefix {prefix:?}"));
        }
    }
    if !is_label_name(name) {
        return Err(format!("invalid label key {key:?}"));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), String> {
    if value.is_empty() || is_label_name(value) {
        Ok(())
    } else {
        Err(format!("invalid label value {value:?} for key {key:?}"))
    }
}

/// `([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]`, at most 63 characters.
fn is_label_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_NAME_LEN
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}

fn is_dns_subdomain(s: &str) -> bool {
    s.len() <= MAX_PREFIX_LEN
        && s.split('.').all(|part| {
            let bytes = part.as_bytes();
            match (bytes.first(), bytes.last()) {
                (Some(first), Some(last)) => {
                    (first.is_ascii_lowercase() || first.is_ascii_digit())
                        && (last.is_ascii_lowercase() || last.is_ascii_digit())
                        && bytes
                            .iter()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
                }
                _ => false,
            }
        })
}
