//! `${ENV_VAR}` substitution for config values.
//!
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are recognised. `$${NAME}` is an
//! escape and yields the literal text `${NAME}`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

/// Matches `${NAME}` with an optional extra leading `$` for escapes.
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute references using the given map.
///
/// Unset or empty variables are an error naming the config path.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(walk(value, env, "")?)
}

fn walk(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => substitute(s, env, path).map(Value::String),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| walk(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                let child = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                out.insert(key.clone(), walk(v, env, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut missing = None;
    let replaced = REFERENCE.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match env.get(name).filter(|v| !v.is_empty()) {
            Some(v) => v.clone(),
            None => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(replaced.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_token() {
        let v = json!({"telegram": {"token": "${TELEGRAM_BOT_TOKEN}"}});
        let out = resolve_env_vars_with(&v, &env(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(out["telegram"]["token"], "123:abc");
    }

    #[test]
    fn missing_var_names_path() {
        let v = json!({"model": {"api_key": "${OPENAI_API_KEY}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err().to_string();
        assert!(err.contains("OPENAI_API_KEY"));
        assert!(err.contains("model.api_key"));
    }

    #[test]
    fn escaped_reference_is_literal() {
        let v = json!({"note": "use $${HOME} here"});
        let out = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(out["note"], "use ${HOME} here");
    }

    #[test]
    fn arrays_and_plain_strings_pass_through() {
        let v = json!({"date_formats": ["%d.%m.%Y", "${FMT}"], "n": 3});
        let out = resolve_env_vars_with(&v, &env(&[("FMT", "%Y-%m-%d")])).unwrap();
        assert_eq!(out["date_formats"][0], "%d.%m.%Y");
        assert_eq!(out["date_formats"][1], "%Y-%m-%d");
        assert_eq!(out["n"], 3);
    }
}
