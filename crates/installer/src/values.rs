//! Helm values rendering.
//!
//! Chart overrides are written as flat dot-path keys (`operator.logLevel`).
//! They are expanded into a nested tree, deep-merged over the chart's default
//! values (the override wins at every leaf, the defaults fill gaps) and written
//! out as a YAML file for `helm -f`.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Number, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::ChartOverride;

/// Flat dot-path keyed chart values as written in the configuration.
pub type OverrideMap = BTreeMap<String, Value>;

/// Nested mapping level of a values tree.
pub type ValueMap = BTreeMap<String, ChartValue>;

/// Errors raised while rendering a values file.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to parse default values: {0}")]
    Defaults(#[source] serde_yaml::Error),

    #[error("failed to serialize values: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("failed to write values file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A scalar leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    fn as_key(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

/// A values tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartValue {
    Scalar(Scalar),
    Sequence(Vec<ChartValue>),
    Mapping(ValueMap),
}

impl ChartValue {
    /// An empty mapping.
    #[must_use]
    pub fn empty() -> Self {
        Self::Mapping(ValueMap::new())
    }

    /// Borrow the mapping, if this node is one.
    #[must_use]
    pub fn as_mapping(&self) -> Option<&ValueMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Follow a dot path through nested mappings.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&ChartValue> {
        path.split('.').try_fold(self, |node, segment| {
            node.as_mapping().and_then(|map| map.get(segment))
        })
    }
}

impl From<Value> for ChartValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Sequence(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Mapping(mapping) => Self::Mapping(
                mapping
                    .into_iter()
                    .map(|(k, v)| (key_string(k), Self::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

impl From<ChartValue> for Value {
    fn from(value: ChartValue) -> Self {
        match value {
            ChartValue::Scalar(Scalar::Null) => Value::Null,
            ChartValue::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            ChartValue::Scalar(Scalar::Number(n)) => Value::Number(n),
            ChartValue::Scalar(Scalar::String(s)) => Value::String(s),
            ChartValue::Sequence(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            ChartValue::Mapping(map) => {
                let mut mapping = Mapping::new();
                for (k, v) in map {
                    mapping.insert(Value::String(k), Value::from(v));
                }
                Value::Mapping(mapping)
            }
        }
    }
}

fn key_string(key: Value) -> String {
    match ChartValue::from(key) {
        ChartValue::Scalar(scalar) => scalar.as_key(),
        other => serde_yaml::to_string(&Value::from(other))
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

/// Expand dot-path keys into a nested tree.
///
/// Intermediate levels are created as needed. When one path ends where another
/// continues (`a` and `a.b`), the later key in iteration order wins.
#[must_use]
pub fn expand_dot_paths(overrides: &OverrideMap) -> ValueMap {
    let mut root = ValueMap::new();
    for (path, value) in overrides {
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &segments, ChartValue::from(value.clone()));
    }
    root
}

fn insert_path(map: &mut ValueMap, segments: &[&str], value: ChartValue) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry((*head).to_string())
                .or_insert_with(ChartValue::empty);
            if !matches!(entry, ChartValue::Mapping(_)) {
                *entry = ChartValue::empty();
            }
            if let ChartValue::Mapping(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Flatten a tree back into dot-path keys. Only non-empty mappings are
/// descended into; every other node is a leaf.
#[must_use]
pub fn flatten(tree: &ValueMap) -> OverrideMap {
    let mut out = OverrideMap::new();
    flatten_into(tree, "", &mut out);
    out
}

fn flatten_into(tree: &ValueMap, prefix: &str, out: &mut OverrideMap) {
    for (key, node) in tree {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match node {
            ChartValue::Mapping(child) if !child.is_empty() => flatten_into(child, &path, out),
            leaf => {
                out.insert(path, Value::from(leaf.clone()));
            }
        }
    }
}

/// Merge `defaults` into `overrides` in place.
///
/// Where both hold a mapping the merge recurses; where the override holds any
/// other value it is kept; keys only present in the defaults are copied over.
pub fn deep_merge(overrides: &mut ValueMap, defaults: &ValueMap) {
    for (key, default) in defaults {
        match overrides.get_mut(key) {
            Some(ChartValue::Mapping(child)) => {
                if let ChartValue::Mapping(default_child) = default {
                    deep_merge(child, default_child);
                }
            }
            Some(_) => {}
            None => {
                overrides.insert(key.clone(), default.clone());
            }
        }
    }
}

/// Combine two flat override maps; `cluster` wins key-for-key.
#[must_use]
pub fn merge_overrides(global: &OverrideMap, cluster: &OverrideMap) -> OverrideMap {
    let mut merged = global.clone();
    merged.extend(cluster.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Parse a defaults document into a tree. Empty text yields an empty tree.
///
/// # Errors
///
/// Returns [`RenderError::Defaults`] if the text is not valid YAML.
pub fn parse_defaults(defaults_yaml: &str) -> Result<ValueMap, RenderError> {
    if defaults_yaml.trim().is_empty() {
        return Ok(ValueMap::new());
    }
    let value: Value = serde_yaml::from_str(defaults_yaml).map_err(RenderError::Defaults)?;
    Ok(match ChartValue::from(value) {
        ChartValue::Mapping(map) => map,
        // A null document (only comments) carries no defaults.
        _ => ValueMap::new(),
    })
}

/// Merge an override map over defaults without touching the filesystem.
///
/// # Errors
///
/// Returns [`RenderError::Defaults`] if the defaults are not valid YAML.
pub fn merge_values(overrides: &OverrideMap, defaults_yaml: &str) -> Result<ValueMap, RenderError> {
    let mut tree = expand_dot_paths(overrides);
    let defaults = parse_defaults(defaults_yaml)?;
    deep_merge(&mut tree, &defaults);
    Ok(tree)
}

/// Serialize a tree as YAML.
///
/// # Errors
///
/// Returns [`RenderError::Serialize`] if serialization fails.
pub fn to_yaml(tree: ValueMap) -> Result<String, RenderError> {
    serde_yaml::to_string(&Value::from(ChartValue::Mapping(tree))).map_err(RenderError::Serialize)
}

/// Render a chart's values file.
///
/// Any existing file at `output` is truncated. The write is not atomic: a crash
/// mid-write can leave a partial file.
///
/// # Errors
///
/// Returns an error if the defaults cannot be parsed or the file cannot be written.
pub fn render_values(
    output: &Path,
    chart: &ChartOverride,
    defaults_yaml: &str,
) -> Result<(), RenderError> {
    let merged = merge_values(&chart.values, defaults_yaml)?;
    let text = to_yaml(merged)?;
    std::fs::write(output, text).map_err(|source| RenderError::Write {
        path: output.display().to_string(),
        source,
    })?;
    debug!(chart = %chart.chart, path = %output.display(), "Rendered values");
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn overrides(pairs: &[(&str, Value)]) -> OverrideMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn tree(yaml: &str) -> ValueMap {
        parse_defaults(yaml).unwrap()
    }

    #[test]
    fn test_expand_matches_nested_document() {
        let expanded = expand_dot_paths(&overrides(&[("a.b.c", Value::from(1))]));
        assert_eq!(expanded, tree("a:\n  b:\n    c: 1\n"));
    }

    #[test]
    fn test_flatten_reproduces_dot_paths() {
        let original = overrides(&[
            ("a.b.c", Value::from(1)),
            ("a.d", Value::from("x")),
            ("e", Value::from(true)),
            ("f.g", Value::Sequence(vec![Value::from(1), Value::from(2)])),
        ]);
        assert_eq!(flatten(&expand_dot_paths(&original)), original);
    }

    #[test]
    fn test_structured_override_value() {
        let structured: Value = serde_yaml::from_str("{requests: {cpu: 100m}}").unwrap();
        let expanded = expand_dot_paths(&overrides(&[("operator.resources", structured)]));
        let root = ChartValue::Mapping(expanded);
        assert_eq!(
            root.get_path("operator.resources.requests.cpu"),
            Some(&ChartValue::Scalar(Scalar::String("100m".into())))
        );
    }

    #[test]
    fn test_override_wins_defaults_fill_gaps() {
        let merged = merge_values(
            &overrides(&[("x.y", Value::from(9)), ("w", Value::from(3))]),
            "x:\n  y: 1\n  keep: yes-please\nz: 2\n",
        )
        .unwrap();
        assert_eq!(
            merged,
            tree("x:\n  y: 9\n  keep: yes-please\nz: 2\nw: 3\n")
        );
    }

    #[test]
    fn test_override_scalar_replaces_default_mapping() {
        let merged = merge_values(
            &overrides(&[("imagePullSecrets", Value::Null)]),
            "imagePullSecrets:\n  username: bob\n",
        )
        .unwrap();
        assert_eq!(merged, tree("imagePullSecrets: null\n"));
    }

    #[test]
    fn test_override_mapping_kept_over_default_scalar() {
        let merged =
            merge_values(&overrides(&[("a.b", Value::from(1))]), "a: plain\n").unwrap();
        assert_eq!(merged, tree("a:\n  b: 1\n"));
    }

    #[test]
    fn test_worker_render_scenario() {
        let global = overrides(&[("x.y", Value::from(1)), ("z", Value::from(2))]);
        let cluster = overrides(&[("x.y", Value::from(9)), ("w", Value::from(3))]);
        let merged = merge_values(&merge_overrides(&global, &cluster), "").unwrap();
        assert_eq!(merged, tree("x:\n  y: 9\nz: 2\nw: 3\n"));
    }

    #[test]
    fn test_empty_defaults() {
        assert!(parse_defaults("").unwrap().is_empty());
        assert!(parse_defaults("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_defaults() {
        let err = merge_values(&OverrideMap::new(), "a: [unclosed").unwrap_err();
        assert!(matches!(err, RenderError::Defaults(_)));
    }

    #[test]
    fn test_render_values_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker-values.yaml");
        std::fs::write(&path, "stale: content\n".repeat(100)).unwrap();

        let mut chart = ChartOverride::named("kubeslice-worker");
        chart
            .values
            .insert("cluster.name".into(), Value::from("east"));
        render_values(&path, &chart, "cluster:\n  nodeIp: 10.0.0.5\n").unwrap();

        let written: Value = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let expected: Value =
            serde_yaml::from_str("cluster:\n  name: east\n  nodeIp: 10.0.0.5\n").unwrap();
        assert_eq!(written, expected);
    }

    #[test]
    fn test_render_values_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("values.yaml");
        let err = render_values(&path, &ChartOverride::named("c"), "").unwrap_err();
        assert!(matches!(err, RenderError::Write { .. }));
    }

    #[test]
    fn test_dotted_default_keys_are_preserved() {
        let merged = merge_values(
            &overrides(&[("controllerSecret.token", Value::from("abc"))]),
            "controllerSecret:\n  ca.crt: Q0E=\n",
        )
        .unwrap();
        let secret = merged["controllerSecret"].as_mapping().unwrap();
        assert!(secret.contains_key("ca.crt"));
        assert!(secret.contains_key("token"));
    }
}
