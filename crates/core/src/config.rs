//! Prototype-chained configuration objects.
//!
//! A [`Config`] is an insertion-ordered map from string keys to [`Value`]s
//! with an optional parent link. Lookup of an absent key falls through the
//! parent chain; merging follows the "rightmost non-Null wins" rule with
//! recursive merge of nested configs and wholesale replacement of lists.

use crate::expand::{self, ExpandOpts};
use crate::value::Value;
use crate::{Error, Limits, Result};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Config {
    fields: IndexMap<String, Value>,
    parent: Option<Arc<Config>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config by folding `layers` over an empty config with the
    /// given parent. Later layers override earlier ones per the merge rule.
    pub fn merged<'a>(
        parent: Option<Arc<Config>>,
        layers: impl IntoIterator<Item = &'a Config>,
    ) -> Config {
        let mut out = Config {
            fields: IndexMap::new(),
            parent,
        };
        for layer in layers {
            out.merge_from(layer);
        }
        out
    }

    /// Fold another config's own fields into this one.
    ///
    /// A key set to a non-Null value overrides; nested configs merge
    /// recursively; lists replace wholesale.
    pub fn merge_from(&mut self, other: &Config) {
        for (key, rval) in &other.fields {
            let merged = match (self.fields.get(key), rval) {
                (Some(Value::Config(lc)), Value::Config(rc)) => Some(Value::Config(
                    Config::merged(lc.parent.clone(), [lc, rc]),
                )),
                (None, _) => Some(rval.clone()),
                (Some(_), _) if !rval.is_null() => Some(rval.clone()),
                _ => None,
            };
            if let Some(value) = merged {
                self.fields.insert(key.clone(), value);
            }
        }
    }

    /// Attach a parent, validating the chain.
    ///
    /// An over-deep chain is rejected; since a cycle would present as an
    /// infinite chain, this is also the cycle check.
    pub fn set_parent(&mut self, parent: Arc<Config>, limits: &Limits) -> Result<()> {
        let mut depth = 1;
        let mut cursor = Some(&parent);
        while let Some(config) = cursor {
            if depth > limits.max_parent_depth {
                return Err(Error::ParentChain(format!(
                    "parent chain exceeds {} links (cycle?)",
                    limits.max_parent_depth
                )));
            }
            if let Some(prev) = &config.parent {
                if Arc::ptr_eq(prev, &parent) {
                    return Err(Error::ParentChain(
                        "parent chain forms a cycle".to_string(),
                    ));
                }
            }
            depth += 1;
            cursor = config.parent.as_ref();
        }
        self.parent = Some(parent);
        Ok(())
    }

    pub fn parent(&self) -> Option<&Arc<Config>> {
        self.parent.as_ref()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style `set`, convenient for literal configs.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Look up a key in this config only, ignoring the parent chain.
    pub fn get_own(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a key, walking the parent chain. Missing keys are `None`;
    /// callers that want Null-for-missing use [`Config::get`].
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.fields.get(key) {
            return Some(v);
        }
        let mut cursor = self.parent.as_deref();
        while let Some(config) = cursor {
            if let Some(v) = config.fields.get(key) {
                return Some(v);
            }
            cursor = config.parent.as_deref();
        }
        None
    }

    /// Look up a key; missing keys resolve to Null, not an error.
    pub fn get(&self, key: &str) -> Value {
        self.lookup(key).cloned().unwrap_or(Value::Null)
    }

    /// Own keys, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Expand a value against this config with default options.
    pub fn expand(&self, value: &Value) -> Result<Value> {
        expand::expand_value(self, value, &ExpandOpts::default())
    }

    /// Expand a template string against this config with default options.
    pub fn expand_str(&self, template: &str) -> Result<Value> {
        self.expand(&Value::Str(template.to_string()))
    }

    /// Expand `{key}`; if the macro comes back unexpanded, return `default`.
    pub fn get_expanded(&self, key: &str, default: Value, opts: &ExpandOpts) -> Value {
        let macro_text = format!("{{{key}}}");
        match expand::expand_value(self, &Value::Str(macro_text.clone()), opts) {
            Ok(Value::Str(s)) if s == macro_text => default,
            Ok(v) => v,
            Err(_) => default,
        }
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.parent == other.parent
    }
}

const DUMP_DEPTH: usize = 2;

fn dump_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
    match value {
        Value::Str(s) => write!(f, "\"{s}\""),
        Value::Config(c) => dump_config(f, c, depth),
        Value::List(items) => {
            if depth >= DUMP_DEPTH {
                return write!(f, "[...]");
            }
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                dump_value(f, item, depth + 1)?;
            }
            write!(f, "]")
        }
        other => write!(f, "{}", other.stringify()),
    }
}

fn dump_config(f: &mut fmt::Formatter<'_>, config: &Config, depth: usize) -> fmt::Result {
    if depth >= DUMP_DEPTH {
        return write!(f, "{{...}}");
    }
    write!(f, "{{")?;
    for (i, (key, value)) in config.fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key} = ")?;
        dump_value(f, value, depth + 1)?;
    }
    if config.parent.is_some() {
        if !config.fields.is_empty() {
            write!(f, ", ")?;
        }
        write!(f, "..")?;
    }
    write!(f, "}}")
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dump_config(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(pairs: &[(&str, Value)]) -> Config {
        let mut c = Config::new();
        for (k, v) in pairs {
            c.set(*k, v.clone());
        }
        c
    }

    #[test]
    fn test_lookup_walks_parent_chain() {
        let root = Arc::new(cfg(&[("a", Value::Int(1))]));
        let mut child = cfg(&[("b", Value::Int(2))]);
        child.set_parent(root, &Limits::default()).unwrap();

        assert_eq!(child.get("a"), Value::Int(1));
        assert_eq!(child.get("b"), Value::Int(2));
        assert_eq!(child.get("missing"), Value::Null);
    }

    #[test]
    fn test_own_field_shadows_parent() {
        let root = Arc::new(cfg(&[("a", Value::Int(1))]));
        let mut child = cfg(&[("a", Value::Int(9))]);
        child.set_parent(root, &Limits::default()).unwrap();
        assert_eq!(child.get("a"), Value::Int(9));
    }

    #[test]
    fn test_merge_rightmost_non_null_wins() {
        let a = cfg(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = cfg(&[("x", Value::Int(3)), ("y", Value::Null)]);
        let merged = Config::merged(None, [&a, &b]);
        assert_eq!(merged.get("x"), Value::Int(3));
        assert_eq!(merged.get("y"), Value::Int(2));
    }

    #[test]
    fn test_merge_nested_configs_recursively() {
        let a = cfg(&[(
            "flags",
            Value::Config(cfg(&[("opt", Value::Str("-O0".into())), ("g", Value::Bool(true))])),
        )]);
        let b = cfg(&[(
            "flags",
            Value::Config(cfg(&[("opt", Value::Str("-O2".into()))])),
        )]);
        let merged = Config::merged(None, [&a, &b]);
        let flags = merged.get("flags");
        let flags = flags.as_config().unwrap();
        assert_eq!(flags.get("opt"), Value::Str("-O2".into()));
        assert_eq!(flags.get("g"), Value::Bool(true));
    }

    #[test]
    fn test_merge_lists_replace_wholesale() {
        let a = cfg(&[(
            "srcs",
            Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())]),
        )]);
        let b = cfg(&[("srcs", Value::List(vec![Value::Str("c.c".into())]))]);
        let merged = Config::merged(None, [&a, &b]);
        assert_eq!(merged.get("srcs"), Value::List(vec![Value::Str("c.c".into())]));
    }

    #[test]
    fn test_merge_associativity() {
        let a = cfg(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = cfg(&[("y", Value::Int(3)), ("z", Value::Null)]);
        let c = cfg(&[("z", Value::Int(4))]);

        let abc = Config::merged(None, [&a, &b, &c]);
        let ab = Config::merged(None, [&a, &b]);
        let ab_c = Config::merged(None, [&ab, &c]);
        assert_eq!(abc, ab_c);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let c = cfg(&[
            ("first", Value::Int(1)),
            ("second", Value::Int(2)),
            ("third", Value::Int(3)),
        ]);
        let keys: Vec<&String> = c.keys().collect();
        assert_eq!(keys, ["first", "second", "third"]);
    }

    #[test]
    fn test_parent_chain_depth_cap() {
        let limits = Limits {
            max_parent_depth: 3,
            ..Limits::default()
        };
        let mut chain = Arc::new(Config::new());
        for _ in 0..3 {
            let mut next = Config::new();
            next.set_parent(chain.clone(), &limits).unwrap();
            chain = Arc::new(next);
        }
        let mut over = Config::new();
        assert!(over.set_parent(chain, &limits).is_err());
    }
}
