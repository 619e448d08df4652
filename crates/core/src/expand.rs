//! Recursive template expansion.
//!
//! A template is a string with balanced `{...}` segments; each segment is
//! an expression evaluated against the surrounding config. Expansion
//! repeats until the result stops changing. A segment that fails to
//! evaluate is re-emitted verbatim rather than erroring — configs may hold
//! templates that only resolve in a child context. The depth and size caps
//! are the only fatal conditions.

use crate::config::Config;
use crate::expr::{self, EvalError};
use crate::value::Value;
use crate::{Error, Limits, Result};
use std::cell::Cell;

/// Options controlling one expansion pass.
#[derive(Debug, Clone, Default)]
pub struct ExpandOpts {
    pub limits: Limits,
    /// Log every expansion step (the `--trace` flag).
    pub trace: bool,
}

/// Shared state for one recursive expansion: the depth counter spans
/// nested configs so runaway mutual recursion is always caught.
pub(crate) struct ExpandCtx<'a> {
    pub opts: &'a ExpandOpts,
    depth: Cell<usize>,
}

impl<'a> ExpandCtx<'a> {
    fn new(opts: &'a ExpandOpts) -> Self {
        Self {
            opts,
            depth: Cell::new(0),
        }
    }

    fn enter(&self, template: &str) -> Result<DepthGuard<'_>> {
        let depth = self.depth.get() + 1;
        if depth > self.opts.limits.max_expand_depth {
            return Err(Error::ExpansionLoop {
                template: template.to_string(),
                detail: format!(
                    "recursion depth exceeded {}",
                    self.opts.limits.max_expand_depth
                ),
            });
        }
        self.depth.set(depth);
        Ok(DepthGuard(&self.depth))
    }

    pub(crate) fn trace_enabled(&self, config: &Config) -> bool {
        self.opts.trace || config.get("trace").truthy()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// One piece of a split template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    /// Expression source, without the outer braces.
    Macro(String),
}

/// Split a template into literal text and balanced `{...}` segments.
///
/// Braces nest (for list/index syntax inside expressions) and quoted
/// strings inside a segment may contain braces. `\{` and `\}` never open
/// or close a segment. An unbalanced `{` is treated as literal text.
pub(crate) fn split_template(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() && matches!(chars[i + 1], '{' | '}') {
            buf.push(c);
            buf.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == '{' {
            let mut depth = 1usize;
            let mut quote: Option<char> = None;
            let mut j = i + 1;
            while j < chars.len() {
                let d = chars[j];
                match quote {
                    Some(q) => {
                        if d == '\\' {
                            j += 1;
                        } else if d == q {
                            quote = None;
                        }
                    }
                    None => match d {
                        '\'' | '"' => quote = Some(d),
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    },
                }
                j += 1;
            }
            if depth == 0 && j < chars.len() {
                if !buf.is_empty() {
                    out.push(Segment::Text(std::mem::take(&mut buf)));
                }
                out.push(Segment::Macro(chars[i + 1..j].iter().collect()));
                i = j + 1;
                continue;
            }
        }
        buf.push(c);
        i += 1;
    }
    if !buf.is_empty() {
        out.push(Segment::Text(buf));
    }
    out
}

/// Expand a value against a config.
///
/// Strings go through template expansion; lists are mapped element-wise
/// and then flattened (Nulls dropped); everything else passes through
/// unchanged.
pub fn expand_value(config: &Config, value: &Value, opts: &ExpandOpts) -> Result<Value> {
    let ctx = ExpandCtx::new(opts);
    expand_inner(config, value, &ctx)
}

pub(crate) fn expand_inner(config: &Config, value: &Value, ctx: &ExpandCtx) -> Result<Value> {
    match value {
        Value::Str(s) => expand_str_inner(config, s, ctx),
        Value::List(items) => {
            let expanded = items
                .iter()
                .map(|v| expand_inner(config, v, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(Value::List(expanded).flatten()))
        }
        other => Ok(other.clone()),
    }
}

fn expand_str_inner(config: &Config, text: &str, ctx: &ExpandCtx) -> Result<Value> {
    let segments = split_template(text);
    if !segments.iter().any(|s| matches!(s, Segment::Macro(_))) {
        return Ok(Value::Str(text.to_string()));
    }

    let _guard = ctx.enter(text)?;
    let trace = ctx.trace_enabled(config);
    if trace {
        tracing::debug!(template = text, "expand");
    }

    // A whole-string single segment keeps the expression's value (lists
    // stay lists); anything else stringifies segment by segment.
    let result = match segments.as_slice() {
        [Segment::Macro(src)] => match expr::eval_expr(src, config, ctx) {
            Ok(v) => v,
            Err(EvalError::Fatal(e)) => return Err(e),
            Err(err) => {
                if trace {
                    tracing::debug!(template = text, %err, "expansion left verbatim");
                }
                return Ok(Value::Str(text.to_string()));
            }
        },
        _ => {
            let mut out = String::new();
            for segment in &segments {
                match segment {
                    Segment::Text(t) => out.push_str(t),
                    Segment::Macro(src) => match expr::eval_expr(src, config, ctx) {
                        Ok(v) => out.push_str(&v.stringify()),
                        Err(EvalError::Fatal(e)) => return Err(e),
                        Err(err) => {
                            if trace {
                                tracing::debug!(segment = %src, %err, "segment left verbatim");
                            }
                            out.push('{');
                            out.push_str(src);
                            out.push('}');
                        }
                    },
                }
            }
            Value::Str(out)
        }
    };

    // Recurse until a fixed point; the result may itself be a template.
    match result {
        Value::Str(s) if s == text => Ok(Value::Str(s)),
        Value::Str(s) => {
            if s.len() > ctx.opts.limits.max_expand_size {
                return Err(Error::ExpansionLoop {
                    template: text.to_string(),
                    detail: format!(
                        "expanded string grew past {} bytes",
                        ctx.opts.limits.max_expand_size
                    ),
                });
            }
            if trace {
                tracing::debug!(template = text, result = %s, "expanded");
            }
            expand_str_inner(config, &s, ctx)
        }
        other => expand_inner(config, &other, ctx),
    }
}
