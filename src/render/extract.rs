//! Lightweight static markup extraction.
//!
//! Resolving a page's blocks does not need the full sandbox: for templates
//! whose output depends only on their properties, the markup tree can be
//! walked directly with a restricted expression evaluator. This path is
//! considerably cheaper than creating an isolated state per block and is
//! what block resolution uses; the sandbox is reserved for contexts that
//! need fully dynamic per-request rendering.
//!
//! The evaluator understands property paths, literals, `not`, and `or`
//! fallbacks. Anything beyond that renders as empty rather than failing the
//! page.

use crate::compiler::parse::{MarkupNode, parse_markup, split_source};
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::debug;

/// Render a template's markup against a property bag, without executing any
/// template logic.
#[must_use]
pub fn extract_markup(source: &str, data: &Value) -> String {
    let parts = split_source(source);
    match parse_markup(&parts.markup) {
        Ok(nodes) => {
            let scope = Scope::root(data);
            let mut out = String::new();
            render_nodes(&nodes, &scope, &mut out);
            out.trim().to_string()
        }
        Err(err) => {
            debug!(error = %err, "markup parse failed; falling back to tag stripping");
            parts.markup.trim().to_string()
        }
    }
}

/// Pull the scoped CSS out of a source's style block.
#[must_use]
pub fn extract_style_block(source: &str) -> String {
    split_source(source).style.map(|s| s.trim().to_string()).unwrap_or_default()
}

struct Scope<'a> {
    data: &'a Value,
    locals: HashMap<String, Value>,
}

impl<'a> Scope<'a> {
    fn root(data: &'a Value) -> Self {
        Self {
            data,
            locals: HashMap::new(),
        }
    }

    fn child(&self, binding: &str, value: Value, index: Option<(&str, usize)>) -> Scope<'a> {
        let mut locals = self.locals.clone();
        locals.insert(binding.to_string(), value);
        if let Some((name, n)) = index {
            locals.insert(name.to_string(), Value::Number(Number::from(n)));
        }
        Scope {
            data: self.data,
            locals,
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if name == "props" {
            return Some(self.data.clone());
        }
        if let Some(value) = self.locals.get(name) {
            return Some(value.clone());
        }
        self.data.get(name).cloned()
    }
}

fn render_nodes(nodes: &[MarkupNode], scope: &Scope<'_>, out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::Expr {
                code,
            } => {
                if let Some(value) = eval(code, scope) {
                    out.push_str(&escape_html(&value_text(&value)));
                }
            }
            MarkupNode::Raw {
                code,
            } => {
                if let Some(value) = eval(code, scope) {
                    out.push_str(&value_text(&value));
                }
            }
            MarkupNode::If {
                arms,
                else_arm,
            } => {
                let mut matched = false;
                for (cond, body) in arms {
                    if eval(cond, scope).as_ref().is_some_and(truthy) {
                        render_nodes(body, scope, out);
                        matched = true;
                        break;
                    }
                }
                if !matched && let Some(body) = else_arm {
                    render_nodes(body, scope, out);
                }
            }
            MarkupNode::Each {
                list,
                binding,
                index,
                body,
            } => {
                let Some(Value::Array(items)) = eval(list, scope) else {
                    continue;
                };
                for (n, item) in items.into_iter().enumerate() {
                    // Indexes are 1-based, matching the compiled path.
                    let child =
                        scope.child(binding, item, index.as_deref().map(|name| (name, n + 1)));
                    render_nodes(body, &child, out);
                }
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Evaluate a restricted expression: `or`-chains of operands, where an
/// operand is a literal, a property path, or a `not`-negated operand.
fn eval(code: &str, scope: &Scope<'_>) -> Option<Value> {
    let parts = split_or_chain(code.trim());
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        let value = eval_operand(part.trim(), scope);
        if i == last {
            return value;
        }
        if let Some(value) = value
            && truthy(&value)
        {
            return Some(value);
        }
    }
    None
}

/// Split on top-level ` or ` occurrences, skipping quoted strings.
fn split_or_chain(code: &str) -> Vec<&str> {
    let bytes = code.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b' ' if code[i..].starts_with(" or ") => {
                parts.push(&code[start..i]);
                i += 3;
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&code[start.min(code.len())..]);
    parts
}

fn eval_operand(code: &str, scope: &Scope<'_>) -> Option<Value> {
    if let Some(rest) = code.strip_prefix("not ") {
        let negated = eval_operand(rest.trim(), scope);
        return Some(Value::Bool(!negated.as_ref().is_some_and(truthy)));
    }

    match code {
        "nil" => return Some(Value::Null),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }

    if let Ok(number) = code.parse::<f64>() {
        return Number::from_f64(number).map(Value::Number);
    }

    if code.len() >= 2 {
        let bytes = code.as_bytes();
        if (bytes[0] == b'"' && bytes[code.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[code.len() - 1] == b'\'')
        {
            return Some(Value::String(code[1..code.len() - 1].to_string()));
        }
    }

    eval_path(code, scope)
}

fn eval_path(code: &str, scope: &Scope<'_>) -> Option<Value> {
    let mut segments = code.split('.');
    let first = segments.next()?;
    if !is_identifier(first) {
        return None;
    }

    let mut current = scope.lookup(first)?;
    for segment in segments {
        if !is_identifier(segment) {
            return None;
        }
        current = current.get(segment)?.clone();
    }
    Some(current)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(extract_markup("<p>hello</p>", &json!({})), "<p>hello</p>");
    }

    #[test]
    fn test_property_interpolation_escapes() {
        let html = extract_markup("<h1>{title}</h1>", &json!({"title": "a<b"}));
        assert_eq!(html, "<h1>a&lt;b</h1>");
    }

    #[test]
    fn test_nested_path_and_props_alias() {
        let data = json!({"cta": {"text": "Go"}});
        assert_eq!(extract_markup("{cta.text}", &data), "Go");
        assert_eq!(extract_markup("{props.cta.text}", &data), "Go");
    }

    #[test]
    fn test_or_fallback() {
        assert_eq!(extract_markup(r#"{missing or "fallback"}"#, &json!({})), "fallback");
        assert_eq!(
            extract_markup(r#"{title or "fallback"}"#, &json!({"title": "real"})),
            "real"
        );
    }

    #[test]
    fn test_if_blocks() {
        let markup = "{#if vip}VIP{:else}guest{/if}";
        assert_eq!(extract_markup(markup, &json!({"vip": true})), "VIP");
        assert_eq!(extract_markup(markup, &json!({"vip": false})), "guest");
        assert_eq!(extract_markup(markup, &json!({})), "guest");
    }

    #[test]
    fn test_each_blocks_with_index() {
        let markup = "{#each items as item, i}<li>{i}:{item.label}</li>{/each}";
        let data = json!({"items": [{"label": "a"}, {"label": "b"}]});
        assert_eq!(extract_markup(markup, &data), "<li>1:a</li><li>2:b</li>");
    }

    #[test]
    fn test_each_of_missing_list_renders_nothing() {
        assert_eq!(extract_markup("{#each items as item}x{/each}", &json!({})), "");
    }

    #[test]
    fn test_unsupported_expression_renders_empty() {
        assert_eq!(extract_markup("<p>{compute(1, 2)}</p>", &json!({})), "<p></p>");
    }

    #[test]
    fn test_script_and_style_are_dropped() {
        let source = "<script>local x = 1</script><p>{title}</p><style>p{}</style>";
        let html = extract_markup(source, &json!({"title": "t"}));
        assert_eq!(html, "<p>t</p>");
    }

    #[test]
    fn test_extract_style_block() {
        let source = "<p>x</p><style>\n.a { color: red; }\n</style>";
        assert_eq!(extract_style_block(source), ".a { color: red; }");
        assert_eq!(extract_style_block("<p>x</p>"), "");
    }

    #[test]
    fn test_not_operator() {
        let markup = "{#if not hidden}shown{/if}";
        assert_eq!(extract_markup(markup, &json!({})), "shown");
        assert_eq!(extract_markup(markup, &json!({"hidden": true})), "");
    }
}
