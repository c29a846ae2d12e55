//! Lua module emission for parsed components.
//!
//! A compiled module is a Lua chunk of shape `return function(props) ... end`
//! that builds its HTML into an output table and concatenates it. Escaping
//! and list coercion go through the shared runtime, imported as `runtime`
//! and resolved by the bundler.

use super::parse::MarkupNode;

/// Quote a string as a Lua string literal.
#[must_use]
pub fn lua_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Emit a server module from a script section and parsed markup nodes.
#[must_use]
pub fn generate_module(script: Option<&str>, nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    out.push_str("return function(props)\n");
    out.push_str("  props = props or {}\n");
    out.push_str("  local __rt = require(\"runtime\")\n");
    out.push_str("  local __out = {}\n");

    if let Some(script) = script {
        for line in script.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }

    emit_nodes(nodes, &mut out);

    out.push_str("  return table.concat(__out)\n");
    out.push_str("end\n");
    out
}

fn emit_nodes(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => {
                if !text.is_empty() {
                    out.push_str(&format!("  __out[#__out + 1] = {}\n", lua_quote(text)));
                }
            }
            MarkupNode::Expr {
                code,
            } => {
                out.push_str(&format!("  __out[#__out + 1] = __rt.escape({code})\n"));
            }
            MarkupNode::Raw {
                code,
            } => {
                out.push_str(&format!("  __out[#__out + 1] = __rt.text({code})\n"));
            }
            MarkupNode::If {
                arms,
                else_arm,
            } => {
                for (i, (cond, body)) in arms.iter().enumerate() {
                    if i == 0 {
                        out.push_str(&format!("  if {cond} then\n"));
                    } else {
                        out.push_str(&format!("  elseif {cond} then\n"));
                    }
                    emit_nodes(body, out);
                }
                if let Some(body) = else_arm {
                    out.push_str("  else\n");
                    emit_nodes(body, out);
                }
                out.push_str("  end\n");
            }
            MarkupNode::Each {
                list,
                binding,
                index,
                body,
            } => {
                match index {
                    Some(index) => out.push_str(&format!(
                        "  for {index}, {binding} in ipairs(__rt.list({list})) do\n"
                    )),
                    None => out.push_str(&format!(
                        "  for _, {binding} in ipairs(__rt.list({list})) do\n"
                    )),
                }
                emit_nodes(body, out);
                out.push_str("  end\n");
            }
        }
    }
}
