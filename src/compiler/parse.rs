//! Component source parsing.
//!
//! A component source file has up to three parts: one `<script>` block of
//! Lua logic, one `<style>` block of scoped CSS, and markup. Markup text is
//! interleaved with expression islands and block tags:
//!
//! ```text
//! {expr}                        escaped interpolation
//! {@html expr}                  raw interpolation
//! {#if cond} {:else if c} {:else} {/if}
//! {#each list as item, idx} {/each}
//! ```
//!
//! Expressions are Lua expressions passed through to the compiled module
//! verbatim; this parser only needs to find their boundaries, which it does
//! with quote-aware brace matching.

use super::CompileError;
use crate::constants::{LIB_IMPORT_PREFIX, RUNTIME_IMPORT, TEMPLATE_IMPORT_PREFIX};
use regex::Regex;
use std::sync::OnceLock;

/// The three sections of a component source file.
#[derive(Debug, Clone, Default)]
pub struct SourceParts {
    pub script: Option<String>,
    pub style: Option<String>,
    pub markup: String,
}

fn script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*>(.*?)</script>").expect("script pattern is valid")
    })
}

fn style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<style[^>]*>(.*?)</style>").expect("style pattern is valid")
    })
}

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("ident pattern is valid"))
}

/// Replace a matched span with newlines so later line numbers stay aligned
/// with the original source.
fn blank_preserving_lines(source: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(source, |caps: &regex::Captures<'_>| {
            "\n".repeat(caps[0].matches('\n').count())
        })
        .into_owned()
}

/// Split a component source into script, style, and markup sections.
#[must_use]
pub fn split_source(source: &str) -> SourceParts {
    let script = script_pattern().captures(source).map(|caps| caps[1].to_string());
    let style = style_pattern().captures(source).map(|caps| caps[1].to_string());

    let without_script = blank_preserving_lines(source, script_pattern());
    let markup = blank_preserving_lines(&without_script, style_pattern());

    SourceParts {
        script,
        style,
        markup,
    }
}

/// Inject a `<script>` block that binds schema keys from `props` when the
/// source has none, so bare markup templates can reference their fields
/// directly.
#[must_use]
pub fn normalize_source(source: &str, schema: &crate::template::model::TemplateSchema) -> String {
    if source.contains("<script") {
        return source.to_string();
    }

    let mut header = String::from("<script>\n");
    for field in &schema.fields {
        header.push_str(&format!("local {key} = props.{key}\n", key = field.key));
    }
    header.push_str("</script>\n\n");
    format!("{header}{source}")
}

/// Outcome of source security validation.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn forbidden_patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"\bos\s*\.", "process and environment access"),
            (r"\bio\s*\.", "filesystem access"),
            (r"\bpackage\s*\.", "module system access"),
            (r"\bdebug\s*\.", "debug library access"),
            (r"\bload\s*\(", "dynamic code loading"),
            (r"\bloadstring\s*\(", "dynamic code loading"),
            (r"\bloadfile\s*\(", "dynamic code loading"),
            (r"\bdofile\s*\(", "dynamic code loading"),
            (r"\bcollectgarbage\s*\(", "garbage collector control"),
        ]
        .into_iter()
        .map(|(pattern, reason)| {
            (Regex::new(pattern).expect("forbidden pattern is valid"), reason)
        })
        .collect()
    })
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).expect("import pattern is valid")
    })
}

fn import_allowed(path: &str) -> bool {
    path == RUNTIME_IMPORT
        || path.starts_with(LIB_IMPORT_PREFIX)
        || path.starts_with(TEMPLATE_IMPORT_PREFIX)
}

/// Check source text for forbidden capabilities and disallowed imports.
///
/// These are rejected at compile time so a template never gets far enough to
/// fail at render time on a capability it was never going to receive.
#[must_use]
pub fn validate_source(source: &str) -> Validation {
    let mut validation = Validation::default();

    for (pattern, reason) in forbidden_patterns() {
        if pattern.is_match(source) {
            validation.errors.push(format!("forbidden pattern detected: {reason}"));
        }
    }

    for caps in import_pattern().captures_iter(source) {
        let path = &caps[1];
        if !import_allowed(path) {
            validation.errors.push(format!(
                "import not allowed: \"{path}\". Only @lib/ modules, @templates/ references, and the runtime are permitted"
            ));
        }
    }

    if source.contains("{@html") {
        validation
            .warnings
            .push("template uses {@html}; output is sanitized before serving".to_string());
    }

    validation
}

/// One parsed markup node.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Text(String),
    /// Escaped interpolation of a Lua expression
    Expr { code: String },
    /// Raw interpolation, no escaping
    Raw { code: String },
    /// Conditional with one or more arms and an optional else branch
    If {
        arms: Vec<(String, Vec<MarkupNode>)>,
        else_arm: Option<Vec<MarkupNode>>,
    },
    /// Iteration over a list expression
    Each {
        list: String,
        binding: String,
        index: Option<String>,
        body: Vec<MarkupNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum MarkupToken {
    Text(String),
    Expr { code: String, line: usize },
    Raw { code: String, line: usize },
    IfOpen { cond: String, line: usize },
    ElseIf { cond: String, line: usize },
    Else { line: usize },
    IfClose { line: usize },
    EachOpen { list: String, binding: String, index: Option<String>, line: usize },
    EachClose { line: usize },
}

/// Find the `}` matching the `{` at `open`, skipping over quoted strings.
fn find_closing_brace(markup: &str, open: usize) -> Option<usize> {
    let bytes = markup.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn line_at(markup: &str, position: usize) -> usize {
    markup[..position].matches('\n').count() + 1
}

fn parse_each_tag(rest: &str, line: usize) -> Result<MarkupToken, CompileError> {
    let Some((list, bindings)) = rest.rsplit_once(" as ") else {
        return Err(CompileError::source("each block requires an 'as' binding", Some(line)));
    };

    let list = list.trim().to_string();
    if list.is_empty() {
        return Err(CompileError::source("each block requires a list expression", Some(line)));
    }

    let mut names = bindings.split(',').map(str::trim);
    let binding = names.next().unwrap_or_default().to_string();
    let index = names.next().map(str::to_string);

    if names.next().is_some() {
        return Err(CompileError::source(
            "each binding accepts at most an item name and an index name",
            Some(line),
        ));
    }
    for name in std::iter::once(&binding).chain(index.iter()) {
        if !ident_pattern().is_match(name) {
            return Err(CompileError::source(
                format!("invalid each binding \"{name}\""),
                Some(line),
            ));
        }
    }

    Ok(MarkupToken::EachOpen {
        list,
        binding,
        index,
        line,
    })
}

fn classify_tag(content: &str, line: usize) -> Result<MarkupToken, CompileError> {
    let content = content.trim();

    if let Some(rest) = content.strip_prefix("#if")
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        let cond = rest.trim();
        if cond.is_empty() {
            return Err(CompileError::source("if block requires a condition", Some(line)));
        }
        return Ok(MarkupToken::IfOpen {
            cond: cond.to_string(),
            line,
        });
    }

    if let Some(rest) = content.strip_prefix("#each")
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        return parse_each_tag(rest.trim(), line);
    }

    if let Some(rest) = content.strip_prefix(":else") {
        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(MarkupToken::Else {
                line,
            });
        }
        if let Some(cond) = rest.strip_prefix("if") {
            let cond = cond.trim();
            if !cond.is_empty() {
                return Ok(MarkupToken::ElseIf {
                    cond: cond.to_string(),
                    line,
                });
            }
        }
        return Err(CompileError::source(
            format!("malformed else tag \"{{{content}}}\""),
            Some(line),
        ));
    }

    if content == "/if" {
        return Ok(MarkupToken::IfClose {
            line,
        });
    }
    if content == "/each" {
        return Ok(MarkupToken::EachClose {
            line,
        });
    }

    if let Some(rest) = content.strip_prefix("@html")
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        let code = rest.trim();
        if code.is_empty() {
            return Err(CompileError::source("@html requires an expression", Some(line)));
        }
        return Ok(MarkupToken::Raw {
            code: code.to_string(),
            line,
        });
    }

    if content.starts_with('#') || content.starts_with('/') || content.starts_with(':') {
        return Err(CompileError::source(
            format!("unknown block tag \"{{{content}}}\""),
            Some(line),
        ));
    }

    if content.is_empty() {
        return Err(CompileError::source("empty expression", Some(line)));
    }

    Ok(MarkupToken::Expr {
        code: content.to_string(),
        line,
    })
}

fn scan_markup(markup: &str) -> Result<Vec<MarkupToken>, CompileError> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = markup[cursor..].find('{') {
        let open = cursor + offset;
        if open > cursor {
            tokens.push(MarkupToken::Text(markup[cursor..open].to_string()));
        }

        let Some(close) = find_closing_brace(markup, open) else {
            return Err(CompileError::source(
                "unclosed expression",
                Some(line_at(markup, open)),
            ));
        };

        tokens.push(classify_tag(&markup[open + 1..close], line_at(markup, open))?);
        cursor = close + 1;
    }

    if cursor < markup.len() {
        tokens.push(MarkupToken::Text(markup[cursor..].to_string()));
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Each,
}

#[derive(Debug, Clone)]
enum Stop {
    ElseIf(String),
    Else,
    IfClose,
    EachClose,
}

/// Parse markup into a node tree, validating block nesting and balance.
pub fn parse_markup(markup: &str) -> Result<Vec<MarkupNode>, CompileError> {
    let tokens = scan_markup(markup)?;
    let mut pos = 0;
    let (nodes, stop) = parse_sequence(&tokens, &mut pos, None)?;
    debug_assert!(stop.is_none() && pos == tokens.len());
    Ok(nodes)
}

fn parse_sequence(
    tokens: &[MarkupToken],
    pos: &mut usize,
    inside: Option<BlockKind>,
) -> Result<(Vec<MarkupNode>, Option<Stop>), CompileError> {
    let mut nodes = Vec::new();

    while *pos < tokens.len() {
        match &tokens[*pos] {
            MarkupToken::Text(text) => {
                nodes.push(MarkupNode::Text(text.clone()));
                *pos += 1;
            }
            MarkupToken::Expr {
                code, ..
            } => {
                nodes.push(MarkupNode::Expr {
                    code: code.clone(),
                });
                *pos += 1;
            }
            MarkupToken::Raw {
                code, ..
            } => {
                nodes.push(MarkupNode::Raw {
                    code: code.clone(),
                });
                *pos += 1;
            }
            MarkupToken::IfOpen {
                cond,
                line,
            } => {
                let (cond, line) = (cond.clone(), *line);
                *pos += 1;
                nodes.push(parse_if(tokens, pos, cond, line)?);
            }
            MarkupToken::EachOpen {
                list,
                binding,
                index,
                line,
            } => {
                let (list, binding, index, line) =
                    (list.clone(), binding.clone(), index.clone(), *line);
                *pos += 1;
                let (body, stop) = parse_sequence(tokens, pos, Some(BlockKind::Each))?;
                match stop {
                    Some(Stop::EachClose) => {
                        *pos += 1;
                        nodes.push(MarkupNode::Each {
                            list,
                            binding,
                            index,
                            body,
                        });
                    }
                    _ => {
                        return Err(CompileError::source("unclosed each block", Some(line)));
                    }
                }
            }
            MarkupToken::ElseIf {
                cond,
                line,
            } => {
                if inside == Some(BlockKind::If) {
                    return Ok((nodes, Some(Stop::ElseIf(cond.clone()))));
                }
                return Err(CompileError::source(
                    "'{:else if}' outside of an if block",
                    Some(*line),
                ));
            }
            MarkupToken::Else {
                line,
            } => {
                if inside == Some(BlockKind::If) {
                    return Ok((nodes, Some(Stop::Else)));
                }
                return Err(CompileError::source(
                    "'{:else}' outside of an if block",
                    Some(*line),
                ));
            }
            MarkupToken::IfClose {
                line,
            } => {
                if inside == Some(BlockKind::If) {
                    return Ok((nodes, Some(Stop::IfClose)));
                }
                return Err(CompileError::source(
                    "'{/if}' without an open if block",
                    Some(*line),
                ));
            }
            MarkupToken::EachClose {
                line,
            } => {
                if inside == Some(BlockKind::Each) {
                    return Ok((nodes, Some(Stop::EachClose)));
                }
                return Err(CompileError::source(
                    "'{/each}' without an open each block",
                    Some(*line),
                ));
            }
        }
    }

    if let Some(kind) = inside {
        let what = match kind {
            BlockKind::If => "if",
            BlockKind::Each => "each",
        };
        return Err(CompileError::source(format!("unclosed {what} block"), None));
    }

    Ok((nodes, None))
}

fn parse_if(
    tokens: &[MarkupToken],
    pos: &mut usize,
    first_cond: String,
    open_line: usize,
) -> Result<MarkupNode, CompileError> {
    let mut arms: Vec<(String, Vec<MarkupNode>)> = Vec::new();
    let mut current_cond = first_cond;

    loop {
        let (body, stop) = parse_sequence(tokens, pos, Some(BlockKind::If))?;
        match stop {
            Some(Stop::ElseIf(cond)) => {
                arms.push((current_cond, body));
                current_cond = cond;
                *pos += 1;
            }
            Some(Stop::Else) => {
                arms.push((current_cond, body));
                *pos += 1;
                let (else_body, else_stop) = parse_sequence(tokens, pos, Some(BlockKind::If))?;
                return match else_stop {
                    Some(Stop::IfClose) => {
                        *pos += 1;
                        Ok(MarkupNode::If {
                            arms,
                            else_arm: Some(else_body),
                        })
                    }
                    Some(Stop::ElseIf(_) | Stop::Else) => Err(CompileError::source(
                        "'{:else}' must be the last branch of an if block",
                        Some(open_line),
                    )),
                    _ => Err(CompileError::source("unclosed if block", Some(open_line))),
                };
            }
            Some(Stop::IfClose) => {
                arms.push((current_cond, body));
                *pos += 1;
                return Ok(MarkupNode::If {
                    arms,
                    else_arm: None,
                });
            }
            _ => return Err(CompileError::source("unclosed if block", Some(open_line))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::{SchemaField, TemplateSchema};

    #[test]
    fn test_split_source_sections() {
        let source = "<script>\nlocal x = 1\n</script>\n<p>{x}</p>\n<style>\np { color: red; }\n</style>";
        let parts = split_source(source);
        assert_eq!(parts.script.as_deref(), Some("\nlocal x = 1\n"));
        assert_eq!(parts.style.as_deref(), Some("\np { color: red; }\n"));
        assert!(parts.markup.contains("<p>{x}</p>"));
        assert!(!parts.markup.contains("<script"));
        assert!(!parts.markup.contains("<style"));
    }

    #[test]
    fn test_split_preserves_line_numbers() {
        let source = "<script>\na\nb\n</script>\n<p>{x}</p>";
        let parts = split_source(source);
        // The expression still sits on line 5 of the original source.
        let open = parts.markup.find('{').unwrap();
        assert_eq!(line_at(&parts.markup, open), 5);
    }

    #[test]
    fn test_normalize_injects_schema_bindings() {
        let schema = TemplateSchema {
            fields: vec![SchemaField {
                key: "title".to_string(),
                field_type: "text".to_string(),
                label: "Title".to_string(),
                required: false,
            }],
        };
        let normalized = normalize_source("<h1>{title}</h1>", &schema);
        assert!(normalized.starts_with("<script>\nlocal title = props.title\n"));

        let untouched = normalize_source("<script>local t = 1</script>", &schema);
        assert!(!untouched.contains("props.title"));
    }

    #[test]
    fn test_validate_source_forbidden_patterns() {
        let validation = validate_source("local t = os.time()");
        assert!(!validation.is_valid());
        assert!(validation.errors[0].contains("process and environment access"));

        assert!(validate_source("local chunk = load(code)").errors.len() == 1);
        assert!(validate_source("<p>plain</p>").is_valid());
    }

    #[test]
    fn test_validate_source_import_whitelist() {
        assert!(validate_source(r#"local rt = require("runtime")"#).is_valid());
        assert!(validate_source(r#"local f = require("@lib/format")"#).is_valid());
        assert!(validate_source(r#"local h = require("@templates/hero")"#).is_valid());

        let validation = validate_source(r#"local socket = require("socket")"#);
        assert!(!validation.is_valid());
        assert!(validation.errors[0].contains("socket"));
    }

    #[test]
    fn test_parse_plain_markup() {
        let nodes = parse_markup("<p>hello</p>").unwrap();
        assert_eq!(nodes, vec![MarkupNode::Text("<p>hello</p>".to_string())]);
    }

    #[test]
    fn test_parse_expressions() {
        let nodes = parse_markup("<h1>{title}</h1>{@html body}").unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[1], MarkupNode::Expr {
            code: "title".to_string(),
        });
        assert_eq!(nodes[3], MarkupNode::Raw {
            code: "body".to_string(),
        });
    }

    #[test]
    fn test_expression_with_table_literal() {
        let nodes = parse_markup(r#"{@html hero({ title = "big" })}"#).unwrap();
        assert_eq!(nodes, vec![MarkupNode::Raw {
            code: r#"hero({ title = "big" })"#.to_string(),
        }]);
    }

    #[test]
    fn test_string_with_brace_inside_expression() {
        let nodes = parse_markup(r#"{greet("{name}")}"#).unwrap();
        assert_eq!(nodes, vec![MarkupNode::Expr {
            code: r#"greet("{name}")"#.to_string(),
        }]);
    }

    #[test]
    fn test_parse_if_chain() {
        let nodes =
            parse_markup("{#if a}A{:else if b}B{:else}C{/if}").unwrap();
        let MarkupNode::If {
            arms,
            else_arm,
        } = &nodes[0]
        else {
            panic!("expected if node");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].0, "a");
        assert_eq!(arms[1].0, "b");
        assert_eq!(else_arm.as_ref().unwrap(), &vec![MarkupNode::Text("C".to_string())]);
    }

    #[test]
    fn test_parse_each_with_index() {
        let nodes = parse_markup("{#each items as item, i}<li>{item}</li>{/each}").unwrap();
        let MarkupNode::Each {
            list,
            binding,
            index,
            body,
        } = &nodes[0]
        else {
            panic!("expected each node");
        };
        assert_eq!(list, "items");
        assert_eq!(binding, "item");
        assert_eq!(index.as_deref(), Some("i"));
        assert_eq!(body.len(), 3);
    }

    #[test]
    fn test_nested_blocks() {
        let nodes =
            parse_markup("{#each rows as row}{#if row.ok}{row.label}{/if}{/each}").unwrap();
        let MarkupNode::Each {
            body, ..
        } = &nodes[0]
        else {
            panic!("expected each node");
        };
        assert!(matches!(body[0], MarkupNode::If { .. }));
    }

    #[test]
    fn test_unbalanced_blocks_error_with_line() {
        let err = parse_markup("line one\n{#if a}\nnever closed").unwrap_err();
        let CompileError::Source {
            line, ..
        } = err
        else {
            panic!("expected source error");
        };
        assert_eq!(line, Some(2));

        assert!(parse_markup("{/if}").is_err());
        assert!(parse_markup("{#each items as item}{/if}").is_err());
        assert!(parse_markup("{:else}").is_err());
    }

    #[test]
    fn test_unclosed_expression_errors() {
        let err = parse_markup("<p>{title</p>").unwrap_err();
        assert!(err.to_string().contains("unclosed expression"));
    }

    #[test]
    fn test_each_requires_as_binding() {
        let err = parse_markup("{#each items}{/each}").unwrap_err();
        assert!(err.to_string().contains("'as' binding"));
    }
}
