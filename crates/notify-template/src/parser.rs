//! Template tokenizer.
//!
//! The source is scanned once into a flat token list. Conditional blocks hold
//! their own inline tokens (text and variables only).

use serde_json::Value;

use crate::value::{is_truthy, lookup, stringify};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const IF_KEYWORD: &str = "#if";
const END_IF: &str = "{{/if}}";

/// A parsed template fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, emitted unchanged.
    Text(String),
    /// `{{key}}` placeholder. `raw` is the exact source text, re-emitted when
    /// the key is missing.
    Variable { key: String, raw: String },
    /// `{{#if key}}...{{/if}}` block. The body never contains another block.
    Conditional { key: String, body: Vec<Token> },
}

/// A parsed template, reusable across renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    tokens: Vec<Token>,
}

enum Tag<'a> {
    Variable(&'a str),
    If(&'a str),
    Literal,
}

impl Template {
    /// Parse a template source. Never fails; unrecognised markup is text.
    pub fn parse(source: &str) -> Self {
        Self {
            tokens: scan(source, true),
        }
    }

    /// The parsed tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Keys referenced by the template, in first-use order, without duplicates.
    pub fn variables(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        collect_keys(&self.tokens, &mut keys);
        keys
    }

    /// Render against a variable map (normally a JSON object).
    pub fn render(&self, vars: &Value) -> String {
        let mut out = String::new();
        render_tokens(&self.tokens, vars, &mut out);
        out
    }
}

fn scan(source: &str, allow_blocks: bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let raw_len = OPEN.len() + end + CLOSE.len();

        match classify(&after_open[..end]) {
            Tag::Variable(key) => {
                text.push_str(&rest[..start]);
                flush_text(&mut text, &mut tokens);
                tokens.push(Token::Variable {
                    key: key.to_string(),
                    raw: rest[start..start + raw_len].to_string(),
                });
                rest = &rest[start + raw_len..];
            }
            Tag::If(key) if allow_blocks => {
                let body_src = &rest[start + raw_len..];
                match body_src.find(END_IF) {
                    Some(close) => {
                        text.push_str(&rest[..start]);
                        flush_text(&mut text, &mut tokens);
                        tokens.push(Token::Conditional {
                            key: key.to_string(),
                            body: scan(&body_src[..close], false),
                        });
                        rest = &body_src[close + END_IF.len()..];
                    }
                    None => {
                        // Unclosed block.
                        text.push_str(&rest[..start + raw_len]);
                        rest = body_src;
                    }
                }
            }
            _ => {
                // Step over a single brace so `{{{key}}}` still finds `{{key}}`.
                text.push_str(&rest[..start + 1]);
                rest = &rest[start + 1..];
            }
        }
    }

    text.push_str(rest);
    flush_text(&mut text, &mut tokens);
    tokens
}

fn classify(inner: &str) -> Tag<'_> {
    let trimmed = inner.trim();
    if let Some(after) = trimmed.strip_prefix(IF_KEYWORD) {
        if after.starts_with(char::is_whitespace) {
            let key = after.trim();
            if is_valid_key(key) {
                return Tag::If(key);
            }
        }
        return Tag::Literal;
    }
    if is_valid_key(trimmed) {
        Tag::Variable(trimmed)
    } else {
        Tag::Literal
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn flush_text(text: &mut String, tokens: &mut Vec<Token>) {
    if !text.is_empty() {
        tokens.push(Token::Text(std::mem::take(text)));
    }
}

fn collect_keys<'a>(tokens: &'a [Token], keys: &mut Vec<&'a str>) {
    for token in tokens {
        match token {
            Token::Text(_) => {}
            Token::Variable { key, .. } => {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
            Token::Conditional { key, body } => {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
                collect_keys(body, keys);
            }
        }
    }
}

fn render_tokens(tokens: &[Token], vars: &Value, out: &mut String) {
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Variable { key, raw } => match lookup(vars, key) {
                Some(value) => out.push_str(&stringify(value)),
                None => out.push_str(raw),
            },
            Token::Conditional { key, body } => {
                if lookup(vars, key).is_some_and(is_truthy) {
                    render_tokens(body, vars, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_plain_text_is_single_token() {
        let tpl = Template::parse("no placeholders here");
        assert_eq!(tpl.tokens(), &[Token::Text("no placeholders here".into())]);
    }

    #[test]
    fn test_variable_replacement() {
        let tpl = Template::parse("Edital {{number}} - {{organ}}");
        let out = tpl.render(&json!({"number": 42, "organ": "Prefeitura"}));
        assert_eq!(out, "Edital 42 - Prefeitura");
    }

    #[test]
    fn test_missing_variable_left_verbatim() {
        let tpl = Template::parse("Olá {{ name }}, prazo {{deadline}}");
        let out = tpl.render(&json!({"deadline": "10/10"}));
        assert_eq!(out, "Olá {{ name }}, prazo 10/10");
    }

    #[test]
    fn test_dotted_keys_walk_objects() {
        let tpl = Template::parse("{{opportunity.title}} / {{items.1}}");
        let out = tpl.render(&json!({
            "opportunity": {"title": "Pregão 12"},
            "items": ["a", "b"]
        }));
        assert_eq!(out, "Pregão 12 / b");
    }

    #[test]
    fn test_flat_key_with_dot_takes_precedence() {
        let tpl = Template::parse("{{a.b}}");
        let out = tpl.render(&json!({"a.b": "flat", "a": {"b": "nested"}}));
        assert_eq!(out, "flat");
    }

    #[rstest]
    #[case(json!(true), "[ME]")]
    #[case(json!(1), "[ME]")]
    #[case(json!("yes"), "[ME]")]
    #[case(json!([]), "[ME]")]
    #[case(json!(false), "")]
    #[case(json!(0), "")]
    #[case(json!(""), "")]
    #[case(json!(null), "")]
    fn test_conditional_truthiness(#[case] flag: Value, #[case] expected: &str) {
        let tpl = Template::parse("{{#if me}}[ME]{{/if}}");
        assert_eq!(tpl.render(&json!({ "me": flag })), expected);
    }

    #[test]
    fn test_conditional_missing_key_removes_block() {
        let tpl = Template::parse("a{{#if flag}} b {{/if}}c");
        assert_eq!(tpl.render(&json!({})), "ac");
    }

    #[test]
    fn test_conditional_body_renders_variables() {
        let tpl = Template::parse("{{#if value}}Valor: R$ {{value}}{{/if}}");
        assert_eq!(tpl.render(&json!({"value": 1500.5})), "Valor: R$ 1500.5");
    }

    #[test]
    fn test_unclosed_block_is_literal() {
        let tpl = Template::parse("x {{#if flag}} y");
        assert_eq!(tpl.render(&json!({"flag": true})), "x {{#if flag}} y");
    }

    #[test]
    fn test_stray_end_if_is_literal() {
        let tpl = Template::parse("x {{/if}} y");
        assert_eq!(tpl.render(&json!({})), "x {{/if}} y");
    }

    #[test]
    fn test_nested_if_is_not_supported() {
        // The inner opener is plain text; the first `{{/if}}` closes the outer block.
        let tpl = Template::parse("{{#if a}}A{{#if b}}B{{/if}}C{{/if}}");
        assert_eq!(tpl.render(&json!({"a": true, "b": false})), "A{{#if b}}BC{{/if}}");
        assert_eq!(tpl.render(&json!({"a": false})), "C{{/if}}");
    }

    #[test]
    fn test_extra_braces_keep_inner_placeholder() {
        let tpl = Template::parse("{{{name}}}");
        assert_eq!(tpl.render(&json!({"name": "X"})), "{X}");
    }

    #[test]
    fn test_value_containing_markup_is_not_reparsed() {
        let tpl = Template::parse("{{a}}");
        let out = tpl.render(&json!({"a": "{{#if b}}x{{/if}}", "b": true}));
        assert_eq!(out, "{{#if b}}x{{/if}}");
    }

    #[test]
    fn test_variables_are_collected_once() {
        let tpl = Template::parse("{{a}} {{#if b}}{{a}} {{c}}{{/if}}");
        assert_eq!(tpl.variables(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let tpl = Template::parse("{{a}} {{missing}} {{#if b}}{{c}}{{/if}}");
        let vars = json!({"a": 1, "b": "x", "c": [1, 2]});
        let first = tpl.render(&vars);
        let second = tpl.render(&vars);
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first, "1 {{missing}} 1, 2");
    }

    #[test]
    fn test_multibyte_text_around_tags() {
        let tpl = Template::parse("🏢 {{title}} — ✅");
        assert_eq!(tpl.render(&json!({"title": "Licitação"})), "🏢 Licitação — ✅");
    }
}
