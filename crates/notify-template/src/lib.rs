//! # Notify Template
//!
//! A deliberately small template language for notification content.
//!
//! ## Syntax
//!
//! - `{{key}}` is replaced with the value of `key` from the variable map.
//!   Dotted keys (`{{opportunity.title}}`) walk nested objects. A key that is
//!   not present is left in the output verbatim, so a missing variable is
//!   visible in the delivered message instead of silently blanked.
//! - `{{#if key}}...{{/if}}` keeps its inner content when `key` is truthy and
//!   drops the whole block otherwise. Blocks do not nest and there is no
//!   `else` or loop construct.
//!
//! Anything that does not parse as one of the above is kept as literal text.
//! Parsing never fails and rendering is pure: the same template and variables
//! always produce the same bytes.
//!
//! ```
//! use notify_template::Template;
//! use serde_json::json;
//!
//! let tpl = Template::parse("Hello {{name}}{{#if urgent}} (urgent){{/if}}");
//! assert_eq!(tpl.render(&json!({"name": "Ana", "urgent": true})), "Hello Ana (urgent)");
//! assert_eq!(tpl.render(&json!({})), "Hello {{name}}");
//! ```

mod parser;
mod value;

pub use parser::{Template, Token};
pub use value::{is_truthy, lookup, stringify};

use serde_json::Value;

/// Parse and render `source` in one step.
pub fn render(source: &str, vars: &Value) -> String {
    Template::parse(source).render(vars)
}
