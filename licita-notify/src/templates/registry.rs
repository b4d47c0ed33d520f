//! Template definitions and the registry that renders them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use notify_template::Template;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::Channel;
use crate::{Error, Result};

/// Subject and body sources for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

impl ChannelContent {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A named template with per-channel variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channels: BTreeMap<Channel, ChannelContent>,
    /// Used for channels without their own variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ChannelContent>,
    /// Declared variables. Registration warns about placeholders not listed here.
    #[serde(default)]
    pub variables: Vec<String>,
}

impl NotificationTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            channels: BTreeMap::new(),
            default: None,
            variables: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Channel, content: ChannelContent) -> Self {
        self.channels.insert(channel, content);
        self
    }

    pub fn with_default(mut self, content: ChannelContent) -> Self {
        self.default = Some(content);
        self
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }
}

/// Output of rendering a template for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub content: String,
}

#[derive(Debug)]
struct CompiledContent {
    subject: Option<Template>,
    body: Template,
}

impl CompiledContent {
    fn compile(content: &ChannelContent) -> Self {
        Self {
            subject: content.subject.as_deref().map(Template::parse),
            body: Template::parse(&content.body),
        }
    }

    fn render(&self, vars: &Value) -> RenderedContent {
        RenderedContent {
            subject: self.subject.as_ref().map(|t| t.render(vars)),
            content: self.body.render(vars),
        }
    }
}

#[derive(Debug)]
struct CompiledTemplate {
    source: NotificationTemplate,
    channels: BTreeMap<Channel, CompiledContent>,
    default: Option<CompiledContent>,
}

impl CompiledTemplate {
    /// Placeholder keys used by any variant but absent from the declared list.
    /// Dotted keys are checked by their first segment. Empty when nothing is declared.
    fn undeclared_variables(&self) -> Vec<String> {
        if self.source.variables.is_empty() {
            return Vec::new();
        }
        let mut undeclared: Vec<String> = Vec::new();
        let contents = self.channels.values().chain(self.default.as_ref());
        for content in contents {
            let parsed = content.subject.iter().chain(std::iter::once(&content.body));
            for key in parsed.flat_map(Template::variables) {
                let root = key.split('.').next().unwrap_or(key);
                if !self.source.variables.iter().any(|v| v == root)
                    && !undeclared.iter().any(|u| u == key)
                {
                    undeclared.push(key.to_string());
                }
            }
        }
        undeclared
    }

    fn compile(source: NotificationTemplate) -> Self {
        let channels = source
            .channels
            .iter()
            .map(|(channel, content)| (*channel, CompiledContent::compile(content)))
            .collect();
        let default = source.default.as_ref().map(CompiledContent::compile);
        Self {
            source,
            channels,
            default,
        }
    }
}

/// Registered templates keyed by id.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in procurement templates.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for template in super::builtin::builtin_templates() {
            // Built-ins have distinct non-empty ids.
            let _ = registry.register(template);
        }
        registry
    }

    /// Add or replace a template. Sources are parsed once here.
    pub fn register(&self, template: NotificationTemplate) -> Result<()> {
        if template.id.trim().is_empty() {
            return Err(Error::validation("Template id must not be empty"));
        }
        if template.channels.is_empty() && template.default.is_none() {
            return Err(Error::validation(format!(
                "Template {} defines no content",
                template.id
            )));
        }
        let id = template.id.clone();
        let compiled = CompiledTemplate::compile(template);
        let undeclared = compiled.undeclared_variables();
        if !undeclared.is_empty() {
            warn!(template_id = %id, ?undeclared, "Template uses undeclared variables");
        }
        self.templates.write().insert(id, Arc::new(compiled));
        Ok(())
    }

    /// Placeholders template `id` uses without declaring them.
    pub fn undeclared_variables(&self, id: &str) -> Option<Vec<String>> {
        self.templates
            .read()
            .get(id)
            .map(|t| t.undeclared_variables())
    }

    pub fn remove(&self, id: &str) -> Option<NotificationTemplate> {
        self.templates.write().remove(id).map(|t| t.source.clone())
    }

    pub fn get(&self, id: &str) -> Option<NotificationTemplate> {
        self.templates.read().get(id).map(|t| t.source.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.read().contains_key(id)
    }

    /// Registered template ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Render template `id` for `channel`, falling back to its default variant.
    pub fn render(&self, id: &str, channel: Channel, vars: &Value) -> Result<RenderedContent> {
        let template = self
            .templates
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::validation(format!("Unknown template: {}", id)))?;

        let content = template
            .channels
            .get(&channel)
            .or(template.default.as_ref())
            .ok_or_else(|| {
                Error::validation(format!("Template {} has no content for channel {}", id, channel))
            })?;
        Ok(content.render(vars))
    }
}
