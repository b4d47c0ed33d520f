//! Notification templates.
//!
//! Templates are configuration: they are registered at startup (built-ins plus
//! whatever the config file declares) and rendered per channel when a rule
//! expands an event into jobs.

pub mod builtin;
mod registry;

pub use registry::{ChannelContent, NotificationTemplate, RenderedContent, TemplateRegistry};
