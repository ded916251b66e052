// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! File Template Engine
//!
//! Renders templated managed files and secret reference names with
//! Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn `{{node.labels.x}}`-style templates into file content
//!
//! # Context
//!
//! - `{{node.labels.<key>}}` - labels of the ManagedNode
//! - `{{node.secrets.<key>}}` - merged data of the file's Secret references
//! - `{{node.config_maps.<key>}}` - merged data of the file's ConfigMap references
//!
//! Label keys containing `/` or `.` are reached with segment literals, e.g.
//! `{{node.labels.[kubernetes.io/hostname]}}`.

use handlebars::Handlebars;

use crate::domain::template::{TemplateError, TemplateRenderer};

// ============================================================================
// Template Engine
// ============================================================================

pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // Missing variables render empty
        handlebars.set_strict_mode(false);
        // Config files are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<(), TemplateError> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .map_err(|e| TemplateError::Syntax(e.to_string()))
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, TemplateError> {
        self.validate_template(template)?;
        self.handlebars
            .render_template(template, context)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}
