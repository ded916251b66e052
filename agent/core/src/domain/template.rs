// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Template rendering port used for templated files and secret reference names.

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template syntax error: {0}")]
    Syntax(String),

    #[error("Template render error: {0}")]
    Render(String),
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, TemplateError>;
}
