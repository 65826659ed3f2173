// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message body templating.
//!
//! Outbound bodies may reference the recipient, e.g. `Hi {{firstName}}`.
//! Available variables: `name`, `firstName`, `number`, `greeting`,
//! `ticketId`. Unknown variables render empty; a body that fails to parse
//! is sent as written.

use chrono::Timelike;
use handlebars::Handlebars;
use serde_json::json;
use tracing::warn;

use zapdesk_core::types::Contact;

pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    pub fn render(&self, body: &str, contact: &Contact, ticket_id: Option<&str>) -> String {
        self.render_at(body, contact, ticket_id, chrono::Local::now().hour())
    }

    fn render_at(&self, body: &str, contact: &Contact, ticket_id: Option<&str>, hour: u32) -> String {
        if !body.contains("{{") {
            return body.to_string();
        }
        let first_name = contact.name.split_whitespace().next().unwrap_or_default();
        let ctx = json!({
            "name": contact.name,
            "firstName": first_name,
            "number": contact.address,
            "greeting": greeting(hour),
            "ticketId": ticket_id.unwrap_or_default(),
        });
        match self.registry.render_template(body, &ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(contact_id = %contact.id, error = %e, "template failed to render, sending verbatim");
                body.to_string()
            }
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    }
}
