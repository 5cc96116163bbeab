// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Ticket record and the HTTP ticket sink.
//!
//! One ticket is filed per call, at most once (the session's idempotency
//! guard flips before the POST result is known and is never rolled back).
//! Delivery is a single bounded POST; non-2xx and network failures are
//! logged and not retried.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::services::{AdapterError, TicketSink};

/// Ticket sink request timeout.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(8);

// ---------------------------------------------------------------------------
// Closed classification vocabulary
// ---------------------------------------------------------------------------

/// Ticket category, closed vocabulary.
///
/// Classifier output that doesn't match one of these falls back to
/// [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PortalAccess,
    ItSupport,
    Payroll,
    Hr,
    Billing,
    Other,
}

impl Category {
    /// All category labels, for prompt construction.
    pub const ALL: [Category; 6] = [
        Category::PortalAccess,
        Category::ItSupport,
        Category::Payroll,
        Category::Hr,
        Category::Billing,
        Category::Other,
    ];

    /// Parse a label, case-insensitively. Returns `None` when out of
    /// vocabulary.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "portal_access" => Some(Category::PortalAccess),
            "it_support" => Some(Category::ItSupport),
            "payroll" => Some(Category::Payroll),
            "hr" => Some(Category::Hr),
            "billing" => Some(Category::Billing),
            "other" => Some(Category::Other),
            _ => None,
        }
    }

    /// The wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PortalAccess => "portal_access",
            Category::ItSupport => "it_support",
            Category::Payroll => "payroll",
            Category::Hr => "hr",
            Category::Billing => "billing",
            Category::Other => "other",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket urgency, closed vocabulary. Falls back to [`Urgency::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    /// All urgency labels, for prompt construction.
    pub const ALL: [Urgency; 4] = [Urgency::Low, Urgency::Normal, Urgency::High, Urgency::Urgent];

    /// Parse a label, case-insensitively. Returns `None` when out of
    /// vocabulary.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "normal" => Some(Urgency::Normal),
            "high" => Some(Urgency::High),
            "urgent" => Some(Urgency::Urgent),
            _ => None,
        }
    }

    /// The wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Urgent => "urgent",
        }
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Normal
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Ticket record
// ---------------------------------------------------------------------------

/// The record POSTed to the ticket sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub name: String,
    pub phone: String,
    pub category: Category,
    pub urgency: Urgency,
    #[serde(rename = "reasonText")]
    pub reason_text: String,
}

// ---------------------------------------------------------------------------
// HTTP sink
// ---------------------------------------------------------------------------

/// Ticket sink backed by a plain HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTicketSink {
    url: String,
    client: reqwest::Client,
}

impl HttpTicketSink {
    /// Create a sink posting to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(SUBMIT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TicketSink for HttpTicketSink {
    async fn submit(&self, ticket: &Ticket) -> Result<(), AdapterError> {
        let response = self.client.post(&self.url).json(ticket).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Responder(format!(
                "ticket sink returned {status}: {body}"
            )));
        }

        tracing::info!(
            category = %ticket.category,
            urgency = %ticket.urgency,
            "ticket submitted"
        );
        Ok(())
    }
}

/// Sink used when no webhook URL is configured: the ticket is only logged.
#[derive(Debug, Clone, Default)]
pub struct LoggingTicketSink;

#[async_trait]
impl TicketSink for LoggingTicketSink {
    async fn submit(&self, ticket: &Ticket) -> Result<(), AdapterError> {
        tracing::info!(
            name = %ticket.name,
            category = %ticket.category,
            urgency = %ticket.urgency,
            reason = %ticket.reason_text,
            "ticket sink disabled; ticket logged only"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_known() {
        assert_eq!(Category::parse("portal_access"), Some(Category::PortalAccess));
        assert_eq!(Category::parse("  IT_SUPPORT  "), Some(Category::ItSupport));
        assert_eq!(Category::parse("payroll"), Some(Category::Payroll));
    }

    #[test]
    fn test_category_parse_out_of_vocabulary() {
        assert_eq!(Category::parse("contraseñas"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn test_urgency_parse() {
        assert_eq!(Urgency::parse("HIGH"), Some(Urgency::High));
        assert_eq!(Urgency::parse("inmediata"), None);
    }

    #[test]
    fn test_ticket_wire_shape() {
        let ticket = Ticket {
            name: "Juan Pérez".to_string(),
            phone: "+34600111222".to_string(),
            category: Category::PortalAccess,
            urgency: Urgency::High,
            reason_text: "no puedo acceder al portal".to_string(),
        };

        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["name"], "Juan Pérez");
        assert_eq!(json["category"], "portal_access");
        assert_eq!(json["urgency"], "high");
        assert_eq!(json["reasonText"], "no puedo acceder al portal");
    }

    #[test]
    fn test_labels_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        for urgency in Urgency::ALL {
            assert_eq!(Urgency::parse(urgency.as_str()), Some(urgency));
        }
    }
}
