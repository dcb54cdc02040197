//! Outbound send requests and their reported outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::USER_SERVER;
use crate::error::{SendError, SendResult};

/// A transport-level address (`34600111222@s.whatsapp.net`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Normalizes a caller-supplied address into transport format.
    ///
    /// Addresses that already name a server are kept verbatim. Otherwise only
    /// the digits are kept and the person-to-person server is appended.
    pub fn from_address(address: &str) -> SendResult<Self> {
        let trimmed = address.trim();
        if trimmed.contains('@') {
            return Ok(Self(trimmed.to_string()));
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(SendError::InvalidAddress(address.to_string()));
        }
        Ok(Self(format!("{digits}{USER_SERVER}")))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Recipient address, in any format [`Jid::from_address`] accepts.
    pub to_address: String,
    /// Text body.
    pub text: String,
    /// Whether to show a typing indicator before sending.
    #[serde(default = "default_simulate_typing")]
    pub simulate_typing: bool,
}

fn default_simulate_typing() -> bool {
    true
}

impl OutboundRequest {
    /// Creates a request with the default typing simulation.
    pub fn new(to_address: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to_address: to_address.into(),
            text: text.into(),
            simulate_typing: true,
        }
    }
}

/// A bulk-send recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Recipient address.
    #[serde(alias = "to_address")]
    pub phone_number: String,
    /// Optional name, echoed back in the per-recipient result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Recipient {
    /// Creates a recipient without a name.
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            name: None,
        }
    }
}

/// Outcome of a single send as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    /// Whether the transport acknowledged the message.
    pub success: bool,
    /// Failure description, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendReport {
    /// A successful send.
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
}

impl From<&SendResult<()>> for SendReport {
    fn from(result: &SendResult<()>) -> Self {
        match result {
            Ok(()) => Self::sent(),
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Per-recipient line of a [`BulkReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientReport {
    /// Address as the caller supplied it.
    pub phone_number: String,
    /// Name as the caller supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Send outcome.
    #[serde(flatten)]
    pub report: SendReport,
}

/// Aggregate outcome of a bulk send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Number of recipients requested.
    pub total: usize,
    /// Number of acknowledged sends.
    pub sent: usize,
    /// Number of failed sends.
    pub failed: usize,
    /// One entry per recipient, in request order.
    pub results: Vec<RecipientReport>,
}

impl BulkReport {
    /// Creates an empty report sized for `total` recipients.
    pub fn with_capacity(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
            ..Default::default()
        }
    }

    /// Records the outcome for one recipient.
    pub fn record(&mut self, recipient: &Recipient, result: &SendResult<()>) {
        let report = SendReport::from(result);
        if report.success {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(RecipientReport {
            phone_number: recipient.phone_number.clone(),
            name: recipient.name.clone(),
            report,
        });
    }

    /// Recipients whose send failed.
    pub fn failures(&self) -> impl Iterator<Item = &RecipientReport> {
        self.results.iter().filter(|r| !r.report.success)
    }
}
