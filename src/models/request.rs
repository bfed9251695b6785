//! Request, cancellation and renewal payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::patron::Patron;
use crate::namespace::{self, Namespaced};

/// Details of a hold, storage retrieval or ILL request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    /// Bibliographic record id
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub patron: Patron,
    /// Request parameters (pickup location, comment, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestDetails {
    pub fn new(id: impl Into<String>, patron: Patron) -> Self {
        Self {
            id: id.into(),
            patron,
            ..Default::default()
        }
    }

    /// Look up a request parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

impl Namespaced for RequestDetails {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        namespace::add_field("id", &mut self.id, source, fields);
        if let Some(item_id) = self.item_id.as_mut() {
            namespace::add_field("item_id", item_id, source, fields);
        }
        self.patron.add_prefixes(source, fields);
        namespace::add_map_prefixes(&mut self.extra, source, fields);
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        namespace::strip_field("id", &mut self.id, source, fields);
        if let Some(item_id) = self.item_id.as_mut() {
            namespace::strip_field("item_id", item_id, source, fields);
        }
        if !ignore.contains(&"patron") {
            self.patron.strip_prefixes(source, fields, &[]);
        }
        namespace::strip_map_prefixes(&mut self.extra, source, fields, ignore);
    }
}

/// Batch of driver-specific item references acted on for one patron
///
/// `details` holds the opaque strings produced by the driver's
/// `get_cancel_*_details` / `get_renew_details` operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemBatch {
    #[serde(default)]
    pub details: Vec<String>,
    pub patron: Patron,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type CancelDetails = ItemBatch;
pub type RenewDetails = ItemBatch;

impl ItemBatch {
    pub fn new(patron: Patron, details: Vec<String>) -> Self {
        Self {
            details,
            patron,
            extra: Map::new(),
        }
    }
}

impl Namespaced for ItemBatch {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        self.patron.add_prefixes(source, fields);
        namespace::add_map_prefixes(&mut self.extra, source, fields);
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        if !ignore.contains(&"patron") {
            self.patron.strip_prefixes(source, fields, &[]);
        }
        namespace::strip_map_prefixes(&mut self.extra, source, fields, ignore);
    }
}

/// Password (PIN) change for a patron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub patron: Patron,
    pub old_password: String,
    pub new_password: String,
}

impl Namespaced for PasswordChange {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        self.patron.add_prefixes(source, fields);
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        if !ignore.contains(&"patron") {
            self.patron.strip_prefixes(source, fields, &[]);
        }
    }
}

/// Outcome of a mutating request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(rename = "sysMessage", default, skip_serializing_if = "Option::is_none")]
    pub sys_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            sys_message: Some(message.into()),
            extra: Map::new(),
        }
    }
}

/// Whether a request may be placed, with an optional status message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestValidity {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RequestValidity {
    pub fn valid() -> Self {
        Self {
            valid: true,
            status: None,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}
