//! Holding and status records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::namespace::{self, Namespaced};

/// Message carried by placeholder records when a backend lookup fails
pub const STATUS_ERROR_MESSAGE: &str = "An error has occurred";

/// Availability, location and call number of one item of a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Bibliographic record id
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default)]
    pub availability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callnumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duedate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    /// Set on placeholder records standing in for a failed lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Holding {
    /// Placeholder for a record whose backend could not answer
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Namespaced for Holding {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        namespace::add_field("id", &mut self.id, source, fields);
        if let Some(item_id) = self.item_id.as_mut() {
            namespace::add_field("item_id", item_id, source, fields);
        }
        namespace::add_map_prefixes(&mut self.extra, source, fields);
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        namespace::strip_field("id", &mut self.id, source, fields);
        if let Some(item_id) = self.item_id.as_mut() {
            namespace::strip_field("item_id", item_id, source, fields);
        }
        namespace::strip_map_prefixes(&mut self.extra, source, fields, ignore);
    }
}
