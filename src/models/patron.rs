//! Patron model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::namespace::{self, Namespaced};

/// Patron record as returned by a driver's login
///
/// `cat_username` is a composite identifier at the gateway boundary; its
/// source decides which backend owns the patron.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patron {
    #[serde(default)]
    pub id: String,
    pub cat_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Backend-specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patron {
    pub fn new(id: impl Into<String>, cat_username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cat_username: cat_username.into(),
            ..Default::default()
        }
    }

    /// Source owning this patron, empty when the username is unscoped
    pub fn source(&self) -> &str {
        namespace::parse_source(&self.cat_username)
    }
}

impl Namespaced for Patron {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        namespace::add_field("id", &mut self.id, source, fields);
        namespace::add_field("cat_username", &mut self.cat_username, source, fields);
        namespace::add_map_prefixes(&mut self.extra, source, fields);
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        namespace::strip_field("id", &mut self.id, source, fields);
        namespace::strip_field("cat_username", &mut self.cat_username, source, fields);
        namespace::strip_map_prefixes(&mut self.extra, source, fields, ignore);
    }
}
