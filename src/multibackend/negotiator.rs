//! Per-call capability negotiation

use serde_json::Value;

use crate::drivers::{Driver, Method};

/// Whether `driver` can perform `method` for these parameters.
///
/// The driver's own predicate is authoritative when it answers; otherwise
/// the operation must be part of its declared contract.
pub fn driver_supports_method(driver: &dyn Driver, method: Method, params: &Value) -> bool {
    driver
        .supports_method(method, params)
        .unwrap_or_else(|| driver.capabilities().contains(&method))
}
