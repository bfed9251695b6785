//! Data models exchanged between the gateway and its drivers

pub mod holding;
pub mod patron;
pub mod request;

// Re-export commonly used types
pub use holding::{Holding, STATUS_ERROR_MESSAGE};
pub use patron::Patron;
pub use request::{
    ActionResult, CancelDetails, ItemBatch, PasswordChange, RenewDetails, RequestDetails,
    RequestValidity,
};
