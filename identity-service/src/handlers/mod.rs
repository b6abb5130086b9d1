//! HTTP handlers for the identity service.

pub mod passkey;
pub mod password_reset;
pub mod registration;
pub mod token;
pub mod user;
pub mod well_known;
