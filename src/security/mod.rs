//! Turn-boundary text policies.
//!
//! * [`sanitize_input`] — reject finalised user input that tries to override
//!   the model's instructions.
//! * [`Redactor`] — replace sensitive patterns in model output when privacy
//!   mode is on.

pub mod redact;
pub mod sanitize;

pub use redact::{Redactor, API_KEY_PLACEHOLDER, CARD_PLACEHOLDER, EMAIL_PLACEHOLDER, PHONE_PLACEHOLDER};
pub use sanitize::{sanitize_input, SecurityRejection, SECURITY_WARNING};
