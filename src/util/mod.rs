//! Utility functions shared by the transport and the terminal surface.
//!
//! - **Server URL validation**: HTTPS enforcement with a loopback exception
//! - **Text processing**: Unicode-aware width, truncation, wrapping and
//!   control-character stripping for untrusted feed text

mod text;
mod url_validator;

pub use text::{display_width, strip_control_chars, truncate_to_width, wrap_to_width};
pub use url_validator::{is_loopback_host, validate_server_url, UrlValidationError};
