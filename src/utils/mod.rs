pub mod auth;
pub mod security;
pub mod url_builder;

pub use auth::load_credential_from_env;
pub use security::{create_safe_error_message, redact_sensitive_content};
pub use url_builder::UrlBuilder;
