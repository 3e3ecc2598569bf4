//! Convenience loaders for credential material from the environment.
//! Generalizes the teacher's `load_api_key_from_env` to the three
//! credential kinds this crate's [`crate::token::Credential`] supports.
//! Configuration *loading* (files, env frameworks) stays out of scope
//! per spec.md; this is a thin, optional convenience, not a config layer.

use std::env;

use crate::error::{Error, Result};
use crate::token::{Credential, SecretString};

/// Which credential shape to assemble from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Basic,
    OAuth2ClientCredentials,
}

/// Reads `REST_CLIENT_{USERNAME,PASSWORD}` for [`CredentialKind::Basic`]
/// or `REST_CLIENT_{CLIENT_ID,CLIENT_SECRET,SCOPE}` for
/// [`CredentialKind::OAuth2ClientCredentials`].
pub fn load_credential_from_env(kind: CredentialKind) -> Result<Credential> {
    match kind {
        CredentialKind::Basic => {
            let username = non_empty_env("REST_CLIENT_USERNAME")?;
            let password = non_empty_env("REST_CLIENT_PASSWORD")?;
            Ok(Credential::Basic { username, password: SecretString::new(password) })
        }
        CredentialKind::OAuth2ClientCredentials => {
            let client_id = non_empty_env("REST_CLIENT_CLIENT_ID")?;
            let client_secret = non_empty_env("REST_CLIENT_CLIENT_SECRET")?;
            let scope = env::var("REST_CLIENT_SCOPE").ok().filter(|s| !s.trim().is_empty());
            Ok(Credential::OAuth2ClientCredentials {
                client_id,
                client_secret: SecretString::new(client_secret),
                scope,
            })
        }
    }
}

fn non_empty_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::ConfigurationError(format!("environment variable {name} is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn basic_credential_loads_from_env() {
        env::set_var("REST_CLIENT_USERNAME", "svc-account");
        env::set_var("REST_CLIENT_PASSWORD", "hunter2");
        let credential = load_credential_from_env(CredentialKind::Basic).unwrap();
        assert!(matches!(credential, Credential::Basic { .. }));
        env::remove_var("REST_CLIENT_USERNAME");
        env::remove_var("REST_CLIENT_PASSWORD");
    }

    #[test]
    #[serial]
    fn missing_env_var_is_a_configuration_error() {
        env::remove_var("REST_CLIENT_USERNAME");
        env::remove_var("REST_CLIENT_PASSWORD");
        let result = load_credential_from_env(CredentialKind::Basic);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    #[serial]
    fn oauth2_credential_loads_optional_scope() {
        env::set_var("REST_CLIENT_CLIENT_ID", "id");
        env::set_var("REST_CLIENT_CLIENT_SECRET", "secret");
        env::remove_var("REST_CLIENT_SCOPE");
        let credential = load_credential_from_env(CredentialKind::OAuth2ClientCredentials).unwrap();
        match credential {
            Credential::OAuth2ClientCredentials { scope, .. } => assert!(scope.is_none()),
            _ => panic!("expected OAuth2ClientCredentials"),
        }
        env::remove_var("REST_CLIENT_CLIENT_ID");
        env::remove_var("REST_CLIENT_CLIENT_SECRET");
    }
}
