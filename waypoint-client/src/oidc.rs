//! OIDC auth methods.

use crate::client::WaypointClient;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::debug;
use waypoint_proto::proto::r#ref;
use waypoint_proto::{
    AuthMethod, AuthMethodKind, DeleteAuthMethodRequest, GetAuthMethodRequest, OidcAuthMethod,
    UpsertAuthMethodRequest,
};

/// Settings of the OIDC provider backing an auth method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OidcConfig {
    /// Client ID of the OIDC provider
    pub client_id: String,
    /// Client secret of the OIDC provider
    pub client_secret: String,
    /// Scopes to request from the provider
    pub scopes: Vec<String>,
    /// Audience values accepted at login. Restricts who in a shared OIDC
    /// domain may log in.
    pub auds: Vec<String>,
    /// Redirect URIs the provider may send users back to (web UI, CLI
    /// localhost server, ...)
    pub allowed_redirect_uris: Vec<String>,
    /// Signing algorithms supported by the provider. The server assumes
    /// RS256 when empty.
    pub signing_algs: Vec<String>,
    /// Discovery URL of the provider
    pub discovery_url: String,
    /// CA certificates used to validate the discovery URL
    pub discovery_ca_pem: Vec<String>,
    /// Claims mapped to `value.<name>` for use in access selectors
    pub claim_mappings: HashMap<String, String>,
    /// List claims mapped to `list.<name>`
    pub list_claim_mappings: HashMap<String, String>,
}

impl From<OidcConfig> for OidcAuthMethod {
    fn from(config: OidcConfig) -> Self {
        OidcAuthMethod {
            client_id: config.client_id,
            client_secret: config.client_secret,
            scopes: config.scopes,
            allowed_redirect_uris: config.allowed_redirect_uris,
            signing_algs: config.signing_algs,
            discovery_url: config.discovery_url,
            discovery_ca_pem: config.discovery_ca_pem,
            claim_mappings: config.claim_mappings,
            list_claim_mappings: config.list_claim_mappings,
            auds: config.auds,
        }
    }
}

/// Presentation and access settings of an auth method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthMethodConfig {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Selector expression a user must match to log in
    pub access_selector: String,
}

impl WaypointClient {
    /// Create or update the OIDC auth method named by `auth_method.name`.
    pub async fn upsert_oidc(
        &self,
        oidc: OidcConfig,
        auth_method: AuthMethodConfig,
    ) -> Result<AuthMethod> {
        debug!(name = %auth_method.name, "upserting OIDC auth method");
        let request = UpsertAuthMethodRequest {
            auth_method: Some(AuthMethod {
                name: auth_method.name,
                display_name: auth_method.display_name,
                description: auth_method.description,
                access_selector: auth_method.access_selector,
                method: Some(AuthMethodKind::Oidc(oidc.into())),
            }),
        };

        let response = self.raw().upsert_auth_method(request).await?;
        response
            .into_inner()
            .auth_method
            .ok_or(Error::EmptyResponse("auth_method"))
    }

    pub async fn delete_oidc(&self, name: &str) -> Result<()> {
        debug!(name, "deleting auth method");
        let request = DeleteAuthMethodRequest {
            auth_method: Some(r#ref::AuthMethod {
                name: name.to_string(),
            }),
        };

        self.raw().delete_auth_method(request).await?;
        Ok(())
    }

    pub async fn get_oidc_auth_method(&self, name: &str) -> Result<AuthMethod> {
        let request = GetAuthMethodRequest {
            auth_method: Some(r#ref::AuthMethod {
                name: name.to_string(),
            }),
        };

        let response = self.raw().get_auth_method(request).await?;
        response
            .into_inner()
            .auth_method
            .ok_or(Error::EmptyResponse("auth_method"))
    }
}
