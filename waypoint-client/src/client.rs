use crate::config::ClientConfig;
use crate::connector::{self, ConnectionState};
use crate::interceptor::{ClientInterceptor, current_version};
use crate::oidc::{AuthMethodConfig, OidcConfig};
use crate::runner_profile::RunnerConfig;
use crate::user::UserRef;
use crate::{Error, Result};
use std::future::Future;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tracing::debug;
use waypoint_proto::proto::r#ref;
use waypoint_proto::{
    AuthMethod, GetProjectRequest, OnDemandRunnerConfig, Project, User, VersionInfo,
    WaypointRpcClient,
};

/// The generated stub with the credential and negotiation headers attached.
pub type RawClient = WaypointRpcClient<InterceptedService<Channel, ClientInterceptor>>;

/// A connected Waypoint client.
///
/// Cloning is cheap and clones share the underlying HTTP/2 connection, so a
/// single client can serve concurrent callers. The connection closes when
/// [`WaypointClient::close`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct WaypointClient {
    address: String,
    version: VersionInfo,
    client: RawClient,
}

impl std::fmt::Debug for WaypointClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaypointClient")
            .field("address", &self.address)
            .field("version", &self.version.version)
            .finish_non_exhaustive()
    }
}

impl WaypointClient {
    /// Connect to the server described by `config`.
    ///
    /// Returns once the connection is ready. A connection that fails, or is
    /// still not ready after `connect_timeout_secs`, yields
    /// [`Error::ConnectionFailed`]. Nothing is retried.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_cancel(config, std::future::pending()).await
    }

    /// Like [`connect`](Self::connect), but gives up with
    /// [`Error::ConnectionFailed`] as soon as `cancel` completes.
    pub async fn connect_with_cancel<C>(config: ClientConfig, cancel: C) -> Result<Self>
    where
        C: Future<Output = ()>,
    {
        let version = current_version();
        let interceptor = ClientInterceptor::new(&config.token, &version)?;
        let channel = connector::establish(&config, cancel).await?;

        Ok(Self {
            address: config.address,
            version,
            client: WaypointRpcClient::with_interceptor(channel, interceptor),
        })
    }

    /// A handle to the generated stub, for calls this type doesn't wrap.
    pub fn raw(&self) -> RawClient {
        self.client.clone()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The protocol versions this client announces on every call.
    pub fn client_version(&self) -> &VersionInfo {
        &self.version
    }

    /// Always `Ready`: a client only exists once its connection was.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::Ready
    }

    /// Release this handle's share of the connection.
    ///
    /// The connection itself closes once every clone has been closed or dropped.
    pub fn close(self) {
        debug!("Released client handle for Waypoint server at {}", self.address);
    }

    /// Version information reported by the server.
    pub async fn get_version_info(&self) -> Result<VersionInfo> {
        let response = self.raw().get_version_info(()).await?;
        response
            .into_inner()
            .info
            .ok_or(Error::EmptyResponse("info"))
    }

    pub async fn get_project(&self, name: &str) -> Result<Project> {
        debug!(project = name, "getting project");
        let request = GetProjectRequest {
            project: Some(r#ref::Project {
                project: name.to_string(),
            }),
        };

        let response = self.raw().get_project(request).await?;
        response
            .into_inner()
            .project
            .ok_or(Error::EmptyResponse("project"))
    }
}

/// The operations of [`WaypointClient`] as a trait, so callers can swap in a
/// test double.
#[async_trait::async_trait]
pub trait Waypoint: Send + Sync {
    async fn get_version_info(&self) -> Result<VersionInfo>;
    async fn get_project(&self, name: &str) -> Result<Project>;

    async fn create_token(&self, user: Option<&UserRef>) -> Result<String>;
    async fn invite_user(&self, initial_username: &str, duration: &str) -> Result<String>;
    async fn accept_invitation(&self, invite_token: &str) -> Result<String>;
    async fn get_user(&self, user: &UserRef) -> Result<User>;
    async fn delete_user(&self, user: &UserRef) -> Result<()>;

    async fn upsert_oidc(&self, oidc: OidcConfig, auth_method: AuthMethodConfig)
    -> Result<AuthMethod>;
    async fn delete_oidc(&self, name: &str) -> Result<()>;
    async fn get_oidc_auth_method(&self, name: &str) -> Result<AuthMethod>;

    async fn create_runner_profile(&self, config: RunnerConfig) -> Result<OnDemandRunnerConfig>;
    async fn get_runner_profile(&self, id: &str) -> Result<OnDemandRunnerConfig>;
    async fn delete_runner_profile(&self, id: &str) -> Result<()>;
}

#[async_trait::async_trait]
impl Waypoint for WaypointClient {
    async fn get_version_info(&self) -> Result<VersionInfo> {
        WaypointClient::get_version_info(self).await
    }

    async fn get_project(&self, name: &str) -> Result<Project> {
        WaypointClient::get_project(self, name).await
    }

    async fn create_token(&self, user: Option<&UserRef>) -> Result<String> {
        WaypointClient::create_token(self, user).await
    }

    async fn invite_user(&self, initial_username: &str, duration: &str) -> Result<String> {
        WaypointClient::invite_user(self, initial_username, duration).await
    }

    async fn accept_invitation(&self, invite_token: &str) -> Result<String> {
        WaypointClient::accept_invitation(self, invite_token).await
    }

    async fn get_user(&self, user: &UserRef) -> Result<User> {
        WaypointClient::get_user(self, user).await
    }

    async fn delete_user(&self, user: &UserRef) -> Result<()> {
        WaypointClient::delete_user(self, user).await
    }

    async fn upsert_oidc(
        &self,
        oidc: OidcConfig,
        auth_method: AuthMethodConfig,
    ) -> Result<AuthMethod> {
        WaypointClient::upsert_oidc(self, oidc, auth_method).await
    }

    async fn delete_oidc(&self, name: &str) -> Result<()> {
        WaypointClient::delete_oidc(self, name).await
    }

    async fn get_oidc_auth_method(&self, name: &str) -> Result<AuthMethod> {
        WaypointClient::get_oidc_auth_method(self, name).await
    }

    async fn create_runner_profile(&self, config: RunnerConfig) -> Result<OnDemandRunnerConfig> {
        WaypointClient::create_runner_profile(self, config).await
    }

    async fn get_runner_profile(&self, id: &str) -> Result<OnDemandRunnerConfig> {
        WaypointClient::get_runner_profile(self, id).await
    }

    async fn delete_runner_profile(&self, id: &str) -> Result<()> {
        WaypointClient::delete_runner_profile(self, id).await
    }
}
