/// Generated gRPC code from proto/waypoint.proto
pub mod proto {
    tonic::include_proto!("hashicorp.waypoint");
}

// Re-export the stub and service under names that don't collide with the
// facade types in waypoint-client.
pub use proto::waypoint_client::WaypointClient as WaypointRpcClient;
pub use proto::waypoint_server::{Waypoint as WaypointService, WaypointServer};

pub use proto::{
    Application, AuthMethod, ConvertInviteTokenRequest, DeleteAuthMethodRequest,
    DeleteOnDemandRunnerConfigRequest, DeleteOnDemandRunnerConfigResponse, DeleteUserRequest,
    GetAuthMethodRequest, GetAuthMethodResponse, GetOnDemandRunnerConfigRequest,
    GetOnDemandRunnerConfigResponse, GetProjectRequest, GetProjectResponse,
    GetUserRequest, GetUserResponse, GetVersionInfoResponse, InviteTokenRequest,
    LoginTokenRequest, NewTokenResponse, OnDemandRunnerConfig, Project,
    UpsertAuthMethodRequest, UpsertAuthMethodResponse, UpsertOnDemandRunnerConfigRequest,
    UpsertOnDemandRunnerConfigResponse, User, VersionInfo,
};

// Re-export nested types used for pattern matching and request building
pub use proto::auth_method::Method as AuthMethodKind;
pub use proto::auth_method::Oidc as OidcAuthMethod;
pub use proto::hcl::Format as HclFormat;
pub use proto::r#ref::runner::Target as RunnerTargetRef;
pub use proto::r#ref::user::Ref as UserRefKind;
pub use proto::token::invite::Signup as InviteSignup;
pub use proto::version_info::ProtocolVersion;
