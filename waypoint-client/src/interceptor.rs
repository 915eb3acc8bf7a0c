//! Per-call metadata for the Waypoint server.
//!
//! Every request, unary or streaming, carries the static token plus three
//! protocol negotiation headers describing the range of protocol versions
//! this client speaks. The server uses them to reject incompatible builds;
//! the client never adapts to what the server advertises.

use crate::config::ConfigError;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use waypoint_proto::{ProtocolVersion, VersionInfo};

pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_CLIENT_API_PROTOCOL: &str = "client-api-protocol";
pub const HEADER_CLIENT_ENTRYPOINT_PROTOCOL: &str = "client-entrypoint-protocol";
pub const HEADER_CLIENT_VERSION: &str = "client-version";

const PROTOCOL_VERSION_API_CURRENT: u32 = 1;
const PROTOCOL_VERSION_API_MIN: u32 = 1;
const PROTOCOL_VERSION_ENTRYPOINT_CURRENT: u32 = 1;
const PROTOCOL_VERSION_ENTRYPOINT_MIN: u32 = 1;
const CURRENT_VERSION: &str = "0.8.1";

/// The protocol versions and client version compiled into this build.
pub fn current_version() -> VersionInfo {
    VersionInfo {
        api: Some(ProtocolVersion {
            current: PROTOCOL_VERSION_API_CURRENT,
            minimum: PROTOCOL_VERSION_API_MIN,
        }),
        entrypoint: Some(ProtocolVersion {
            current: PROTOCOL_VERSION_ENTRYPOINT_CURRENT,
            minimum: PROTOCOL_VERSION_ENTRYPOINT_MIN,
        }),
        version: CURRENT_VERSION.to_string(),
    }
}

/// Rendered negotiation header values, built once per client.
#[derive(Debug, Clone)]
pub struct ProtocolHeaders {
    api: AsciiMetadataValue,
    entrypoint: AsciiMetadataValue,
    version: AsciiMetadataValue,
}

impl ProtocolHeaders {
    pub fn new(info: &VersionInfo) -> Result<Self, ConfigError> {
        Ok(Self {
            api: header_value(&protocol_range(info.api.as_ref()))?,
            entrypoint: header_value(&protocol_range(info.entrypoint.as_ref()))?,
            version: header_value(&info.version)?,
        })
    }

    /// Value sent as `client-api-protocol` (`"{min},{current}"`).
    pub fn api_protocol(&self) -> &str {
        self.api.to_str().unwrap_or_default()
    }

    /// Value sent as `client-entrypoint-protocol` (`"{min},{current}"`).
    pub fn entrypoint_protocol(&self) -> &str {
        self.entrypoint.to_str().unwrap_or_default()
    }

    /// Value sent as `client-version`.
    pub fn version(&self) -> &str {
        self.version.to_str().unwrap_or_default()
    }

    fn append_to(&self, metadata: &mut MetadataMap) {
        metadata.append(HEADER_CLIENT_API_PROTOCOL, self.api.clone());
        metadata.append(HEADER_CLIENT_ENTRYPOINT_PROTOCOL, self.entrypoint.clone());
        metadata.append(HEADER_CLIENT_VERSION, self.version.clone());
    }
}

fn protocol_range(version: Option<&ProtocolVersion>) -> String {
    let (minimum, current) = version
        .map(|v| (v.minimum, v.current))
        .unwrap_or_default();
    format!("{minimum},{current}")
}

fn header_value(value: &str) -> Result<AsciiMetadataValue, ConfigError> {
    AsciiMetadataValue::try_from(value).map_err(|_| {
        ConfigError::ValidationError(format!("{value:?} is not a valid gRPC metadata value"))
    })
}

/// Attaches the static token and the negotiation headers to every call.
#[derive(Debug, Clone)]
pub struct ClientInterceptor {
    authorization: AsciiMetadataValue,
    protocol: ProtocolHeaders,
}

impl ClientInterceptor {
    pub fn new(token: &str, info: &VersionInfo) -> Result<Self, ConfigError> {
        let authorization = AsciiMetadataValue::try_from(token).map_err(|_| {
            ConfigError::ValidationError(
                "token contains characters that are not allowed in gRPC metadata".to_string(),
            )
        })?;

        Ok(Self {
            authorization,
            protocol: ProtocolHeaders::new(info)?,
        })
    }

    pub fn protocol(&self) -> &ProtocolHeaders {
        &self.protocol
    }
}

impl Interceptor for ClientInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(HEADER_AUTHORIZATION, self.authorization.clone());
        self.protocol.append_to(metadata);
        Ok(request)
    }
}
