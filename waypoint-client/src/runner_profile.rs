//! Runner profiles (on-demand runner configs).
//!
//! A profile tells the server how to launch an on-demand runner: which plugin
//! starts it, the OCI image to run, and which runner may pick up the work.

use crate::client::WaypointClient;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, warn};
use waypoint_proto::proto::r#ref;
use waypoint_proto::{
    DeleteOnDemandRunnerConfigRequest, GetOnDemandRunnerConfigRequest, HclFormat,
    OnDemandRunnerConfig, RunnerTargetRef, UpsertOnDemandRunnerConfigRequest,
};

/// Which runner may execute work launched from a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunnerTarget {
    #[default]
    Any,
    Id(String),
    Labels(HashMap<String, String>),
}

impl From<RunnerTarget> for r#ref::Runner {
    fn from(target: RunnerTarget) -> Self {
        let target = match target {
            RunnerTarget::Any => RunnerTargetRef::Any(r#ref::RunnerAny {}),
            RunnerTarget::Id(id) => RunnerTargetRef::Id(r#ref::RunnerId { id }),
            RunnerTarget::Labels(labels) => {
                RunnerTargetRef::Labels(r#ref::RunnerLabels { labels })
            }
        };
        r#ref::Runner {
            target: Some(target),
        }
    }
}

/// Encoding of `RunnerConfig::plugin_config`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Hcl,
    Json,
}

impl From<ConfigFormat> for HclFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Hcl => HclFormat::Hcl,
            ConfigFormat::Json => HclFormat::Json,
        }
    }
}

/// A runner profile to create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Existing profile id to update; empty creates a new profile
    pub id: String,
    pub name: String,
    pub target_runner: RunnerTarget,
    /// OCI image the on-demand runner runs
    pub oci_url: String,
    pub environment_variables: HashMap<String, String>,
    /// Plugin that launches the runner (e.g. "kubernetes", "docker")
    pub plugin_type: String,
    pub plugin_config: Vec<u8>,
    pub config_format: ConfigFormat,
    /// Use this profile when a project doesn't name one
    pub default: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            target_runner: RunnerTarget::Any,
            oci_url: String::new(),
            environment_variables: HashMap::new(),
            plugin_type: "kubernetes".to_string(),
            plugin_config: Vec::new(),
            config_format: ConfigFormat::Hcl,
            default: false,
        }
    }
}

impl From<RunnerConfig> for OnDemandRunnerConfig {
    fn from(config: RunnerConfig) -> Self {
        OnDemandRunnerConfig {
            id: config.id,
            name: config.name,
            target_runner: Some(config.target_runner.into()),
            oci_url: config.oci_url,
            environment_variables: config.environment_variables,
            plugin_type: config.plugin_type,
            plugin_config: config.plugin_config,
            config_format: HclFormat::from(config.config_format) as i32,
            default: config.default,
        }
    }
}

fn profile_ref(id: &str) -> r#ref::OnDemandRunnerConfig {
    r#ref::OnDemandRunnerConfig {
        id: id.to_string(),
        name: String::new(),
    }
}

impl WaypointClient {
    /// Create a runner profile, or update the one whose id is set.
    pub async fn create_runner_profile(&self, config: RunnerConfig) -> Result<OnDemandRunnerConfig> {
        debug!(name = %config.name, plugin = %config.plugin_type, "upserting runner profile");
        let request = UpsertOnDemandRunnerConfigRequest {
            config: Some(config.into()),
        };

        let response = self.raw().upsert_on_demand_runner_config(request).await?;
        response
            .into_inner()
            .config
            .ok_or(Error::EmptyResponse("config"))
    }

    /// Get a runner profile by id.
    ///
    /// The returned profile always carries `id`, even when the server left it
    /// blank in its reply.
    pub async fn get_runner_profile(&self, id: &str) -> Result<OnDemandRunnerConfig> {
        let request = GetOnDemandRunnerConfigRequest {
            config: Some(profile_ref(id)),
        };

        let response = self.raw().get_on_demand_runner_config(request).await?;
        let mut config = response
            .into_inner()
            .config
            .ok_or(Error::EmptyResponse("config"))?;

        if config.id.is_empty() {
            config.id = id.to_string();
        }

        Ok(config)
    }

    /// Delete a runner profile by id.
    ///
    /// Deleting a profile that doesn't exist succeeds; every other error is
    /// returned.
    pub async fn delete_runner_profile(&self, id: &str) -> Result<()> {
        debug!(id, "deleting runner profile");
        let request = DeleteOnDemandRunnerConfigRequest {
            config: Some(profile_ref(id)),
        };

        match self.raw().delete_on_demand_runner_config(request).await {
            Ok(_) => Ok(()),
            Err(status) if status.code() == tonic::Code::NotFound => {
                warn!(id, "runner profile not found, nothing to delete");
                Ok(())
            }
            Err(status) => Err(status.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runner_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.plugin_type, "kubernetes");
        assert_eq!(config.target_runner, RunnerTarget::Any);
        assert_eq!(config.config_format, ConfigFormat::Hcl);
        assert!(!config.default);
    }

    #[test]
    fn test_runner_config_to_wire() {
        let config = RunnerConfig {
            id: "01H".to_string(),
            name: "k8s".to_string(),
            target_runner: RunnerTarget::Labels(HashMap::from([(
                "env".to_string(),
                "prod".to_string(),
            )])),
            oci_url: "hashicorp/waypoint-odr:latest".to_string(),
            plugin_config: b"{}".to_vec(),
            config_format: ConfigFormat::Json,
            default: true,
            ..Default::default()
        };

        let wire = OnDemandRunnerConfig::from(config);
        assert_eq!(wire.id, "01H");
        assert_eq!(wire.name, "k8s");
        assert_eq!(wire.plugin_type, "kubernetes");
        assert_eq!(wire.config_format, HclFormat::Json as i32);
        assert!(wire.default);

        let Some(r#ref::Runner {
            target: Some(RunnerTargetRef::Labels(labels)),
        }) = wire.target_runner
        else {
            panic!("expected a labels target");
        };
        assert_eq!(labels.labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_runner_target_variants() {
        assert_eq!(
            r#ref::Runner::from(RunnerTarget::Any).target,
            Some(RunnerTargetRef::Any(r#ref::RunnerAny {}))
        );
        assert_eq!(
            r#ref::Runner::from(RunnerTarget::Id("r1".to_string())).target,
            Some(RunnerTargetRef::Id(r#ref::RunnerId {
                id: "r1".to_string()
            }))
        );
    }
}
