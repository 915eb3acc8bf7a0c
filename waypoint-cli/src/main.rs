//! Waypoint client CLI
//!
//! Connects to a Waypoint server using the token in `WAYPOINT_TOKEN` (or
//! `--token`) and runs a single operation, printing the result.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_client::{ClientConfig, TlsSettings, UserRef, WaypointClient};

/// Query and manage a Waypoint server
#[derive(Parser, Debug)]
#[command(name = "waypoint-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Waypoint server address, host:port (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Token to access the server (overrides config)
    #[arg(long, env = "WAYPOINT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Skip server certificate verification
    #[arg(long, conflicts_with = "ca_cert")]
    insecure: bool,

    /// CA certificate used to verify the server
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the server's version information
    Version,

    /// Show a project
    Project {
        /// Project name
        name: String,
    },

    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Invite a new user
    Invite {
        /// Username the invited user signs up with
        username: String,

        /// Invite token lifetime (e.g., "24h", "30m")
        #[arg(long, default_value = "24h")]
        ttl: String,
    },

    /// Exchange an invite token for a login token
    AcceptInvite {
        /// Invite token
        token: String,
    },

    /// OIDC auth method management
    AuthMethod {
        #[command(subcommand)]
        command: AuthMethodCommands,
    },

    /// Runner profile management
    RunnerProfile {
        #[command(subcommand)]
        command: RunnerProfileCommands,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct UserSelector {
    /// User id
    #[arg(long)]
    id: Option<String>,

    /// Username
    #[arg(long)]
    username: Option<String>,
}

impl UserSelector {
    fn user_ref(&self) -> Option<UserRef> {
        user_ref(self.id.as_deref(), self.username.as_deref())
    }
}

fn user_ref(id: Option<&str>, username: Option<&str>) -> Option<UserRef> {
    match (id, username) {
        (Some(id), _) => Some(UserRef::id(id)),
        (None, Some(username)) => Some(UserRef::username(username)),
        (None, None) => None,
    }
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// Show a user
    Get(UserSelector),
    /// Delete a user
    Delete(UserSelector),
}

#[derive(Subcommand, Debug)]
enum TokenCommands {
    /// Generate a login token (for the caller unless a user is given)
    Create {
        /// User id
        #[arg(long, conflicts_with = "username")]
        id: Option<String>,

        /// Username
        #[arg(long)]
        username: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AuthMethodCommands {
    /// Show an auth method
    Get { name: String },
    /// Delete an auth method
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum RunnerProfileCommands {
    /// Show a runner profile
    Get { id: String },
    /// Delete a runner profile (succeeds if it doesn't exist)
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = build_config(&cli)?;
    debug!("Connecting to {}", config.address);

    let client = WaypointClient::connect(config)
        .await
        .context("Failed to connect to Waypoint server")?;

    let result = run(&client, cli.command).await;
    client.close();
    result
}

async fn run(client: &WaypointClient, command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            let info = client.get_version_info().await?;
            println!("{info:#?}");
        }
        Commands::Project { name } => {
            let project = client.get_project(&name).await?;
            println!("{project:#?}");
        }
        Commands::User { command } => match command {
            UserCommands::Get(selector) => {
                let user = selector.user_ref().context("No user given")?;
                println!("{:#?}", client.get_user(&user).await?);
            }
            UserCommands::Delete(selector) => {
                let user = selector.user_ref().context("No user given")?;
                client.delete_user(&user).await?;
                println!("User deleted");
            }
        },
        Commands::Token {
            command: TokenCommands::Create { id, username },
        } => {
            let user = user_ref(id.as_deref(), username.as_deref());
            println!("{}", client.create_token(user.as_ref()).await?);
        }
        Commands::Invite { username, ttl } => {
            println!("{}", client.invite_user(&username, &ttl).await?);
        }
        Commands::AcceptInvite { token } => {
            println!("{}", client.accept_invitation(&token).await?);
        }
        Commands::AuthMethod { command } => match command {
            AuthMethodCommands::Get { name } => {
                println!("{:#?}", client.get_oidc_auth_method(&name).await?);
            }
            AuthMethodCommands::Delete { name } => {
                client.delete_oidc(&name).await?;
                println!("Auth method {name} deleted");
            }
        },
        Commands::RunnerProfile { command } => match command {
            RunnerProfileCommands::Get { id } => {
                println!("{:#?}", client.get_runner_profile(&id).await?);
            }
            RunnerProfileCommands::Delete { id } => {
                client.delete_runner_profile(&id).await?;
                println!("Runner profile {id} deleted");
            }
        },
    }
    Ok(())
}

/// Load the config file (if any) and apply command-line overrides.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let path = ClientConfig::default_config_path();
            if path.exists() {
                info!("Loading config from {:?}", path);
                ClientConfig::load(&path)?
            } else {
                ClientConfig::default()
            }
        }
    };

    if let Some(address) = &cli.address {
        config.address = address.clone();
    }

    if let Some(token) = &cli.token {
        config.token = token.clone();
    }

    if config.token.is_empty() {
        bail!("WAYPOINT_TOKEN environment variable not set");
    }

    if cli.insecure {
        config = config.insecure();
    }

    if let Some(ca_cert) = &cli.ca_cert {
        let domain_name = config.tls.as_ref().and_then(|tls| tls.domain_name.clone());
        config.insecure_skip_verify = false;
        config.tls = Some(TlsSettings {
            ca_cert: Some(ca_cert.clone()),
            ca_cert_pem: None,
            domain_name,
        });
    }

    Ok(config)
}

fn init_logging(verbose: bool) {
    // Base filter suppresses noisy libraries, RUST_LOG layers on top (can override if explicit)
    let base = "hyper=warn,h2=warn,rustls=warn,tonic=warn,tower=warn";
    let default_level = if verbose { "debug" } else { "info" };
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) => EnvFilter::new(format!("{base},{env}")),
        Err(_) => EnvFilter::new(format!("{base},{default_level}")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["waypoint-client"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("Failed to parse args")
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = config_file("address = \"from-file:9701\"\ntoken = \"file-token\"\n");
        let path = file.path().to_str().unwrap();

        let cli = parse(&[
            "--config",
            path,
            "--address",
            "from-flag:9701",
            "--token",
            "flag-token",
            "--insecure",
            "version",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.address, "from-flag:9701");
        assert_eq!(config.token, "flag-token");
        assert!(config.insecure_skip_verify);
        assert!(config.tls.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_ca_cert_flag_replaces_insecure_file_setting() {
        let file = config_file("token = \"t\"\ninsecure_skip_verify = true\n");
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--config", path, "--ca-cert", "/etc/waypoint/ca.pem", "version"]);
        let config = build_config(&cli).unwrap();

        assert!(!config.insecure_skip_verify);
        assert_eq!(
            config.tls.and_then(|tls| tls.ca_cert),
            Some(PathBuf::from("/etc/waypoint/ca.pem"))
        );
    }

    #[test]
    fn test_config_file_without_tls_section_is_usable() {
        let file = config_file("address = \"waypoint.local:9701\"\ntoken = \"t\"\n");
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--config", path, "version"]);
        let config = build_config(&cli).unwrap();

        assert!(config.tls.is_some());
        assert!(!config.insecure_skip_verify);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_token_is_rejected() {
        if std::env::var_os("WAYPOINT_TOKEN").is_some() {
            return;
        }
        let file = config_file("address = \"localhost:9701\"\n");
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--config", path, "version"]);
        let err = build_config(&cli).unwrap_err();
        assert!(err.to_string().contains("WAYPOINT_TOKEN"));
    }

    #[test]
    fn test_user_selector_requires_one_of() {
        let cli = Cli::try_parse_from(["waypoint-client", "user", "get"]);
        assert!(cli.is_err());

        let cli = parse(&["user", "get", "--username", "alice"]);
        let Commands::User {
            command: UserCommands::Get(selector),
        } = cli.command
        else {
            panic!("expected user get");
        };
        assert_eq!(selector.user_ref(), Some(UserRef::username("alice")));
    }

    #[test]
    fn test_token_for_caller_when_no_user() {
        let cli = parse(&["token", "create"]);
        let Commands::Token {
            command: TokenCommands::Create { id, username },
        } = cli.command
        else {
            panic!("expected token create");
        };
        assert_eq!(user_ref(id.as_deref(), username.as_deref()), None);

        let cli = Cli::try_parse_from([
            "waypoint-client",
            "token",
            "create",
            "--id",
            "a",
            "--username",
            "b",
        ]);
        assert!(cli.is_err());
    }
}
