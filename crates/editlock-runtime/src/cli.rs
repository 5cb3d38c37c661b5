//! CLI definition using clap derive.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use editlock_client::{HttpTransport, TransportError};
use editlock_core::{Participant, Role, TimingConfig};

#[derive(Parser, Debug)]
#[command(name = "editlock", about = "collaborative document edit-lock client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a document and drive an interactive edit session from stdin
    Edit(EditOpts),
    /// Print the current lock holder of a document
    Status(StatusOpts),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServerOpts {
    /// Base URL of the lease authority (documents live under {url}/documents/{id})
    #[arg(long, env = "EDITLOCK_SERVER_URL")]
    pub server_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "EDITLOCK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    pub request_timeout_secs: u64,
}

impl ServerOpts {
    pub fn transport(&self) -> Result<Arc<HttpTransport>, TransportError> {
        let mut transport = HttpTransport::with_timeout(
            self.server_url.as_str(),
            Duration::from_secs(self.request_timeout_secs),
        )?;
        if let Some(ref token) = self.token {
            transport = transport.with_token(token.as_str());
        }
        Ok(Arc::new(transport))
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct IdentityOpts {
    #[arg(long, env = "EDITLOCK_USER_ID")]
    pub user_id: String,

    /// Name shown to other participants (defaults to the user id)
    #[arg(long, env = "EDITLOCK_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Participant may force-take a lease held by someone else
    #[arg(long)]
    pub elevated: bool,
}

impl IdentityOpts {
    pub fn participant(&self) -> Participant {
        let role = if self.elevated {
            Role::Elevated
        } else {
            Role::Member
        };
        let name = self.display_name.as_deref().unwrap_or(&self.user_id);
        Participant::new(self.user_id.as_str(), name, role)
    }
}

/// Timing overrides in seconds.
#[derive(clap::Args, Debug, Clone)]
pub struct TimingOpts {
    #[arg(long, default_value = "60")]
    pub heartbeat_secs: u64,

    #[arg(long, default_value = "30")]
    pub poll_secs: u64,

    #[arg(long, default_value = "10")]
    pub idle_check_secs: u64,

    /// Idle time before the inactivity prompt appears
    #[arg(long, default_value = "300")]
    pub inactivity_secs: u64,

    /// Time the inactivity prompt waits before auto-resolving
    #[arg(long, default_value = "60")]
    pub grace_secs: u64,
}

impl TimingOpts {
    pub fn to_config(&self) -> TimingConfig {
        let ms = |secs: u64| secs.saturating_mul(1_000);
        TimingConfig {
            heartbeat_interval_ms: ms(self.heartbeat_secs),
            poll_interval_ms: ms(self.poll_secs),
            idle_check_interval_ms: ms(self.idle_check_secs),
            inactivity_threshold_ms: ms(self.inactivity_secs),
            inactivity_grace_ms: ms(self.grace_secs),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct EditOpts {
    /// Document to open
    pub document: String,

    /// WebSocket URL of the push channel; without it only polling is used
    #[arg(long, env = "EDITLOCK_PUSH_URL")]
    pub push_url: Option<String>,

    #[command(flatten)]
    pub server: ServerOpts,

    #[command(flatten)]
    pub identity: IdentityOpts,

    #[command(flatten)]
    pub timing: TimingOpts,
}

#[derive(clap::Args, Debug)]
pub struct StatusOpts {
    pub document: String,

    /// Print JSON instead of a sentence
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub server: ServerOpts,
}
