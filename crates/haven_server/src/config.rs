//! Server configuration.
//!
//! Every option can be given on the command line or through the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default request body limit, enough for a phone photo.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Haven - multi-agent tenant assistant
#[derive(Parser, Debug, Clone)]
#[command(name = "haven")]
#[command(version, about = "Haven - multi-agent tenant assistant")]
#[command(long_about = r#"
Haven answers tenants' questions by routing each turn to a specialist:

  Property Issue Detector   → damage, leaks, pests (image analysis)
  Tenancy Agreement Expert  → leases, rent, rights (web search)
  Query Clarification Agent → asks what the question is about

ENDPOINTS:
  POST /api/chat/multiagent/stream  → server-sent events
  POST /api/chat/multiagent         → single JSON reply
  GET  /health                      → liveness
"#)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "HAVEN_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Override the OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// JSON file with model settings
    #[arg(long, env = "HAVEN_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Maximum request body size in bytes
    #[arg(long, env = "HAVEN_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Emit logs as JSON
    #[arg(long, env = "HAVEN_LOG_JSON")]
    pub log_json: bool,
}

impl ServerArgs {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", addr, e))
    }
}
