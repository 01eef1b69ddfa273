use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "risk-service",
    version,
    about = "URL risk assessment service"
)]
pub(crate) struct Args {
    /// Length-delimited TCP transport.
    #[arg(long, default_value = "127.0.0.1:19410")]
    pub(crate) listen_addr: String,
    /// Optional HTTP transport (`/health`, `/invoke`, `/risk`).
    #[arg(long)]
    pub(crate) http_addr: Option<String>,
    /// TOML configuration; built-in defaults when omitted.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, default_value = "logs")]
    pub(crate) log_dir: PathBuf,
    /// Per-invocation event and result records.
    #[arg(long)]
    pub(crate) audit_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    /// Handle one event from a file (`-` for stdin), print the result and exit.
    #[arg(long)]
    pub(crate) event: Option<PathBuf>,
}
