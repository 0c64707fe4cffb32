use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "podtail")]
#[command(about = "Follow structured logs of matching pods and containers as they come and go")]
pub struct Cli {
    /// YAML config file with pod/container rules (accept all pods if omitted)
    pub config: Option<PathBuf>,

    /// Namespace (overrides the config file)
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// Look-back window in seconds for newly opened streams (overrides the config file)
    #[arg(long)]
    pub since: Option<i64>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
