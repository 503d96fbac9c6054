use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "portalfill")]
#[command(
    version,
    about = "PortalFill - fill clinical portal forms and collect episode history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Mapping profile: `vinavi`, `test`, or an absolute path to a mapping file
    #[arg(long, global = true, env = "PORTALFILL_PROFILE")]
    pub profile: Option<String>,

    /// Project root holding `config/*.mapping.json` (defaults to the current directory)
    #[arg(long, global = true, env = "PORTALFILL_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Run Chromium without a window
    #[arg(long, global = true)]
    pub headless: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check for a usable Chromium executable
    Probe,

    /// Open the portal and keep the browser up until Ctrl+C (e.g. to log in)
    Open,

    /// List the text fields on the current portal page
    Diagnose(DiagnoseArgs),

    /// Search a patient and fill the mapped fields from a draft
    Fill(FillArgs),

    /// Collect episode text from the consultations list
    Collect(CollectArgs),

    /// Serve JSON-lines requests on stdin/stdout for a host application
    Stdio,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct DiagnoseArgs {
    /// Wait for Enter before inspecting, so you can navigate first
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args)]
pub struct FillArgs {
    /// Patient ID card number typed into the patient search field
    #[arg(long = "id-card")]
    pub id_card: String,

    /// JSON file mapping field keys to values (`-` reads stdin)
    #[arg(long)]
    pub draft: Option<PathBuf>,

    /// Field value as KEY=VALUE; overrides the draft file
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Close the browser right after filling instead of waiting for review
    #[arg(long)]
    pub close: bool,
}

#[derive(Args)]
pub struct CollectArgs {
    /// Maximum number of episodes to open
    #[arg(long)]
    pub limit: Option<usize>,

    /// Collect immediately instead of waiting for Enter
    #[arg(long)]
    pub now: bool,

    /// Also write the episodes as JSON to this file
    #[arg(long)]
    pub output: Option<PathBuf>,
}
