use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cxlens",
    about = "cxlens: run a code complexity analyzer and render its results as reports",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the analyze/report HTTP API
    Serve {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<String>,

        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Analyzer program (overrides config)
        #[arg(long)]
        engine: Option<String>,

        /// Analyzer timeout in seconds (overrides config)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Analyze one source file with the configured analyzer
    Analyze {
        /// Source file to analyze
        source: String,

        /// Path to a TOML config file
        #[arg(long)]
        config: Option<String>,

        /// Analyzer program (overrides config)
        #[arg(long)]
        engine: Option<String>,

        /// Analyzer timeout in seconds (overrides config)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate stored analyzer output
    Validate {
        /// Analyzer output JSON file
        file: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a PDF report from an analysis result
    Report {
        /// Analysis result JSON file
        input: String,

        /// Output PDF path
        #[arg(long, default_value = "complexity_report.pdf")]
        out: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
