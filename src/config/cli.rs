use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the prerender-gate binary.
#[derive(Debug, Parser)]
#[command(
    name = "prerender-gate",
    version,
    about = "Inspect and drive the crawler pre-render gate"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SSR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the configured backend name.
    #[arg(long = "backend", value_name = "NAME", global = true)]
    pub backend: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Evaluate the interception rules for a URL and user agent.
    Check(CheckArgs),
    /// Render a URL through the configured backend.
    Render(UrlArgs),
    /// Ask the render service to refresh its snapshot of a URL.
    Recache(UrlArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Absolute URL to evaluate.
    #[arg(value_name = "URL")]
    pub url: String,

    /// User-Agent header to evaluate; empty when omitted.
    #[arg(long = "user-agent", value_name = "UA", default_value = "")]
    pub user_agent: String,
}

#[derive(Debug, Args, Clone)]
pub struct UrlArgs {
    /// Absolute URL of the page.
    #[arg(value_name = "URL")]
    pub url: String,
}
