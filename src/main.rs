use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use prerender_gate::{
    application::{BackendError, BackendRegistry, RenderBackend, RenderError},
    cache::{MemoryStore, StoreRegistry},
    config::{self, CheckArgs, Command, SsrSettings, UrlArgs},
    domain::RenderRequest,
    infra::{error::InfraError, telemetry},
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Check(args) => run_check(&settings, args),
        Command::Render(args) => run_render(&settings, args).await,
        Command::Recache(args) => run_recache(&settings, args).await,
    }
}

fn run_check(settings: &SsrSettings, args: CheckArgs) -> Result<(), AppError> {
    let url = RenderRequest::new(args.url, settings.strip_query_params);
    let rules = settings.rule_set();

    let user_agent_match = rules.is_user_agent_match(&args.user_agent);
    let must_render = rules.must_render(url.as_str());
    let verdict = if user_agent_match && must_render {
        "render"
    } else {
        "pass through"
    };

    let mut out = io::stdout().lock();
    writeln!(out, "url:               {url}")?;
    writeln!(out, "enabled:           {}", rules.enabled)?;
    writeln!(out, "ignored url:       {}", rules.is_url_ignored(url.as_str()))?;
    writeln!(out, "ignored path:      {}", rules.is_path_ignored(url.as_str()))?;
    writeln!(out, "ignored extension: {}", rules.is_extension_ignored(url.as_str()))?;
    writeln!(out, "user agent match:  {user_agent_match}")?;
    writeln!(out, "verdict:           {verdict}")?;
    Ok(())
}

async fn run_render(settings: &SsrSettings, args: UrlArgs) -> Result<(), AppError> {
    let backend = build_backend(settings)?;
    let url = RenderRequest::new(args.url, backend.strip_query_params());
    let response = backend.render(url.as_str()).await?;
    info!(url = %url, status = response.status.as_u16(), "rendered");

    let mut out = io::stdout().lock();
    writeln!(out, "HTTP {}", response.status)?;
    for (name, value) in &response.headers {
        writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(out)?;
    out.write_all(&response.body)?;
    out.flush()?;
    Ok(())
}

async fn run_recache(settings: &SsrSettings, args: UrlArgs) -> Result<(), AppError> {
    let backend = build_backend(settings)?;
    let url = RenderRequest::new(args.url, backend.strip_query_params());
    let refreshed = backend.update(url.as_str()).await?;

    let mut out = io::stdout().lock();
    if refreshed {
        writeln!(out, "refreshed {url}")?;
    } else {
        writeln!(out, "render service did not accept the recache of {url}")?;
    }
    Ok(())
}

fn build_backend(settings: &SsrSettings) -> Result<Arc<dyn RenderBackend>, AppError> {
    let stores = StoreRegistry::with_default(Arc::new(MemoryStore::new(
        settings.cache.max_entries,
    )));
    Ok(BackendRegistry::with_defaults().build(settings, &stores)?)
}
