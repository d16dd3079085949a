//! Outreach pipeline entry point.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::map_err_ignore)]
#![allow(clippy::manual_let_else)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use outreach_agents::{
    agdev::{AgentsApi, HttpTransport},
    arcade::ArcadeClient,
    companies::load_companies,
    config::AppConfig,
    pipeline::{Mailer, Pipeline, PipelineAgents},
    snapshot::SnapshotWriter,
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[tokio::main]
async fn main() {
    // Load .env (if present) before clap reads env fallbacks
    let _ = dotenv();

    let (cli, config) = match AppConfig::load() {
        Ok(loaded) => loaded,
        Err(config::ConfigError::Foreign(e)) if e.is::<clap::Error>() => {
            // Usage errors exit 2; --help and --version print and exit 0.
            match e.downcast::<clap::Error>() {
                Ok(e) => e.exit(),
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    std::process::exit(2);
                }
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(cli.log_json);

    if let Err(e) = run(&cli.companies, config).await {
        tracing::error!(name: "pipeline.failed", error = ?e, "Pipeline failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(companies_file: &std::path::Path, config: AppConfig) -> anyhow::Result<()> {
    let companies = load_companies(companies_file)?;
    info!(
        name: "pipeline.config.loaded",
        companies = companies.len(),
        base_url = %config.agdev.base_url,
        concurrency = config.batch.concurrency,
        "Configuration loaded"
    );

    let transport = HttpTransport::new(config.agdev_transport())
        .context("failed to build ag.dev client")?;
    let api = AgentsApi::new(Arc::new(transport));
    let agents = PipelineAgents {
        company_profile: api.agent(&config.agents.company_profile),
        contacts: api.agent(&config.agents.contacts),
        contact_profile: api.agent(&config.agents.contact_profile),
        outreach_email: api.agent(&config.agents.outreach_email),
    };

    let snapshots = SnapshotWriter::new(&config.output.dir, chrono::Utc::now());
    let mut pipeline = Pipeline::new(agents, config.batch_options(), snapshots);

    if config.output.draft_emails {
        let arcade = config
            .arcade_transport()
            .context("ARCADE_API_KEY is required to draft emails")?;
        let transport = HttpTransport::new(arcade).context("failed to build Arcade client")?;
        pipeline = pipeline.with_mailer(Mailer {
            client: ArcadeClient::new(Arc::new(transport)),
            user_id: config
                .arcade
                .user_id
                .clone()
                .context("ARCADE_USER_ID is required to draft emails")?,
            wait: config.wait_options(),
        });
    }

    let reports = pipeline.run(&companies).await?;
    info!(
        name: "pipeline.summary",
        reports = reports.len(),
        drafts = reports.iter().filter(|r| r.draft.is_some()).count(),
        output_dir = %config.output.dir.display(),
        "Done"
    );
    Ok(())
}
