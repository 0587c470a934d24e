use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lucide::config::{CommandLineArgs, Config};
use lucide::models::{Language, PipelineResponse, StructuredContext};
use lucide::services::{ApiFootballClient, AutonomousPipeline, MemoryStore};
use lucide::KnowledgeBase;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = CommandLineArgs::parse();
    let config = Config::load(&args)?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // Keep the appender guard alive for the process lifetime.
    let _guard;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("lucide.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        _guard = None;
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let Some(question) = args.question.clone() else {
        eprintln!("Usage: lucide \"<question>\" [--league ...] [--team ...] [--player ...]");
        std::process::exit(2);
    };
    if config.api.key.is_empty() {
        tracing::warn!("No API key configured (set LUCIDE_API_KEY); upstream calls will be rejected");
    }

    let knowledge_base = Arc::new(KnowledgeBase::new());
    let client = Arc::new(ApiFootballClient::new(
        config.api.base_url.clone(),
        config.api.key.clone(),
        knowledge_base,
        config.api.timeout(),
    ));
    let store = Arc::new(MemoryStore::new());
    let pipeline = AutonomousPipeline::new(client, store, &config)?;

    let context = context_from_args(&args);
    let response = pipeline
        .process(&question, context.as_ref())
        .await;

    match &response {
        PipelineResponse::Clarification(request) => {
            for line in &request.questions {
                println!("{line}");
            }
        }
        PipelineResponse::Bundle(_) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    if args.show_metrics {
        println!("{}", pipeline.metrics().gather_text()?);
    }

    Ok(())
}

fn context_from_args(args: &CommandLineArgs) -> Option<StructuredContext> {
    let context = StructuredContext {
        league: args.league.clone(),
        team: args.team.clone(),
        player: args.player.clone(),
        fixture_id: args.fixture_id,
        season: args.season,
        language: args.language.as_deref().and_then(Language::parse),
        ..Default::default()
    };
    if context.is_empty() { None } else { Some(context) }
}
