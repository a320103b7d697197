use std::path::PathBuf;
use std::sync::Arc;

use ai_localizer::{
    translate_documents, JsonResourceDocument, Language, LanguageTask, ProviderConfig,
    ProviderRegistry, RequestExecutor, RetryPolicy, RunOptions,
};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const USAGE: &str = "Usage: ai-localizer <source.json> <lang>=<target.json> [<lang>=<target.json> ...]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ai_localizer=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (source, targets) = parse_args(&args)?;

    let registry = ProviderRegistry::builtin();
    let provider = ProviderConfig::from_env(&registry)?;
    let options = RunOptions::from_env()?;
    let executor = Arc::new(
        RequestExecutor::new(provider, &registry, RetryPolicy::for_run(&options))
            .context("Failed to set up provider")?,
    );

    let mut tasks = Vec::with_capacity(targets.len());
    for (code, output) in targets {
        let document = JsonResourceDocument::open(&source, &output)?;
        tasks.push(LanguageTask::new(Language::from_code(&code), document, output));
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight requests");
            on_signal.cancel();
        }
    });

    let result = translate_documents(tasks, executor.clone(), &options, cancel).await;

    let report = executor.metrics().report();
    info!("Request metrics: {}", serde_json::to_string(&report)?);

    let summary = result?;
    info!(
        "Done: {} unit(s) translated in {} language(s){}",
        summary.units_translated,
        summary.languages,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<(PathBuf, Vec<(String, PathBuf)>)> {
    let (source, rest) = args.split_first().context(USAGE)?;
    if rest.is_empty() {
        anyhow::bail!(USAGE);
    }

    let targets = rest
        .iter()
        .map(|arg| {
            let (code, path) = arg
                .split_once('=')
                .filter(|(code, path)| !code.is_empty() && !path.is_empty())
                .with_context(|| format!("Invalid target '{}'. {}", arg, USAGE))?;
            Ok((code.to_string(), PathBuf::from(path)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((PathBuf::from(source), targets))
}
