use std::{env, fs::File, io, path::Path, sync::Arc};

use wallet_ledger::{
    AccountStore, Config, Ledger, TracingDlq, TransferEngine,
    api::{self, SharedEngine},
    ingestion::{self, CsvReader},
    output::CsvOutput,
    telemetry,
};

#[tokio::main] // using Tokio runtime for async
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = Config::from_env().with_args(env::args().skip(1));
    tracing::info!(?config, "starting wallet ledger");

    let engine: SharedEngine = Arc::new(TransferEngine::new(
        Arc::new(AccountStore::new()),
        Arc::new(Ledger::new()),
        TracingDlq::default(),
    ));

    if let Some(path) = &config.accounts_csv {
        let file = File::open(path)?;
        ingestion::seed_accounts(file, engine.accounts(), engine.dlq());
    }

    if let Some(path) = config.journal_csv.as_deref().filter(|p| p.exists()) {
        restore_journal(&engine, path)?;
    }

    match &config.operations_csv {
        Some(path) => run_batch(&engine, path).await?,
        None => serve(engine.clone(), &config.listen_addr).await?,
    }

    teardown(&engine, &config)?;
    Ok(())
}

fn restore_journal(engine: &SharedEngine, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entries = ingestion::read_journal(File::open(path)?);
    engine.restore(entries)?;

    let unbalanced: Vec<_> = engine
        .reconcile_all()
        .into_iter()
        .filter(|r| !r.balanced)
        .map(|r| r.username)
        .collect();
    if !unbalanced.is_empty() {
        return Err(format!(
            "journal {} does not reconcile for: {}",
            path.display(),
            unbalanced.join(", ")
        )
        .into());
    }
    Ok(())
}

async fn run_batch(engine: &SharedEngine, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = CsvReader::new(File::open(path)?);
    engine.process(&mut reader).await;

    let mut output = CsvOutput::new(io::stdout());
    output.write_balances(&engine.accounts().snapshot())?;
    Ok(())
}

async fn serve(engine: SharedEngine, listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = api::build_app(engine);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn teardown(engine: &SharedEngine, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &config.journal_csv {
        let mut journal = CsvOutput::new(File::create(path)?);
        journal.write_journal(&engine.ledger().entries())?;
        tracing::info!(path = %path.display(), entries = engine.ledger().len(), "journal exported");
    }

    let report = engine.reconcile_all();
    let unbalanced: Vec<_> = report.iter().filter(|r| !r.balanced).collect();
    for r in &unbalanced {
        tracing::error!(
            username = %r.username,
            stored = %r.stored,
            derived = %r.derived,
            "balance does not match ledger"
        );
    }
    tracing::info!(
        accounts = report.len(),
        unbalanced = unbalanced.len(),
        rejected = engine.dlq().rejected(),
        "shutdown complete"
    );
    Ok(())
}
