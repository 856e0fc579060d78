use std::sync::Arc;

use anyhow::Result;
use cancellable_search::{
    config::SearchConfig, search, with_timeout, CancellationToken, InterruptListener, MockBackend,
};
use rt_local::runtime::core::run;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = SearchConfig::default();
    let backend = Arc::new(match config.seed {
        Some(seed) => MockBackend::with_seed(config.latency, seed),
        None => MockBackend::from_entropy(config.latency),
    });

    let (cts, _release) = with_timeout(&CancellationToken::default(), config.timeout)?;
    let listener = InterruptListener::install()?;
    let _interrupt = listener.listen({
        let cts = cts.clone();
        move || cts.cancel()
    });

    match run(search(
        backend,
        &cts.token(),
        config.origin,
        config.destination,
    )) {
        Ok(routes) => println!("got results: {routes:?}"),
        Err(e) if e.reason().is_some() => println!("got error: {e}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
