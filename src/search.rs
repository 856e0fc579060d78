use std::{sync::Arc, thread};

use futures::channel::oneshot;
use tracing::trace;

use crate::{Backend, CancellationToken, Error, Result, RouteQuery};

/// Search routes from `origin` to `destination`, giving up when `ct` is cancelled.
///
/// The backend runs on its own thread and receives `ct`, so it stops as soon as the
/// search is abandoned. A result produced after cancellation is dropped.
///
/// # Errors
///
/// - [`Error::Cancelled`] if `ct` fires before the backend answers.
/// - [`Error::WorkerLost`] if the backend thread panics.
/// - [`Error::Spawn`] if the backend thread cannot be started.
pub async fn search<B: Backend>(
    backend: Arc<B>,
    ct: &CancellationToken,
    origin: impl Into<String>,
    destination: impl Into<String>,
) -> Result<Vec<String>> {
    let query = RouteQuery::new(origin, destination);
    let (tx, rx) = oneshot::channel();
    let worker_ct = ct.clone();
    thread::Builder::new()
        .name("route-search".into())
        .spawn(move || {
            let routes = backend.find_routes(&query, &worker_ct);
            if tx.send(routes).is_err() {
                trace!(origin = %query.origin, destination = %query.destination, "search result discarded");
            }
        })
        .map_err(|source| Error::Spawn {
            name: "route-search",
            source,
        })?;

    match ct.run(rx).await {
        Ok(Ok(Ok(routes))) => Ok(routes),
        Ok(Ok(Err(reason))) | Err(reason) => Err(reason.into()),
        Ok(Err(oneshot::Canceled)) => Err(Error::WorkerLost),
    }
}
