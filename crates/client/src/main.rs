//! `coopdesk-watch`: prints the first page of one collection and reprints it
//! whenever the server announces a change.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, bail};
use coopdesk_client::catalog::{self, CatalogEntry};
use coopdesk_client::{Client, ClientConfig, QueryOptions, Scope, TracingNotifier};
use coopdesk_core::{BranchId, PaginatedQuery};
use coopdesk_realtime::RealtimeConnection;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coopdesk_observability::init();

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let client = Client::new(config, Arc::new(TracingNotifier))?;

    let resource_name = std::env::var("COOPDESK_WATCH_RESOURCE").unwrap_or_else(|_| "branch".to_string());
    let Some(entry) = catalog::ALL.into_iter().find(|e| e.prefix == resource_name) else {
        bail!("unknown resource {resource_name:?}");
    };

    let branch = std::env::var("COOPDESK_BRANCH_ID")
        .ok()
        .map(|raw| raw.parse::<BranchId>())
        .transpose()
        .context("invalid COOPDESK_BRANCH_ID")?;
    client.state().set_scope(Scope {
        organization_id: None,
        branch_id: branch.clone(),
    });

    let (changed_tx, changed_rx) = mpsc::unbounded_channel::<()>();
    let realtime = match (&client.config().realtime_url, &branch) {
        (Some(url), Some(branch)) => Some(start_realtime(&client, url, branch, entry, changed_tx).await?),
        _ => {
            tracing::warn!("realtime disabled (set COOPDESK_REALTIME_URL and COOPDESK_BRANCH_ID to enable)");
            // Nothing will announce changes; print once and exit.
            drop(changed_tx);
            None
        }
    };

    let handle = client.entity::<serde_json::Value, serde_json::Value, serde_json::Value>(entry)?;
    let query = PaginatedQuery::new(entry.default_pagination);
    let options = QueryOptions::default();

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let (handle, query, options) = (&handle, &query, &options);
    watch_loop(changed_rx, shutdown, move || async move {
        match handle.get_paginated(query, options).await {
            Ok(page) => {
                tracing::info!(
                    resource = entry.prefix,
                    total_size = page.total_size,
                    total_page = page.total_page,
                    "page refreshed"
                );
                match serde_json::to_string_pretty(&page.data) {
                    Ok(json) => println!("{json}"),
                    Err(err) => tracing::error!(error = %err, "failed to render page"),
                }
            }
            Err(err) => tracing::error!(resource = entry.prefix, error = %err, "fetch failed"),
        }
    })
    .await;

    if let Some((connection, mut invalidator)) = realtime {
        invalidator.close();
        connection.disconnect().await;
    }
    tracing::info!("shutting down");
    Ok(())
}

/// Run `refresh` once, then again after every change notification, until
/// the change feed closes or `shutdown` resolves.
async fn watch_loop<S, R, Fut>(mut changed: mpsc::UnboundedReceiver<()>, shutdown: S, mut refresh: R)
where
    S: Future<Output = ()>,
    R: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        refresh().await;

        tokio::select! {
            _ = &mut shutdown => break,
            next = changed.recv() => {
                if next.is_none() {
                    break;
                }
                // Coalesce bursts into one refetch.
                while changed.try_recv().is_ok() {}
            }
        }
    }
}

#[cfg(feature = "redis")]
async fn start_realtime(
    client: &Client,
    url: &str,
    branch: &BranchId,
    entry: CatalogEntry,
    changed: mpsc::UnboundedSender<()>,
) -> anyhow::Result<(Arc<RealtimeConnection>, coopdesk_client::RealtimeInvalidator)> {
    let transport = coopdesk_realtime::RedisPubSubTransport::new(url)
        .map_err(coopdesk_core::ApiError::from)
        .context("invalid COOPDESK_REALTIME_URL")?;
    let connection = RealtimeConnection::new(Arc::new(transport));
    connection.on_connection_lost(|reason| tracing::error!(reason, "realtime connection lost"));
    connection.connect().await?;

    let mut invalidator = client.invalidator(connection.clone());
    let mut rules = catalog::branch_invalidation_rules(branch)?;
    for event in catalog::EventKind::ALL {
        let subject = if entry.prefix == catalog::BRANCH.prefix {
            entry.subject(event, branch.as_str())?
        } else {
            entry.branch_subject(event, branch)?
        };
        rules.retain(|rule| rule.subject != subject);

        // Watch subscription: invalidate first, then wake the printer.
        let cache = client.cache().clone();
        let prefix = entry.prefix;
        let changed = changed.clone();
        invalidator
            .install_with(subject, move |_| {
                cache.invalidate_prefix(prefix);
                let _ = changed.send(());
            })
            .await?;
    }
    invalidator.install_all(rules).await?;

    tracing::info!(subjects = invalidator.active_subjects().len(), "realtime invalidation installed");
    Ok((connection, invalidator))
}

#[cfg(not(feature = "redis"))]
async fn start_realtime(
    _client: &Client,
    _url: &str,
    _branch: &BranchId,
    _entry: CatalogEntry,
    _changed: mpsc::UnboundedSender<()>,
) -> anyhow::Result<(Arc<RealtimeConnection>, coopdesk_client::RealtimeInvalidator)> {
    bail!("realtime requires the `redis` feature (rebuild with --features redis)")
}
