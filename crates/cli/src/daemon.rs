//! Daemon loop: queue watcher and inbound poller running side by side until
//! a shutdown signal arrives.

use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::Context,
    opsrelay_config::{Credentials, RelayConfig, Severity, validate},
    opsrelay_inbound::{AgentNotifier, InboxStore, LongPoller},
    opsrelay_outbound::{Executor, ExecutorLimits, Translator, UrlRules},
    opsrelay_queue::{Dispatcher, QueueStore, QueueWatcher},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::instance::{PidFile, open_lock};

const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

pub async fn run(data_dir: &Path, config: RelayConfig) -> anyhow::Result<()> {
    let mut lock = open_lock(data_dir)?;
    let _lock_guard = lock.try_write().with_context(|| {
        format!(
            "another opsrelay instance is already running on {}",
            data_dir.display()
        )
    })?;
    let _pid = PidFile::create(data_dir)?;

    let diagnostics = validate(&config);
    for d in &diagnostics.diagnostics {
        warn!(diagnostic = %d, "config problem");
    }
    let errors = diagnostics.count(Severity::Error);
    if errors > 0 {
        warn!(errors, "config has errors, run `opsrelay doctor` for details");
    }

    let credentials = Credentials::resolve(&config);

    let store = Arc::new(QueueStore::new(data_dir));
    store.initialize().await?;
    let inbox = Arc::new(InboxStore::new(data_dir));
    inbox.initialize().await?;

    let rules = UrlRules::new(&config.allowed_urls);
    info!(patterns = rules.len(), "url allowlist loaded");
    let executor = Executor::new(
        ExecutorLimits::from_config(&config),
        rules,
        credentials.bot_token.clone(),
    )?;
    let translator = Translator::new(config.endpoints.clone(), &credentials);
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), translator, executor));
    let watcher = QueueWatcher::start(Arc::clone(&store), dispatcher.clone(), WATCH_DEBOUNCE)?;

    let notifier = Arc::new(AgentNotifier::new(
        credentials.hook_url.as_deref(),
        credentials.hook_token.clone(),
        inbox.path().to_path_buf(),
        Duration::from_secs(config.hook_timeout),
    )?);
    if !notifier.is_configured() {
        warn!("wake hook not configured, new messages are only written to the inbox");
    }

    let cancel = CancellationToken::new();
    let poll_task = match &credentials.bot_token {
        Some(token) => {
            let poller = LongPoller::new(
                &config.endpoints.telegram_api,
                token,
                config.poll_timeout,
                Arc::clone(&inbox),
                notifier.clone(),
            )
            .await?;
            let interval = Duration::from_millis(config.poll_interval_ms);
            Some(tokio::spawn(poll_loop(poller, interval, cancel.clone())))
        },
        None => {
            warn!(env = %config.token_env, "no bot token, inbound polling disabled");
            None
        },
    };

    info!(data_dir = %data_dir.display(), "opsrelay running");
    shutdown_signal().await;
    info!("shutting down");

    watcher.stop().await;
    cancel.cancel();
    if let Some(task) = poll_task {
        match task.await {
            Ok(poller) => poller.close(),
            Err(e) => error!(error = %e, "poll task ended abnormally"),
        }
    }

    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => dispatcher.close(),
        Err(_) => warn!("dispatcher still in use at shutdown"),
    }
    match Arc::try_unwrap(notifier) {
        Ok(notifier) => notifier.close(),
        Err(_) => warn!("notifier still in use at shutdown"),
    }

    info!("opsrelay stopped");
    Ok(())
}

/// Poll until cancelled, pausing `interval` between rounds. Cancellation is
/// only observed between rounds; a round in progress always finishes. Hands
/// the poller back so the caller can close it.
async fn poll_loop(
    mut poller: LongPoller,
    interval: Duration,
    cancel: CancellationToken,
) -> LongPoller {
    while !cancel.is_cancelled() {
        poller.poll().await;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {},
        }
    }
    info!(offset = poller.offset(), "inbound polling stopped");
    poller
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received interrupt"),
        () = terminate => info!("received SIGTERM"),
    }
}
