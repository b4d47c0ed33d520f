//! The composed notification engine and its builder.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::preferences::{InMemoryPreferenceStore, PreferenceStore};
use crate::providers::{
    ChannelProvider, HttpGatewayProvider, LogProvider, ProviderRegistry, SmtpProvider, TelegramProvider,
};
use crate::queue::{
    Dispatcher, InMemoryQueueStore, JobFilter, NewJob, NotificationQueue, QueueEvent, QueueStats, QueueStore,
};
use crate::rules::{InMemoryDirectory, RecipientDirectory, RuleEngine, TriggerOutcome};
use crate::templates::{NotificationTemplate, TemplateRegistry};
use crate::{Error, Result};

/// Finished-job retention is capped at about a century.
const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Result of [`NotificationEngine::send_bulk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub job_ids: Vec<String>,
    /// One message per rejected job, prefixed with its index in the batch.
    pub errors: Vec<String>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct NotificationEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    queue: Arc<NotificationQueue>,
    rules: Arc<RuleEngine>,
    dispatcher: Arc<Dispatcher>,
    preferences: Arc<dyn PreferenceStore>,
    directory: Arc<dyn RecipientDirectory>,
    running: Mutex<Option<Running>>,
}

impl NotificationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Spawn the dispatch loop. Calling it on a running engine does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Notification engine already running");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let dispatcher = self.dispatcher.clone();
        let queue = self.queue.clone();
        let clock = self.clock.clone();
        let tick_interval = self.config.tick_interval();
        let retention = self
            .config
            .queue
            .finished_retention_secs
            .map(|secs| chrono::Duration::seconds(secs.min(MAX_RETENTION_SECS) as i64));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Dispatch loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = dispatcher.tick().await {
                            error!(error = %e, "Dispatch tick failed");
                        }
                        if let Some(retention) = retention
                            && let Err(e) = queue.purge_finished(clock.now() - retention).await
                        {
                            warn!(error = %e, "Failed to purge finished jobs");
                        }
                    }
                }
            }
        });

        info!(
            tick_interval_ms = self.config.dispatcher.tick_interval_ms,
            max_concurrent = self.queue.settings().max_concurrent,
            "Notification engine started"
        );
        *running = Some(Running { cancel, handle });
    }

    /// Stop the dispatch loop, letting an in-progress tick finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running { cancel, handle }) = running else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Dispatch loop ended abnormally");
        }
        info!("Notification engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn trigger_event(&self, event: &str, data: &Value, user_id: Option<&str>) -> TriggerOutcome {
        self.rules.trigger_event(event, data, user_id).await
    }

    /// Enqueue a batch. Each job is validated on its own; one rejection does
    /// not affect the others.
    pub async fn send_bulk(&self, jobs: Vec<NewJob>) -> BulkOutcome {
        let mut outcome = BulkOutcome {
            total: jobs.len(),
            ..Default::default()
        };
        for (index, job) in jobs.into_iter().enumerate() {
            match self.queue.add_to_queue(job).await {
                Ok(id) => {
                    outcome.accepted += 1;
                    outcome.job_ids.push(id);
                }
                Err(e) => {
                    outcome.rejected += 1;
                    outcome.errors.push(format!("#{index}: {e}"));
                }
            }
        }
        info!(
            total = outcome.total,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "Bulk send queued"
        );
        outcome
    }

    /// Tick until nothing is left to send before `timeout` elapses, then
    /// return the final stats. Jobs scheduled past the deadline stay queued.
    pub async fn drain(&self, timeout: Duration) -> Result<QueueStats> {
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            let report = self.dispatcher.tick().await?;
            if report.skipped {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            if report.dispatched > 0 {
                continue;
            }

            let next = self
                .queue
                .get_all(&JobFilter::dispatchable())
                .await?
                .into_iter()
                .filter_map(|job| job.scheduled_for)
                .min();
            let Some(next) = next else {
                break;
            };
            let wait = (next - self.clock.now()).to_std().unwrap_or_default();
            if tokio::time::Instant::now() + wait >= deadline {
                debug!(next = %next, "Next scheduled job is past the drain deadline");
                break;
            }
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }

        self.queue.get_queue_stats().await
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub fn rules(&self) -> &Arc<RuleEngine> {
        &self.rules
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    pub fn directory(&self) -> &Arc<dyn RecipientDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Assembles a [`NotificationEngine`]. Anything not supplied falls back to
/// the in-memory implementation or is built from the config.
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn QueueStore>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    directory: Option<Arc<dyn RecipientDirectory>>,
    providers: Vec<Arc<dyn ChannelProvider>>,
    templates: Vec<NotificationTemplate>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            store: None,
            preferences: None,
            directory: None,
            providers: Vec::new(),
            templates: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn RecipientDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Register a provider, replacing any configured one for its channel.
    pub fn provider(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn template(mut self, template: NotificationTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn build(self) -> Result<NotificationEngine> {
        let Self {
            config,
            clock,
            store,
            preferences,
            directory,
            providers: extra_providers,
            templates: extra_templates,
        } = self;
        config.validate()?;

        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));

        let templates = Arc::new(TemplateRegistry::with_builtin());
        for template in config.templates.iter().cloned().chain(extra_templates) {
            templates.register(template)?;
        }

        let providers = Arc::new(configured_providers(&config)?);
        for provider in extra_providers {
            providers.register(provider);
        }
        if providers.channels().is_empty() {
            warn!("No channel providers registered; every enqueue will be rejected");
        }

        let queue = Arc::new(NotificationQueue::new(
            store.unwrap_or_else(|| Arc::new(InMemoryQueueStore::new())),
            providers,
            templates,
            clock.clone(),
            config.queue_settings(),
        ));
        let preferences =
            preferences.unwrap_or_else(|| Arc::new(InMemoryPreferenceStore::new(clock.clone())));
        let directory = directory.unwrap_or_else(|| {
            Arc::new(config.contacts.iter().cloned().collect::<InMemoryDirectory>())
        });

        let rules = Arc::new(RuleEngine::new(
            queue.clone(),
            directory.clone(),
            preferences.clone(),
        ));
        for rule in &config.rules {
            rules
                .create_rule(rule.clone())
                .map_err(|e| Error::config(format!("Rule {}: {e}", rule.id)))?;
        }

        let dispatcher = Arc::new(Dispatcher::new(queue.clone(), preferences.clone()));

        info!(
            rules = config.rules.len(),
            templates = queue.templates().list().len(),
            "Notification engine built"
        );
        Ok(NotificationEngine {
            config,
            clock,
            queue,
            rules,
            dispatcher,
            preferences,
            directory,
            running: Mutex::new(None),
        })
    }
}

fn configured_providers(config: &EngineConfig) -> Result<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    let providers = &config.providers;

    for &channel in &providers.log_channels {
        registry.register(Arc::new(LogProvider::new(channel)));
    }
    if let Some(smtp) = &providers.smtp {
        registry.register(Arc::new(SmtpProvider::new(smtp.clone())?));
    }
    if let Some(telegram) = &providers.telegram {
        registry.register(Arc::new(TelegramProvider::new(telegram.clone())?));
    }
    for gateway in &providers.gateways {
        registry.register(Arc::new(HttpGatewayProvider::new(gateway.clone())?));
    }
    debug!(channels = ?registry.channels(), "Configured channel providers");
    Ok(registry)
}
