//! Runtime orchestration.
//!
//! A [`TrellisRuntime`] owns a configured [`Router`] and drives its
//! lifecycle: startup announcement, one spawned task per inbound event,
//! and a signal-driven shutdown announcement.
//!
//! ```rust,ignore
//! use trellis_runtime::TrellisRuntime;
//!
//! let runtime = TrellisRuntime::builder()
//!     .config_file("trellis.toml")
//!     .sender(my_sender)
//!     .build()?;
//! runtime.router().register_command(&Scope::any(), my_command);
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use trellis_core::{BoxedSender, BoxedStore, MemoryStore, MessageEvent};
use trellis_router::{EventKind, Router};

use crate::config::{ConfigLoader, TrellisConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// The runtime wrapper around a [`Router`].
pub struct TrellisRuntime {
    config: TrellisConfig,
    router: Router,
}

impl TrellisRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a pre-loaded configuration.
    ///
    /// Initializes logging from the configuration; the store defaults to
    /// an in-memory one.
    pub fn from_config(
        config: TrellisConfig,
        sender: BoxedSender,
        store: Option<BoxedStore>,
    ) -> Self {
        logging::init_from_config(&config.logging);

        let router_config = config.router.to_router_config();
        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let router = Router::with_store(sender, store, router_config);

        info!(
            log_level = %config.logging.level,
            prefixes = ?config.router.prefixes,
            "runtime initialized from configuration"
        );

        Self { config, router }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// The router, for registering middleware, commands, and listeners.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Feeds an inbound event into the router on its own task.
    ///
    /// Events processed this way run concurrently with each other.
    pub fn feed(&self, event: MessageEvent) -> JoinHandle<()> {
        let router = self.router.clone();
        tokio::spawn(async move {
            let outcome = router.dispatch(event).await;
            debug!(
                serial = outcome.serial,
                faulted = outcome.faulted,
                command = ?outcome.executed_command,
                "dispatch finished"
            );
        })
    }

    /// Runs until a shutdown signal is received.
    ///
    /// Broadcasts the startup notice first and the shutdown notice after
    /// the signal arrives.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.router.announce(EventKind::Startup).await;
        info!("runtime is now running, press Ctrl+C to stop");

        self.wait_for_shutdown().await?;

        self.router.announce(EventKind::Shutdown).await;
        info!("runtime stopped");
        Ok(())
    }

    /// Runs until the given future resolves instead of a signal.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.router.announce(EventKind::Startup).await;
        shutdown.await;
        self.router.announce(EventKind::Shutdown).await;
        Ok(())
    }

    /// Waits for Ctrl+C or, on unix, SIGTERM.
    async fn wait_for_shutdown(&self) -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("received Ctrl+C, shutting down");
        }

        Ok(())
    }
}

/// Builder for creating a [`TrellisRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    sender: Option<BoxedSender>,
    store: Option<BoxedStore>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            sender: None,
            store: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Sets the outbound sender. Required.
    pub fn sender(mut self, sender: BoxedSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Sets the user-record store. Defaults to an in-memory store.
    pub fn store(mut self, store: BoxedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads the configuration and builds the runtime.
    ///
    /// # Panics
    ///
    /// Panics if no sender was set.
    pub fn build(self) -> RuntimeResult<TrellisRuntime> {
        let config = self.config_loader.load()?;
        let sender = self.sender.expect("RuntimeBuilder requires a sender");
        Ok(TrellisRuntime::from_config(config, sender, self.store))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use trellis_core::{MessageId, SendError, Sender, Target};
    use trellis_router::listener_fn;
    use trellis_core::Scope;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullSender;

    #[async_trait]
    impl Sender for NullSender {
        async fn send(&self, _target: Target, _text: &str) -> Result<MessageId, SendError> {
            Ok("0".to_string())
        }
    }

    #[tokio::test]
    async fn run_until_announces_lifecycle() {
        let runtime =
            TrellisRuntime::from_config(TrellisConfig::default(), Arc::new(NullSender), None);

        let startups = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        for (kind, counter) in [
            (EventKind::Startup, Arc::clone(&startups)),
            (EventKind::Shutdown, Arc::clone(&shutdowns)),
        ] {
            runtime.router().on(
                &Scope::any(),
                kind,
                listener_fn(move |_notice| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        runtime.run_until(async {}).await.unwrap();
        assert_eq!(startups.load(Ordering::SeqCst), 1);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fed_events_are_dispatched_concurrently() {
        let runtime =
            TrellisRuntime::from_config(TrellisConfig::default(), Arc::new(NullSender), None);

        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            runtime.router().on(
                &Scope::any(),
                EventKind::Message,
                listener_fn(move |_notice| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        let handles: Vec<_> = (0..4)
            .map(|i| runtime.feed(MessageEvent::private(i, 100, "hello")))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}
