//! Protocol-extension handlers and the IQ dispatcher.
//!
//! [`Modules`] builds the enabled handlers from [`ModulesConfig`] in a fixed
//! order. Handlers that depend on others receive them as constructor
//! arguments, so the construction order doubles as the dependency order:
//!
//! disco → roster → last activity → private → vCard → registration →
//! version → offline → blocking command → ping
//!
//! The same ordered list drives IQ dispatch (first match wins) and shutdown
//! (reverse order).

pub mod config;
pub mod offline;
pub mod roster;
pub mod shutdown;
pub mod xep0012;
pub mod xep0030;
pub mod xep0049;
pub mod xep0054;
pub mod xep0077;
pub mod xep0092;
pub mod xep0191;
pub mod xep0199;

pub use config::{ModuleName, ModulesConfig, OfflineConfig, RegistrationConfig, VersionConfig};
pub use offline::Offline;
pub use roster::Roster;
pub use shutdown::{OrderedShutdown, ShutdownError};
pub use xep0012::LastActivity;
pub use xep0030::DiscoInfo;
pub use xep0049::Private;
pub use xep0054::VCard;
pub use xep0077::Register;
pub use xep0092::Version;
pub use xep0191::BlockingCommand;
pub use xep0199::Ping;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use xmpp_parsers::iq::{Iq, IqType};

use crate::c2s::C2sStream;
use crate::error::iq_error_reply;
use crate::router::Router;
use crate::storage::Storage;
use crate::XmppError;

/// A server-side protocol extension.
#[async_trait]
pub trait Module: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Release resources. Returns once the module has stopped.
    async fn shutdown(&self) {}

    /// The IQ capability of this module, if it has one.
    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        None
    }
}

/// A module answering IQ requests.
#[async_trait]
pub trait IqHandler: Module {
    /// Whether this handler takes the IQ.
    fn matches_iq(&self, iq: &Iq) -> bool;

    /// Handle the IQ, replying on `stream`.
    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>);
}

/// Send a handler's outcome back to the requester, as a result or an error.
pub(crate) fn send_reply(stream: &dyn C2sStream, iq: &Iq, outcome: Result<Iq, XmppError>) {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(e) => {
            debug!(id = %iq.id, error = %e, "IQ request failed");
            iq_error_reply(iq, &e)
        }
    };
    stream.send_element(reply.into());
}

/// The enabled extension handlers, in construction order.
pub struct Modules {
    modules: Vec<Arc<dyn Module>>,
    offline: Option<Arc<Offline>>,
}

impl Modules {
    /// Build every enabled handler.
    pub fn new(config: &ModulesConfig, router: Arc<Router>, storage: Arc<dyn Storage>) -> Self {
        let mut modules: Vec<Arc<dyn Module>> = Vec::new();

        let disco = Arc::new(DiscoInfo::new(Arc::clone(&router), Arc::clone(&storage)));
        modules.push(disco.clone());

        let roster = if config.is_enabled(ModuleName::Roster) {
            let roster = Arc::new(Roster::new(Arc::clone(&router), Arc::clone(&storage)));
            modules.push(roster.clone());
            Some(roster)
        } else {
            None
        };

        if config.is_enabled(ModuleName::LastActivity) {
            modules.push(Arc::new(LastActivity::new(&disco, Arc::clone(&router))));
        }
        if config.is_enabled(ModuleName::Private) {
            modules.push(Arc::new(Private::new(Arc::clone(&storage))));
        }
        if config.is_enabled(ModuleName::Vcard) {
            modules.push(Arc::new(VCard::new(&disco, Arc::clone(&storage))));
        }
        if config.is_enabled(ModuleName::Registration) {
            modules.push(Arc::new(Register::new(
                &disco,
                Arc::clone(&storage),
                config.registration.clone(),
            )));
        }
        if config.is_enabled(ModuleName::Version) {
            modules.push(Arc::new(Version::new(&disco, config.version.clone())));
        }

        let offline = if config.is_enabled(ModuleName::Offline) {
            let offline = Arc::new(Offline::new(
                &disco,
                Arc::clone(&router),
                Arc::clone(&storage),
                config.offline.queue_size,
            ));
            modules.push(offline.clone());
            Some(offline)
        } else {
            None
        };

        if config.is_enabled(ModuleName::BlockingCommand) {
            modules.push(Arc::new(BlockingCommand::new(
                &disco,
                roster,
                Arc::clone(&router),
                Arc::clone(&storage),
            )));
        }
        if config.is_enabled(ModuleName::Ping) {
            modules.push(Arc::new(Ping::new(&disco)));
        }

        let modules = Self { modules, offline };
        info!(modules = ?modules.names(), "Modules initialized");
        modules
    }

    /// Wrap an already constructed handler list, in construction order.
    pub fn from_modules(modules: Vec<Arc<dyn Module>>) -> Self {
        Self {
            modules,
            offline: None,
        }
    }

    /// Names of the handlers, in construction order.
    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// The offline storage handler, when enabled.
    pub fn offline(&self) -> Option<&Arc<Offline>> {
        self.offline.as_ref()
    }

    /// Dispatch an IQ to the first handler that matches it.
    ///
    /// Unmatched `get`/`set` requests are answered with `service-unavailable`;
    /// unmatched results and errors are dropped.
    #[instrument(skip(self, iq, stream), fields(id = %iq.id, username = %stream.username()))]
    pub async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        for module in &self.modules {
            if let Some(handler) = module.as_iq_handler() {
                if handler.matches_iq(&iq) {
                    debug!(module = module.name(), "Dispatching IQ");
                    handler.process_iq(iq, stream).await;
                    return;
                }
            }
        }

        match iq.payload {
            IqType::Get(_) | IqType::Set(_) => {
                debug!("No handler for IQ request");
                let reply = iq_error_reply(&iq, &XmppError::service_unavailable(None));
                stream.send_element(reply.into());
            }
            IqType::Result(_) | IqType::Error(_) => {
                debug!("Dropping unmatched IQ response");
            }
        }
    }

    /// Shut every handler down in reverse construction order within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        OrderedShutdown::new(self.modules.clone()).run(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouterConfig;
    use crate::storage::InMemoryStorage;

    fn build(enabled: &[ModuleName]) -> Modules {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let router = Arc::new(Router::new(&RouterConfig::default(), Arc::clone(&storage)).unwrap());
        let config = ModulesConfig {
            enabled: enabled.iter().copied().collect(),
            ..Default::default()
        };
        Modules::new(&config, router, storage)
    }

    #[test]
    fn test_disco_is_always_enabled() {
        let modules = build(&[]);
        assert_eq!(modules.names(), vec!["disco"]);
        assert!(modules.offline().is_none());
    }

    #[test]
    fn test_construction_order_ignores_config_order() {
        let modules = build(&[
            ModuleName::Ping,
            ModuleName::BlockingCommand,
            ModuleName::Offline,
            ModuleName::Version,
            ModuleName::Registration,
            ModuleName::Vcard,
            ModuleName::Private,
            ModuleName::LastActivity,
            ModuleName::Roster,
        ]);
        assert_eq!(
            modules.names(),
            vec![
                "disco",
                "roster",
                "last_activity",
                "private",
                "vcard",
                "registration",
                "version",
                "offline",
                "blocking_command",
                "ping",
            ]
        );
        assert!(modules.offline().is_some());
    }
}
