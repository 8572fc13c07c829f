use std::sync::Arc;

use crate::cache::QueryCache;
use crate::client::CommandClient;
use crate::config::BridgeConfig;
use crate::error::CommandError;
use crate::events::EventBus;
use crate::ipc::IpcTransport;
use crate::logger::{self, LoggerOptions};
use crate::resources::{Settings, System, Users};
use crate::transport::Transport;

/// Everything one UI window needs, sharing a single transport and cache.
#[derive(Clone)]
pub struct Session {
    pub client: CommandClient,
    pub cache: QueryCache,
    pub events: EventBus,
    pub users: Users,
    pub settings: Settings,
    pub system: System,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let client = CommandClient::new(Arc::clone(&transport));
        let cache = QueryCache::new();
        let events = EventBus::new(transport);
        Self {
            users: Users::new(client.clone(), cache.clone()),
            settings: Settings::new(client.clone(), cache.clone(), events.clone()),
            system: System::new(client.clone()),
            client,
            cache,
            events,
        }
    }

    /// Connects over TCP and installs the process-wide remote logger.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, CommandError> {
        let transport = IpcTransport::connect(&config.backend_addr).await?;
        let session = Self::new(transport);
        logger::init(
            session.client.clone(),
            LoggerOptions {
                dev_console: config.dev_console,
                target: config.log_target.clone(),
            },
        );
        Ok(session)
    }
}
