use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{error, info, warn};
use sea_orm::DatabaseConnection;

use crate::accounts::AccountService;
use crate::chat::ChatService;
use crate::configuration::config::Config;
use crate::error_handling::types::*;
use crate::generation::GenerationService;
use crate::provider::{GeminiClient, ImageApi};
use crate::storage::bucket_storage::BucketStorage;
use crate::storage::database_storage;
use crate::storage::storage_trait::ObjectStore;
use crate::storage::ObjectStorage;
use crate::web_interface::web_server::WebServer;

/// Shared state handed to every request handler.
pub struct AppContext {
    pub config: Config,
    pub db: DatabaseConnection,
    pub accounts: AccountService,
    pub generations: GenerationService,
    pub chat: ChatService,
}

impl AppContext {
    /// Wires the services over an open database, an image API client and a bucket backend.
    pub fn new(config: Config, db: DatabaseConnection, api: Arc<dyn ImageApi>, remote: Arc<dyn ObjectStore>) -> Self {
        let storage = ObjectStorage::new(config.server.instance_dir.clone(), remote);
        let accounts = AccountService::new(db.clone(), config.server.session_ttl_hours);
        let generations = GenerationService::new(
            db.clone(),
            storage.clone(),
            api.clone(),
            config.images,
            config.generation_storage.clone(),
        );
        let chat = ChatService::new(db.clone(), storage, api, config.images, config.chat_storage.clone());
        Self {
            config,
            db,
            accounts,
            generations,
            chat,
        }
    }
}

pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Creating controller");
        fs::create_dir_all(&config.server.instance_dir).map_err(|e| {
            error!(
                "Unable to create instance directory {}: {}",
                config.server.instance_dir.display(),
                e
            );
            ControllerError::from(ConfigError::from(e))
        })?;
        if config.provider.api_key.is_none() {
            warn!("No API key configured, generation requests will fail until one is set");
        }
        Ok(Self { config })
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ControllerError> {
        let ip: IpAddr = self.config.server.bind_address.trim().parse().map_err(|_| {
            ControllerError::from(ConfigError::NotInRange(format!(
                "server.bind_address is not an IP address: {}",
                self.config.server.bind_address
            )))
        })?;
        Ok(SocketAddr::new(ip, self.config.server.port))
    }

    /// Opens the database, bootstraps the initial account and serves HTTP until shutdown.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        let addr = self.bind_address()?;
        let db = database_storage::connect(&self.config.database_url()).await?;

        let api: Arc<dyn ImageApi> = Arc::new(GeminiClient::new(&self.config.provider));
        let remote: Arc<dyn ObjectStore> = Arc::new(BucketStorage::new(
            &self.config.bucket_api.api_base,
            self.config.bucket_api.access_token.clone(),
        ));
        let ctx = Arc::new(AppContext::new(self.config.clone(), db, api, remote));

        if let Some(user) = ctx.accounts.bootstrap_admin(&self.config.bootstrap).await? {
            info!("Initial administrator {} created", user.username);
        }

        info!("Starting web server on {}", addr);
        WebServer::new(ctx).start(addr).await?;
        info!("Web server stopped");
        Ok(())
    }
}
