//! MongoDB connection management with pool configuration and health checking

use crate::collection::MongoCollection;
use crate::config::StoreConfig;
use crate::Result;
use bson::{doc, Document as BsonDocument};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use shelter_common::ShelterError;

/// MongoDB connection bound to one database
pub struct Connection {
    database: Database,
    database_name: String,
}

impl Connection {
    /// Create a new MongoDB connection from a store configuration
    ///
    /// The driver connects lazily; call [`Connection::ping`] to find out
    /// whether the server is actually reachable. Credentials echoed in
    /// driver errors are masked.
    pub async fn with_config(config: &StoreConfig) -> Result<Self> {
        let scrub = |err: mongodb::error::Error| {
            ShelterError::from(err).map_message(|message| config.redact_secrets(message))
        };
        let mut client_options = ClientOptions::parse(config.uri.as_str())
            .await
            .map_err(scrub)?;

        let pool = &config.pool;
        if let Some(min) = pool.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = pool.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = pool.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = pool.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = pool.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = pool.app_name.clone() {
            client_options.app_name = Some(app);
        }

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options).map_err(scrub)?;
        let database = client.database(&config.database);

        Ok(Self {
            database,
            database_name: config.database.clone(),
        })
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the database name
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Get an untyped collection wrapped for the store
    pub fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection::new(self.database.collection::<BsonDocument>(name))
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| ShelterError::Connection(format!("Ping failed: {}", e)))
    }
}
