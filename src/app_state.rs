//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    analytics::QuerySynthesizer,
    config::ModelConfig,
    db::initialize,
    extraction::TransactionExtractor,
    llm::StructuredCompletionProvider,
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// Turns text and receipt photos into draft transactions.
    pub extractor: Arc<TransactionExtractor>,

    /// Turns analytics questions into SQL.
    pub synthesizer: Arc<QuerySynthesizer>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection and a
    /// language model provider.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// The extractor and synthesizer share `provider`, each using the model
    /// named for it in `config`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        provider: Arc<dyn StructuredCompletionProvider>,
        config: &ModelConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            extractor: Arc::new(TransactionExtractor::new(provider.clone(), config)),
            synthesizer: Arc::new(QuerySynthesizer::new(provider, config)),
        })
    }
}
