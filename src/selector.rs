//! Cascading Selector
//!
//! Database -> schema -> table selection. Changing a parent clears every
//! downstream selection and option list before the child fetch is issued,
//! so options loaded for a previous database are never shown against a new
//! one. Each level has its own generation counter; a response is applied
//! only while its generation is current.

use crate::api::SupersetClient;
use crate::error::AppError;
use crate::fetcher::FetchOutcome;
use crate::models::{Database, DatabaseQuery, TableOption};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Reported when the user can see no database at all
pub const NO_DATABASE_ACCESS: &str = "It seems you don't have access to any database";

/// Notifications for the owner of the selector
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorEvent {
    DatabaseChanged(Option<Database>),
    SchemaChanged {
        database_id: i64,
        schema: Option<String>,
    },
    TableChanged(Option<String>),
    TablesLoaded {
        schema: String,
        count: usize,
    },
    /// The user cannot see any database
    AccessDenied(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorOptions {
    /// Only offer databases exposed in SQL Lab
    pub sql_lab_only: bool,
    /// Load the table list whenever a schema is picked
    pub load_tables: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorState {
    pub database_options: Vec<Database>,
    pub database: Option<Database>,
    pub schema_options: Vec<String>,
    pub schema: Option<String>,
    pub table_options: Vec<TableOption>,
    pub table: Option<String>,
    pub databases_loading: bool,
    pub schemas_loading: bool,
    pub tables_loading: bool,
}

pub struct DatabaseSchemaSelector {
    api: Arc<SupersetClient>,
    options: SelectorOptions,
    events: mpsc::UnboundedSender<SelectorEvent>,
    state: RwLock<SelectorState>,
    database_generation: AtomicU64,
    schema_generation: AtomicU64,
    table_generation: AtomicU64,
}

impl DatabaseSchemaSelector {
    pub fn new(
        api: Arc<SupersetClient>,
        options: SelectorOptions,
        events: mpsc::UnboundedSender<SelectorEvent>,
    ) -> Self {
        Self {
            api,
            options,
            events,
            state: RwLock::new(SelectorState::default()),
            database_generation: AtomicU64::new(0),
            schema_generation: AtomicU64::new(0),
            table_generation: AtomicU64::new(0),
        }
    }

    fn emit(&self, event: SelectorEvent) {
        if self.events.send(event).is_err() {
            debug!("Selector event dropped, receiver closed");
        }
    }

    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(counter: &AtomicU64, generation: u64) -> bool {
        counter.load(Ordering::SeqCst) == generation
    }

    /// Copy of the current selection state
    pub async fn state(&self) -> SelectorState {
        self.state.read().await.clone()
    }

    /// Load the database options, optionally narrowed by a name search.
    ///
    /// An unfiltered load that returns nothing means the user has no
    /// database access; that is reported once as an `AccessDenied` event.
    pub async fn load_databases(&self, search: Option<&str>) -> FetchOutcome {
        let generation = Self::next(&self.database_generation);
        self.state.write().await.databases_loading = true;

        let mut query = DatabaseQuery::all(search);
        if self.options.sql_lab_only {
            query = query.exposed_in_sqllab();
        }
        let unfiltered = search.map_or(true, |s| s.trim().is_empty());
        let result = self.api.list_databases(&query).await;

        let mut state = self.state.write().await;
        if !Self::is_current(&self.database_generation, generation) {
            warn!("Dropping superseded database list response");
            return FetchOutcome::Superseded;
        }
        state.databases_loading = false;

        match result {
            Ok(response) => {
                if response.result.is_empty() && unfiltered {
                    self.emit(SelectorEvent::AccessDenied(NO_DATABASE_ACCESS.to_string()));
                }
                info!("Loaded {} database options", response.result.len());
                state.database_options = response.result;
                FetchOutcome::Applied
            }
            Err(AppError::AccessDenied(message)) => {
                state.database_options.clear();
                self.emit(SelectorEvent::AccessDenied(message));
                FetchOutcome::Failed
            }
            Err(e) => {
                state.database_options.clear();
                self.emit(SelectorEvent::Error(format!(
                    "Error while fetching database list: {}",
                    e.user_message()
                )));
                FetchOutcome::Failed
            }
        }
    }

    /// Select a database (or clear the selection) and load its schemas.
    ///
    /// Schema and table state is reset before the request goes out. A failed
    /// schema fetch leaves the options empty but keeps the database selected.
    pub async fn change_database(&self, database: Option<Database>, force_refresh: bool) -> FetchOutcome {
        let generation = Self::next(&self.schema_generation);
        Self::next(&self.table_generation);

        {
            let mut state = self.state.write().await;
            state.database = database.clone();
            state.schema = None;
            state.schema_options.clear();
            state.table = None;
            state.table_options.clear();
            state.tables_loading = false;
            state.schemas_loading = database.is_some();
        }
        self.emit(SelectorEvent::DatabaseChanged(database.clone()));

        match database {
            Some(db) => self.load_schemas(db.id, force_refresh, generation).await,
            None => FetchOutcome::Applied,
        }
    }

    /// Reload the current database's schemas bypassing the server cache.
    /// Returns `None` when no database is selected.
    pub async fn refresh_schemas(&self) -> Option<FetchOutcome> {
        let generation = Self::next(&self.schema_generation);
        let database_id = {
            let mut state = self.state.write().await;
            let id = state.database.as_ref()?.id;
            state.schemas_loading = true;
            id
        };
        Some(self.load_schemas(database_id, true, generation).await)
    }

    async fn load_schemas(&self, database_id: i64, force: bool, generation: u64) -> FetchOutcome {
        let result = self.api.database_schemas(database_id, force).await;

        let mut state = self.state.write().await;
        if !Self::is_current(&self.schema_generation, generation) {
            warn!("Dropping superseded schema list for database {}", database_id);
            return FetchOutcome::Superseded;
        }
        state.schemas_loading = false;

        match result {
            Ok(schemas) => {
                info!("Loaded {} schemas for database {}", schemas.len(), database_id);
                let dropped = state.schema.as_ref().is_some_and(|s| !schemas.contains(s));
                state.schema_options = schemas;
                if dropped {
                    // Tables still loading for the vanished schema must not land
                    Self::next(&self.table_generation);
                    warn!("Selected schema is gone from database {}", database_id);
                    state.schema = None;
                    state.table_options.clear();
                    state.tables_loading = false;
                    let had_table = state.table.take().is_some();

                    self.emit(SelectorEvent::SchemaChanged {
                        database_id,
                        schema: None,
                    });
                    if had_table {
                        self.emit(SelectorEvent::TableChanged(None));
                    }
                }
                FetchOutcome::Applied
            }
            Err(e) => {
                state.schema_options.clear();
                self.emit(SelectorEvent::Error(format!(
                    "Error while fetching schema list: {}",
                    e.user_message()
                )));
                FetchOutcome::Failed
            }
        }
    }

    /// Select a schema of the current database. Loads its tables when the
    /// selector was built with `load_tables`.
    pub async fn change_schema(&self, schema: Option<String>, force_refresh: bool) -> FetchOutcome {
        let generation = Self::next(&self.table_generation);

        let database_id = {
            let mut state = self.state.write().await;
            let Some(database_id) = state.database.as_ref().map(|db| db.id) else {
                drop(state);
                self.emit(SelectorEvent::Error("Select a database first".to_string()));
                return FetchOutcome::Failed;
            };
            state.schema = schema.clone();
            state.table = None;
            state.table_options.clear();
            state.tables_loading = self.options.load_tables && schema.is_some();
            database_id
        };
        self.emit(SelectorEvent::SchemaChanged {
            database_id,
            schema: schema.clone(),
        });

        match schema {
            Some(schema) if self.options.load_tables => {
                self.load_tables(database_id, schema, force_refresh, generation).await
            }
            _ => FetchOutcome::Applied,
        }
    }

    async fn load_tables(
        &self,
        database_id: i64,
        schema: String,
        force: bool,
        generation: u64,
    ) -> FetchOutcome {
        let result = self.api.database_tables(database_id, &schema, force).await;

        let mut state = self.state.write().await;
        if !Self::is_current(&self.table_generation, generation) {
            warn!("Dropping superseded table list for {}.{}", database_id, schema);
            return FetchOutcome::Superseded;
        }
        state.tables_loading = false;

        match result {
            Ok(response) => {
                let count = response.result.len();
                state.table_options = response.result;
                self.emit(SelectorEvent::TablesLoaded { schema, count });
                FetchOutcome::Applied
            }
            Err(e) => {
                state.table_options.clear();
                self.emit(SelectorEvent::Error(format!(
                    "Error while fetching table list: {}",
                    e.user_message()
                )));
                FetchOutcome::Failed
            }
        }
    }

    /// Select one of the loaded tables
    pub async fn change_table(&self, table: Option<String>) -> FetchOutcome {
        {
            let mut state = self.state.write().await;
            if let Some(name) = &table {
                if !state.table_options.iter().any(|t| &t.value == name) {
                    drop(state);
                    self.emit(SelectorEvent::Error(format!("Unknown table: {}", name)));
                    return FetchOutcome::Failed;
                }
            }
            state.table = table.clone();
        }
        self.emit(SelectorEvent::TableChanged(table));
        FetchOutcome::Applied
    }
}
