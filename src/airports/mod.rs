//! The airports loader: when an airports CSV lands in a bucket, its rows are
//! appended to a warehouse table.
use functions_runtime::{handler_fn, Context, Err, Handler};
use serde::Deserialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{error, info};

pub mod bigquery;
pub mod event;
pub mod rows;
pub mod store;
#[cfg(test)]
mod test_server;
pub mod warehouse;

pub use event::{BackgroundEvent, EventContext, StorageEvent};
pub use rows::RowCollection;
pub use store::{LocalStore, ObjectRef, ObjectStore, StoreError};
pub use warehouse::{
    airports_schema, LoadJob, MemoryWarehouse, SchemaError, TableId, Warehouse, WarehouseError,
};

use crate::config::LoaderConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid storage event: {0}")]
    Event(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not parse {object}: {source}")]
    Csv { object: ObjectRef, source: csv::Error },
    #[error("data must include records")]
    EmptyCollection,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Rows per second, rounded. A zero elapsed time counts as one microsecond.
fn rows_per_sec(rows: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(1e-6);
    (rows as f64 / secs).round()
}

/// Loads airport files from `S` into `W`.
#[derive(Debug)]
pub struct AirportsLoader<S, W> {
    store: S,
    warehouse: W,
    job: LoadJob,
}

impl AirportsLoader<Box<dyn ObjectStore>, Box<dyn Warehouse>> {
    /// A loader with the collaborators and destination named by `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, LoadError> {
        let store = store::from_config(&config.storage)?;
        let warehouse = warehouse::from_config(&config.warehouse)?;
        Ok(AirportsLoader::new(store, warehouse, config.destination()))
    }
}

impl<S, W> AirportsLoader<S, W>
where
    S: ObjectStore,
    W: Warehouse,
{
    /// Appends to `destination` with the airports schema, creating the table if needed.
    pub fn new(store: S, warehouse: W, destination: TableId) -> Self {
        AirportsLoader {
            store,
            warehouse,
            job: LoadJob::append(destination, airports_schema()),
        }
    }

    pub fn destination(&self) -> &TableId {
        &self.job.destination
    }

    /// Handles a storage trigger. The event is taken as raw JSON so that a malformed
    /// one fails like any other step: logged, never returned. Returns the table's
    /// row count on success.
    pub async fn on_file_arrival(&self, event: &serde_json::Value) -> Option<u64> {
        match self.process(event).await {
            Ok(rows) => {
                info!("function completed successfully");
                Some(rows)
            }
            Err(err) => {
                error!("{}", err);
                None
            }
        }
    }

    async fn process(&self, event: &serde_json::Value) -> Result<u64, LoadError> {
        let BackgroundEvent { data, context } = BackgroundEvent::deserialize(event)?;
        info!("Event ID: {}, Event Type: '{}'", context.event_id, context.event_type);
        info!(
            metageneration = %data.metageneration,
            "bucket: '{}', file: '{}' created: {}",
            data.bucket,
            data.name,
            data.time_created
        );

        let rows = self.load_from_file(&data.object()).await?;
        self.load_table(&rows).await
    }

    /// Reads `object` into a collection whose columns match the table schema.
    pub async fn load_from_file(&self, object: &ObjectRef) -> Result<RowCollection, LoadError> {
        info!("loading airports data file from: {}", object);
        let bytes = self.store.fetch(object).await?;
        let mut rows =
            RowCollection::from_csv(bytes.as_ref()).map_err(|source| LoadError::Csv {
                object: object.clone(),
                source,
            })?;
        rows.normalize_columns();
        Ok(rows)
    }

    /// Appends `rows` to the destination and returns how many rows the table holds afterwards.
    pub async fn load_table(&self, rows: &RowCollection) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Err(LoadError::EmptyCollection);
        }
        let records = self.job.prepare(rows)?;
        let destination = &self.job.destination;

        info!(
            "preparing to write {} records to {} table...",
            rows.len(),
            destination
        );
        let start = Instant::now();
        self.warehouse.append(&self.job, records).await?;
        let elapsed = start.elapsed();
        info!("write completed");

        let table = self.warehouse.table(destination).await?;
        info!(
            "loaded {} records in {:.3} seconds. {} rows/sec",
            rows.len(),
            elapsed.as_secs_f64(),
            rows_per_sec(rows.len(), elapsed)
        );
        info!("table {} has {} rows", table.full_table_id, table.num_rows);
        Ok(table.num_rows)
    }
}

/// The runtime handler of the load function. Every event completes successfully;
/// whatever went wrong is in the logs.
pub fn storage_trigger<S, W>(
    loader: Arc<AirportsLoader<S, W>>,
) -> impl Handler<serde_json::Value, (), Err = Err>
where
    S: ObjectStore + 'static,
    W: Warehouse + 'static,
{
    handler_fn(move |event: serde_json::Value, _: Context| {
        let loader = Arc::clone(&loader);
        async move {
            loader.on_file_arrival(&event).await;
            Ok::<(), Err>(())
        }
    })
}
