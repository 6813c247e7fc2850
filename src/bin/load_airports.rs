use cloud_functions::{
    airports::{storage_trigger, AirportsLoader},
    config::LoaderConfig,
    logging,
};
use functions_runtime::Err;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Err> {
    logging::init();
    let config = LoaderConfig::from_env_path()?;
    let loader = Arc::new(AirportsLoader::from_config(&config)?);
    info!(table = %loader.destination(), "airports loader ready");

    functions_runtime::run(storage_trigger(loader)).await
}
