use bytes::Bytes;
use cloud_functions::{
    answer::{AnswerFunction, HowdoiCommand},
    config::AnswerConfig,
    logging,
};
use functions_runtime::{http_fn, Context, Err};
use http::Request;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Err> {
    logging::init();
    let config = AnswerConfig::from_env()?;
    let lookup = HowdoiCommand::from_config(&config);
    info!(
        program = %lookup.program().display(),
        disable_ssl = config.disable_ssl,
        "answer function ready"
    );
    let function = Arc::new(AnswerFunction::new(lookup, config.missing_question));

    functions_runtime::run_http(http_fn(move |req: Request<Bytes>, _: Context| {
        let function = Arc::clone(&function);
        async move { function.handle(req).await }
    }))
    .await
}
