use bytes::Bytes;
use cloud_functions::{greet::greet, logging};
use functions_runtime::{http_fn, Context, Err};
use futures::future;
use http::Request;

#[tokio::main]
async fn main() -> Result<(), Err> {
    logging::init();
    functions_runtime::run_http(http_fn(|req: Request<Bytes>, _: Context| {
        future::ok::<_, Err>(greet(&req))
    }))
    .await
}
