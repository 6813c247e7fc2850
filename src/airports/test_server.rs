//! An HTTP peer for adapter tests: serves scripted replies in order and records
//! every request it receives.
use bytes::Bytes;
use http::{header::CONTENT_TYPE, Method, Request, Response, StatusCode};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Server,
};
use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone)]
pub(crate) struct Received {
    pub method: Method,
    pub uri: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Received {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
}

impl TestServer {
    /// Starts a server on a free local port. Once `replies` run out, every
    /// request is answered with a 500.
    pub fn start(replies: Vec<(StatusCode, &'static str)>) -> Self {
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let received = Arc::new(Mutex::new(Vec::new()));

        let (queue, log) = (replies, Arc::clone(&received));
        let make_service = make_service_fn(move |_| {
            let (queue, log) = (Arc::clone(&queue), Arc::clone(&log));
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let (queue, log) = (Arc::clone(&queue), Arc::clone(&log));
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = hyper::body::to_bytes(body).await?;
                        log.lock().unwrap().push(Received {
                            method: parts.method,
                            uri: parts.uri.to_string(),
                            content_type: parts
                                .headers
                                .get(CONTENT_TYPE)
                                .and_then(|value| value.to_str().ok())
                                .map(str::to_owned),
                            body,
                        });
                        let (status, reply) = queue
                            .lock()
                            .unwrap()
                            .pop_front()
                            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no reply scripted"));
                        Ok::<_, hyper::Error>(
                            Response::builder().status(status).body(Body::from(reply)).unwrap(),
                        )
                    }
                }))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);
        TestServer { addr, received }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}
