use crate::{requests::NextEventRequest, Err};
use bytes::Bytes;
use futures::{
    future::{self, BoxFuture},
    prelude::*,
    task::{Context, Poll},
};
use http::{
    uri::{Authority, PathAndQuery, Scheme},
    Request, Response, Uri,
};
use hyper::{client::HttpConnector, Body};
use std::{convert::TryFrom, pin::Pin};

#[derive(Debug)]
pub(crate) struct Client {
    base: (Scheme, Authority),
    inner: hyper::Client<HttpConnector>,
}

impl Client {
    pub(crate) fn new(scheme: Scheme, authority: Authority) -> Self {
        Self {
            base: (scheme, authority),
            inner: hyper::Client::new(),
        }
    }

    fn add_origin(&self, uri: &Uri) -> Result<Uri, http::Error> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(self.base.0.clone())
            .authority(self.base.1.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

/// A client responsible for interacting with the Runtime API.
pub(crate) trait EventClient: Send + Sync {
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>, Err>>;
}

impl EventClient for Client {
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>, Err>> {
        let fut = async move {
            let (mut parts, body) = req.into_parts();
            parts.uri = self.add_origin(&parts.uri)?;
            let res = self.inner.request(Request::from_parts(parts, Body::from(body))).await?;
            let (parts, body) = res.into_parts();
            let body = hyper::body::to_bytes(body).await?;
            Ok(Response::from_parts(parts, body))
        };
        fut.boxed()
    }
}

/// The `Stream` implementation for `EventStream` converts a `Future`
/// containing the next event from the Runtime API into a continuous
/// stream of events. While _this_ stream will continue to produce
/// events indefinitely, the host will only run the function attached
/// to this runtime *if and only if* there is an event available for it to process.
pub(crate) struct EventStream<'a, T>
where
    T: EventClient,
{
    current: Option<BoxFuture<'a, Result<Response<Bytes>, Err>>>,
    client: &'a T,
}

impl<'a, T> EventStream<'a, T>
where
    T: EventClient,
{
    pub(crate) fn new(inner: &'a T) -> Self {
        Self {
            current: None,
            client: inner,
        }
    }

    fn next_event(&self) -> BoxFuture<'a, Result<Response<Bytes>, Err>> {
        let client: &'a T = self.client;
        match Request::try_from(NextEventRequest) {
            Ok(req) => client.call(req),
            Err(e) => {
                let err: Err = e.into();
                future::ready(Err(err)).boxed()
            }
        }
    }
}

impl<'a, T> Stream for EventStream<'a, T>
where
    T: EventClient,
{
    type Item = Result<Response<Bytes>, Err>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Drive the inner future (`current`) to completion; once it resolves, queue the
        // request for the following event before yielding the resolved one.
        loop {
            if let Some(current) = &mut self.current {
                match current.as_mut().poll(cx) {
                    Poll::Ready(res) => {
                        self.current = Some(self.next_event());
                        return Poll::Ready(Some(res));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            } else {
                self.current = Some(self.next_event());
            }
        }
    }
}
