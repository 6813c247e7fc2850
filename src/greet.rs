use bytes::Bytes;
use http::{Request, Response};

/// Replies `hello {name}`, taking `name` from the query string.
pub fn greet(req: &Request<Bytes>) -> Response<String> {
    let name = req
        .uri()
        .query()
        .and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "name")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| String::from("Anonymous"));
    Response::new(format!("hello {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn greets_by_name() {
        assert_eq!(greet(&get("/?name=Grace+Hopper")).body(), "hello Grace Hopper");
    }

    #[test]
    fn anonymous_by_default() {
        assert_eq!(greet(&get("/")).body(), "hello Anonymous");
        assert_eq!(greet(&get("/?lang=en")).body(), "hello Anonymous");
    }
}
