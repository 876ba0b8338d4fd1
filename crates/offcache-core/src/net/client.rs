//! `reqwest`-backed network access.
//!
//! Manifest entries and intercepted URLs may be relative ("./index.html");
//! they are resolved against the configured scope URL before sending.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use tracing::debug;

use super::{Network, NetworkError};
use crate::models::{Method, Request, Response};

/// Default HTTP request timeout in seconds.
/// A hung fetch blocks only its own request, so this mainly bounds CLI runs.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Network client for live fetches.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    scope: Option<Url>,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::from_reqwest("<client>", e))?;

        Ok(Self {
            client,
            scope: None,
        })
    }

    /// Set the URL that relative request URLs are resolved against.
    pub fn with_scope(mut self, scope: &str) -> Result<Self, NetworkError> {
        let url = Url::parse(scope).map_err(|e| NetworkError::InvalidUrl {
            url: scope.to_string(),
            reason: e.to_string(),
        })?;
        self.scope = Some(url);
        Ok(self)
    }

    pub fn scope(&self) -> Option<&Url> {
        self.scope.as_ref()
    }

    /// Resolve a request URL to an absolute one.
    pub fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.scope {
                Some(scope) => scope.join(url).map_err(|e| NetworkError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
                None => Err(NetworkError::InvalidUrl {
                    url: url.to_string(),
                    reason: "relative URL with no scope configured".to_string(),
                }),
            },
            Err(e) => Err(NetworkError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn to_reqwest_method(method: &Method) -> Result<reqwest::Method, NetworkError> {
        Ok(match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Other(m) => reqwest::Method::from_bytes(m.as_bytes())
                .map_err(|_| NetworkError::InvalidMethod(m.clone()))?,
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = self.resolve(&request.url)?;
        let method = Self::to_reqwest_method(&request.method)?;
        debug!(method = %request.method, url = %url, "Network fetch");

        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(&request.url, e))?;

        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> HttpNetwork {
        HttpNetwork::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS)).unwrap()
    }

    #[test]
    fn test_resolve_absolute_ignores_scope() {
        let net = network().with_scope("https://example.com/app/").unwrap();
        let url = net
            .resolve("https://fonts.googleapis.com/css2?family=Lato")
            .unwrap();
        assert_eq!(url.host_str(), Some("fonts.googleapis.com"));
    }

    #[test]
    fn test_resolve_relative_against_scope() {
        let net = network().with_scope("https://example.com/app/").unwrap();
        assert_eq!(
            net.resolve("./").unwrap().as_str(),
            "https://example.com/app/"
        );
        assert_eq!(
            net.resolve("./index.html").unwrap().as_str(),
            "https://example.com/app/index.html"
        );
    }

    #[test]
    fn test_resolve_relative_without_scope_fails() {
        let err = network().resolve("./index.html").unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl { .. }));
    }

    #[test]
    fn test_with_scope_rejects_garbage() {
        assert!(network().with_scope("not a url").is_err());
    }

    mod live {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        /// Serve one canned HTTP reply on localhost and hand back the request head.
        async fn serve_once(reply: &'static str) -> (String, oneshot::Receiver<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            });
            (format!("http://{}/app/", addr), rx)
        }

        #[tokio::test]
        async fn test_fetch_copies_status_headers_and_body() {
            let (scope, head) = serve_once(
                "HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nX-Asset: shell\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            )
            .await;
            let net = network().with_scope(&scope).unwrap();

            let response = net.fetch(&Request::get("./index.html")).await.unwrap();
            assert_eq!(response.status, 201);
            assert_eq!(response.header("x-asset"), Some("shell"));
            assert_eq!(response.header("content-type"), Some("text/plain"));
            assert_eq!(response.body, b"hello");

            let head = head.await.unwrap();
            assert!(head.starts_with("GET /app/index.html HTTP/1.1"), "{head}");
        }

        #[tokio::test]
        async fn test_fetch_returns_error_status_as_response() {
            let (scope, _head) = serve_once(
                "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
            )
            .await;
            let net = network().with_scope(&scope).unwrap();

            let response = net.fetch(&Request::get("./gone.png")).await.unwrap();
            assert_eq!(response.status, 404);
            assert_eq!(response.text(), "missing");
        }

        #[tokio::test]
        async fn test_fetch_sends_extension_method() {
            let (scope, head) = serve_once(
                "HTTP/1.1 207 Multi-Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )
            .await;
            let net = network().with_scope(&scope).unwrap();
            let method: Method = "PROPFIND".parse().unwrap();

            let response = net.fetch(&Request::new(method, "./dav")).await.unwrap();
            assert_eq!(response.status, 207);
            assert!(response.body.is_empty());
            assert!(head.await.unwrap().starts_with("PROPFIND /app/dav HTTP/1.1"));
        }

        #[tokio::test]
        async fn test_fetch_connection_refused_is_transport_error() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let err = network()
                .fetch(&Request::get(format!("http://{}/", addr)))
                .await
                .unwrap_err();
            assert!(matches!(err, NetworkError::Transport { .. }), "{err:?}");
        }
    }
}
