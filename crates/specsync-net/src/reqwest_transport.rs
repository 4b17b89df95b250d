//! reqwest-backed transport

use crate::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;

/// Client settings for [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout (uploads can be large)
    pub request_timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
    /// Redirect hops allowed for requests that follow redirects
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(120),
            user_agent: concat!("specsync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
        }
    }
}

/// Production transport
///
/// Holds two clients sharing the same settings: one returning `3xx` as is,
/// one following them for requests that opt in.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    redirecting: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport.
    ///
    /// # Errors
    /// Returns [`TransportError::Failed`] if a client cannot be initialized.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(config, Policy::none())?,
            redirecting: build_client(config, Policy::limited(config.max_redirects))?,
        })
    }
}

fn build_client(config: &TransportConfig, policy: Policy) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .redirect(policy)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TransportError::failed("<client>", e.to_string()))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let client = if request.follow_redirects {
            &self.redirecting
        } else {
            &self.client
        };
        let mut builder = match request.method {
            Method::Get => client.get(url),
            Method::Put => client.put(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!("{:?} {}", request.method, request.url);
        let response = builder.send().await.map_err(|e| map_error(&request.url, &e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| map_error(&request.url, &e))?;

        tracing::debug!("{} -> {} ({} bytes)", request.url, status, body.len());
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(url: &str, error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::failed(url, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `/old` as a 302 to `/new`, and `/new` as 200 "abc"
    async fn redirect_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]);
                    let response = if head.starts_with("GET /old ") {
                        "HTTP/1.1 302 Found\r\nLocation: /new\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    } else {
                        "HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc"
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        base
    }

    #[test]
    fn builds_with_defaults() {
        assert!(ReqwestTransport::new(&TransportConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn rejects_unparseable_url() {
        let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
        let err = transport
            .execute(HttpRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn redirects_are_returned_unless_requested() {
        let base = redirect_server().await;
        let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();

        let plain = transport
            .execute(HttpRequest::get(format!("{base}/old")))
            .await
            .unwrap();
        assert_eq!(plain.status, reqwest::StatusCode::FOUND);
        assert_eq!(plain.header("location"), Some("/new"));

        let followed = transport
            .execute(HttpRequest::get(format!("{base}/old")).following_redirects())
            .await
            .unwrap();
        assert_eq!(followed.status, reqwest::StatusCode::OK);
        assert_eq!(followed.body.as_ref(), b"abc");
    }
}
