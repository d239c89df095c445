//! HTTP request execution.
//!
//! The accessory never talks to the network directly. It hands a
//! [`UrlDescriptor`] to an [`HttpExecutor`] and interprets the returned status
//! and body itself. With the `reqwest` feature (default) the crate ships
//! [`ReqwestExecutor`].

use std::future::Future;

use crate::config::UrlDescriptor;
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// Trait for performing one HTTP request.
///
/// Any status code is a successful exchange; only failures to get a response
/// at all are errors, and those should be [`Error::Transport`]. Retries and
/// timeouts are the executor's business.
pub trait HttpExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        request: &UrlDescriptor,
    ) -> impl Future<Output = Result<HttpResponse>> + Send;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_impl::ReqwestExecutor;

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use log::debug;
    use reqwest::{Client, Method};

    use super::{HttpExecutor, HttpResponse, Result};
    use crate::config::UrlDescriptor;
    use crate::errors::Error;

    /// [`HttpExecutor`] backed by a pair of reqwest clients.
    ///
    /// Requests with `strictSSL` disabled go through a client that accepts
    /// invalid certificates, mirroring the usual behavior of Homebridge HTTP
    /// plugins on self-signed sensor firmware.
    #[derive(Debug, Clone)]
    pub struct ReqwestExecutor {
        strict: Client,
        lenient: Client,
    }

    impl ReqwestExecutor {
        pub fn new() -> Result<Self> {
            let strict = Client::builder().build().map_err(Error::transport)?;
            let lenient = Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(Error::transport)?;
            Ok(ReqwestExecutor { strict, lenient })
        }
    }

    impl HttpExecutor for ReqwestExecutor {
        async fn execute(&self, request: &UrlDescriptor) -> Result<HttpResponse> {
            let method = Method::from_bytes(request.method.as_bytes())
                .map_err(|e| Error::invalid_url("method", e))?;
            let client = if request.strict_ssl {
                &self.strict
            } else {
                &self.lenient
            };

            let mut builder = client.request(method, request.url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(auth) = &request.auth {
                builder = builder.basic_auth(&auth.username, auth.password.as_ref());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            debug!("{} {}", request.method, request.url);
            let response = builder.send().await.map_err(Error::transport)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(Error::transport)?;
            Ok(HttpResponse { status, body })
        }
    }

}
