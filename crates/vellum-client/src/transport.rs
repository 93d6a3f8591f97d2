use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Method, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use vellum_common::protocol::error::{Result, VellumError};

use crate::config::TlsConfig;

/// One fully-built HTTP exchange, independent of the underlying client.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The seam between the executor and the wire.
///
/// The executor never touches sockets directly; everything below the
/// request/response value types is swappable, which is how the test suite
/// drives the full retry/cache/topology machinery without a server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Production transport over hyper's pooled HTTP/1 client.
///
/// Speaks both `http://` and `https://`; with a [`TlsConfig`] carrying a
/// client identity, every TLS connection authenticates with it.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new(tls: Option<&TlsConfig>) -> Result<Self> {
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(Self::rustls_config(tls)?)
            .https_or_http()
            .enable_http1()
            .build();

        Ok(HyperTransport {
            client: Client::builder(TokioExecutor::new()).build(connector),
        })
    }

    fn rustls_config(tls: Option<&TlsConfig>) -> Result<rustls::ClientConfig> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(ca_pem) = tls.and_then(|t| t.trusted_ca_pem.as_deref()) {
            let mut reader: &[u8] = ca_pem;
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| {
                    VellumError::InvalidConfig(format!("bad trusted CA certificate: {}", e))
                })?;
                roots.add(cert).map_err(|e| {
                    VellumError::InvalidConfig(format!("rejected trusted CA certificate: {}", e))
                })?;
            }
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

        let config = match tls.and_then(|t| t.client_identity_pem.as_deref()) {
            Some(identity_pem) => {
                let mut reader: &[u8] = identity_pem;
                let certs = rustls_pemfile::certs(&mut reader)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| {
                        VellumError::InvalidConfig(format!("bad client certificate: {}", e))
                    })?;

                let mut reader: &[u8] = identity_pem;
                let key = rustls_pemfile::private_key(&mut reader)
                    .map_err(|e| {
                        VellumError::InvalidConfig(format!("bad client private key: {}", e))
                    })?
                    .ok_or_else(|| {
                        VellumError::InvalidConfig(
                            "client identity PEM contains no private key".to_string(),
                        )
                    })?;

                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    VellumError::InvalidConfig(format!("client identity rejected: {}", e))
                })?
            }
            None => builder.with_no_client_auth(),
        };

        Ok(config)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = hyper::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let http_request = builder
            .body(Full::new(request.body.unwrap_or_default()))
            .map_err(|e| VellumError::Transport(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| VellumError::Transport(format!("HTTP request failed: {}", e)))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| VellumError::Transport(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        Ok(TransportResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
