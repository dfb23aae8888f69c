//! TLS REST client.
//!
//! # Responsibilities
//! - Build the client TLS configuration from PEM material
//! - Probe the server once on open and keep its certificate chain
//! - Issue single GET / POST / POST_FORM / HEAD requests
//! - Turn any non-200 answer into a typed error
//!
//! # Design Decisions
//! - One pooled transport per open client, released on close
//! - Unsupported methods and protocols fail before any I/O

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::ClientConfig;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace};
use url::Url;

use super::method::{RestMethod, RestProtocol};
use crate::codec::MediaType;
use crate::net::tls::{ConfigurationError, TlsFactory, TlsMaterial};

/// Bound on connecting and on the diagnostic handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is already open")]
    AlreadyOpen,

    #[error("client is not open")]
    NotOpen,

    #[error(transparent)]
    Tls(#[from] ConfigurationError),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("TLS handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("{operation} with {address} timed out")]
    Timeout {
        operation: &'static str,
        address: String,
    },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(RestMethod),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(RestProtocol),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Status Code: {code}, Message: {status_line}")]
    Status {
        code: u16,
        status_line: String,
        body: Bytes,
    },
}

impl ClientError {
    /// The HTTP status of a `Status` error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// A 200 answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ClientResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct OpenState {
    http: reqwest::Client,
    peer_certificates: Vec<CertificateDer<'static>>,
}

/// Client for one `host:port`.
pub struct RestClient {
    host: String,
    port: u16,
    material: TlsMaterial,
    factory: TlsFactory,
    probe: bool,
    connect_timeout: Duration,
    state: Option<OpenState>,
}

impl RestClient {
    /// A client trusting the bundled web PKI roots.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            material: TlsMaterial::new(),
            factory: TlsFactory::default(),
            probe: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state: None,
        }
    }

    pub fn with_tls(mut self, material: TlsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_tls_factory(mut self, factory: TlsFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Skip the diagnostic handshake, e.g. for a plain-HTTP server.
    pub fn with_handshake_probe(mut self, probe: bool) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Chain presented by the server during `open`. Empty when not probed.
    pub fn peer_certificates(&self) -> &[CertificateDer<'static>] {
        self.state
            .as_ref()
            .map(|state| state.peer_certificates.as_slice())
            .unwrap_or(&[])
    }

    pub async fn open(&mut self) -> Result<(), ClientError> {
        if self.state.is_some() {
            return Err(ClientError::AlreadyOpen);
        }

        let config = self.factory.client_config(&self.material)?;
        let peer_certificates = if self.probe {
            self.handshake(Arc::clone(&config)).await?
        } else {
            Vec::new()
        };

        let http = reqwest::Client::builder()
            .use_preconfigured_tls((*config).clone())
            .connect_timeout(self.connect_timeout)
            .no_proxy()
            .build()?;

        info!(address = %self.authority(), probed = self.probe, "Client opened");
        self.state = Some(OpenState {
            http,
            peer_certificates,
        });
        Ok(())
    }

    /// Release the transport. Closing a closed client does nothing.
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            info!(address = %self.authority(), "Client closed");
        }
    }

    /// Send one request to `protocol://host:port/path`.
    pub async fn request(
        &self,
        protocol: RestProtocol,
        path: &str,
        method: RestMethod,
        accepted: Option<&MediaType>,
        body: Option<Bytes>,
        form: Option<&[(String, String)]>,
    ) -> Result<ClientResponse, ClientError> {
        if !method.is_supported() {
            return Err(ClientError::UnsupportedMethod(method));
        }
        if protocol == RestProtocol::Ws {
            return Err(ClientError::UnsupportedProtocol(protocol));
        }
        let state = self.state.as_ref().ok_or(ClientError::NotOpen)?;
        let url = self.url(protocol, path)?;

        let builder = match method {
            RestMethod::Get => state.http.get(url.clone()),
            RestMethod::Head => state.http.head(url.clone()),
            RestMethod::Post => state.http.post(url.clone()).body(body.unwrap_or_default()),
            RestMethod::PostForm => state.http.post(url.clone()).form(form.unwrap_or_default()),
            _ => return Err(ClientError::UnsupportedMethod(method)),
        };
        let builder = match accepted {
            Some(media) => builder.header(ACCEPT, media.as_str()),
            None => builder,
        };

        debug!(method = %method, url = %url, "Sending request");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            debug!(url = %url, status = status.as_u16(), "Request failed");
            return Err(ClientError::Status {
                code: status.as_u16(),
                status_line: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        Ok(ClientResponse {
            status: status.as_u16(),
            body,
        })
    }

    /// `host:port`, bracketing IPv6 literals.
    fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]:{}", self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    fn url(&self, protocol: RestProtocol, path: &str) -> Result<Url, ClientError> {
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{protocol}://{}/{path}", self.authority()))?)
    }

    async fn handshake(&self, config: Arc<ClientConfig>) -> Result<Vec<CertificateDer<'static>>, ClientError> {
        let address = self.authority();
        let name = ServerName::try_from(self.host.clone())
            .map_err(|_| ClientError::InvalidServerName(self.host.clone()))?;

        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| ClientError::Timeout {
                operation: "connect",
                address: address.clone(),
            })?
            .map_err(|source| ClientError::Connect {
                address: address.clone(),
                source,
            })?;

        let mut tls = tokio::time::timeout(self.connect_timeout, TlsConnector::from(config).connect(name, tcp))
            .await
            .map_err(|_| ClientError::Timeout {
                operation: "TLS handshake",
                address: address.clone(),
            })?
            .map_err(|source| ClientError::Handshake {
                address: address.clone(),
                source,
            })?;

        let chain: Vec<CertificateDer<'static>> = tls
            .get_ref()
            .1
            .peer_certificates()
            .map(|certs| certs.iter().map(|cert| cert.clone().into_owned()).collect())
            .unwrap_or_default();
        for (depth, cert) in chain.iter().enumerate() {
            trace!(address = %address, depth, bytes = cert.len(), "Server certificate");
        }
        debug!(address = %address, chain = chain.len(), "Diagnostic handshake complete");

        let _ = tls.shutdown().await;
        Ok(chain)
    }
}
