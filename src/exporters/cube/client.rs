// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::Response;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use tower::BoxError;
use tracing::{debug, warn};

use crate::event::Event;
use crate::exporters::cube::EventSink;
use crate::exporters::cube::errors::ExportError;

/// Path of the collector's event ingestion endpoint
pub const EVENT_PUT_PATH: &str = "/1.0/event/put";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts event batches to a Cube collector over http or https.
#[derive(Clone)]
pub struct CubeClient {
    inner: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    uri: Uri,
    request_timeout: Duration,
}

impl CubeClient {
    pub fn build(endpoint: &str, request_timeout: Duration) -> Result<Self, BoxError> {
        let uri = event_put_uri(endpoint)?;
        let inner = build_hyper_client()?;

        Ok(Self {
            inner,
            uri,
            request_timeout,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    async fn perform_request(&self, body: Bytes) -> Result<StatusCode, ExportError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| ExportError::Request(e.into()))?;

        let resp: Response<Incoming> = self
            .inner
            .request(req)
            .await
            .map_err(|e| ExportError::Request(e.into()))?;

        let (head, body) = resp.into_parts();
        // Read the body to completion so the connection goes back to the pool
        if let Err(e) = body.collect().await {
            debug!(error = %e, "Failed reading response body");
        }

        Ok(head.status)
    }
}

impl EventSink for CubeClient {
    async fn put_events(&self, batch: &[Event]) -> Result<(), ExportError> {
        let body = Bytes::from(serde_json::to_vec(batch)?);

        let status = tokio::time::timeout(self.request_timeout, self.perform_request(body))
            .await
            .map_err(|_| ExportError::Timeout(self.request_timeout))??;

        if status != StatusCode::OK {
            return Err(ExportError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Join the collector endpoint with the ingestion path, ignoring trailing
/// slashes on the endpoint.
pub fn event_put_uri(endpoint: &str) -> Result<Uri, BoxError> {
    let uri: Uri = format!("{}{}", endpoint.trim_end_matches('/'), EVENT_PUT_PATH).parse()?;
    match uri.scheme_str() {
        Some("http") | Some("https") => Ok(uri),
        _ => Err(format!("endpoint must be an http or https url: {}", endpoint).into()),
    }
}

fn build_hyper_client() -> Result<HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>, BoxError>
{
    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    let builder = match hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_native_roots(provider.clone())
    {
        Ok(builder) => builder,
        Err(e) => {
            warn!(error = %e, "No native root certificates, https endpoints will fail verification");
            let tls = ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()?
                .with_root_certificates(RootCertStore::empty())
                .with_no_client_auth();
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
        }
    };

    let https = builder.https_or_http().enable_http1().build();

    let client = HyperClient::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(16)
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(https);

    Ok(client)
}
