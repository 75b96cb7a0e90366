//! HTTP transport for delivering signed envelopes to the gateway.
//!
//! The client never touches the network directly. It goes through the
//! [`Transport`] trait, so tests can swap in a scripted gateway and callers
//! can layer instrumentation or proxying without touching the client itself.
//! [`PayerIpResolver`] is the same seam for public IP discovery, which
//! payment operations need when the caller does not supply `payer_ip`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{NetworkErrorKind, PayPayError, Result};
use crate::types::{GatewayResponse, RequestEnvelope};
use crate::validate;

/// Timeout applied to each public IP lookup, independent of the gateway timeout.
const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers a signed envelope to a gateway endpoint.
///
/// Implementations must not mutate the envelope: the signature was computed
/// over its exact field values, and re-signing is the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts the envelope as a form-encoded body and returns the parsed
    /// gateway response.
    async fn send(&self, endpoint: &str, envelope: &RequestEnvelope) -> Result<GatewayResponse>;
}

/// Resolves the public IP address reported as `payer_ip` on payment requests.
#[async_trait]
pub trait PayerIpResolver: Send + Sync {
    /// Returns a publicly routable IP address, or a [`PayPayError::Network`]
    /// when no lookup service is reachable.
    async fn resolve(&self) -> Result<String>;
}

/// Production [`Transport`] backed by a reqwest [`Client`].
///
/// Fields are sent exactly once through form encoding. The gateway decodes
/// them once before canonicalizing for signature verification, so any extra
/// encoding layer would corrupt the signature base string.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PayPayError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client. Timeouts and proxy settings come
    /// from that client's own configuration.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, envelope: &RequestEnvelope) -> Result<GatewayResponse> {
        let fields = sorted_params(envelope);

        debug!(
            service = %envelope.service,
            request_no = %envelope.request_no,
            "posting request to gateway"
        );

        let response = self.client.post(endpoint).form(&fields).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "gateway returned an HTTP error status");
            return Err(PayPayError::Network {
                kind: NetworkErrorKind::Status(status.as_u16()),
                message: format!("Gateway answered HTTP {status}"),
            });
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "received gateway response");
        let parsed: GatewayResponse = serde_json::from_str(&body)?;
        Ok(parsed)
    }
}

/// Envelope fields in lexicographic key order, ready for form encoding.
///
/// Order does not affect signature verification, which re-sorts on the
/// gateway side, but a deterministic body makes request logs diffable.
pub(crate) fn sorted_params(envelope: &RequestEnvelope) -> Vec<(String, String)> {
    let mut fields = envelope.to_params();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
}

/// Default [`PayerIpResolver`] that queries public echo services.
///
/// Tries `api.ipify.org` first and falls back to `httpbin.org/ip`. Both
/// lookups run with a short timeout so a dead service cannot stall a
/// payment for the full gateway timeout.
pub struct PublicIpResolver {
    client: Client,
}

#[derive(Deserialize)]
struct IpifyBody {
    ip: String,
}

#[derive(Deserialize)]
struct HttpbinBody {
    origin: String,
}

impl PublicIpResolver {
    /// Creates a resolver with its own short-timeout HTTP client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn query_ipify(&self) -> Result<String> {
        let body: IpifyBody = self
            .client
            .get("https://api.ipify.org?format=json")
            .timeout(IP_LOOKUP_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let ip = body.ip.trim().to_string();
        validate::validate_ip(&ip)?;
        Ok(ip)
    }

    async fn query_httpbin(&self) -> Result<String> {
        let body: HttpbinBody = self
            .client
            .get("https://httpbin.org/ip")
            .timeout(IP_LOOKUP_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // httpbin reports a comma-separated chain when proxies are involved;
        // the first entry is the client-facing address.
        let ip = match body.origin.split(',').next() {
            Some(first) => first.trim().to_string(),
            None => String::new(),
        };
        validate::validate_ip(&ip)?;
        Ok(ip)
    }
}

impl Default for PublicIpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayerIpResolver for PublicIpResolver {
    async fn resolve(&self) -> Result<String> {
        match self.query_ipify().await {
            Ok(ip) => Ok(ip),
            Err(err) => {
                warn!(error = %err, "primary IP lookup failed, trying fallback");
                self.query_httpbin().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> RequestEnvelope {
        RequestEnvelope {
            charset: "UTF-8".to_string(),
            biz_content: "ZW5jcnlwdGVk".to_string(),
            partner_id: "200001234567".to_string(),
            service: "instant_trade".to_string(),
            request_no: "a".repeat(32),
            format: "JSON".to_string(),
            sign_type: "RSA".to_string(),
            version: "1.0".to_string(),
            timestamp: "2024-01-01 12:00:00".to_string(),
            language: "en".to_string(),
            sign: "c2lnbmF0dXJl".to_string(),
        }
    }

    #[test]
    fn test_sorted_params_is_lexicographic() {
        let fields = sorted_params(&sample_envelope());
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(keys.first(), Some(&"biz_content"));
        assert_eq!(keys.last(), Some(&"version"));
    }

    #[test]
    fn test_sorted_params_keeps_all_fields() {
        let fields = sorted_params(&sample_envelope());
        assert_eq!(fields.len(), 11);
        assert!(fields.iter().any(|(k, v)| k == "sign" && v == "c2lnbmF0dXJl"));
        assert!(fields.iter().any(|(k, v)| k == "sign_type" && v == "RSA"));
    }

    #[test]
    fn test_http_transport_construction() {
        let transport = HttpTransport::new(Duration::from_secs(30));
        assert!(transport.is_ok());
    }
}
