//! The PayPay client, entry point for all gateway operations.
//!
//! A [`PayPayClient`] owns the merchant's parsed key material and a
//! transport, and exposes one method per gateway flow: Express payments,
//! reference payments, in-app payments, status queries and order close.
//! Every method validates input locally, builds one signed envelope, and
//! retries transient failures with exponential backoff.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::PayPayConfig;
use crate::errors::Result;
use crate::keys::{KeyInfo, KeyKind, KeyMaterial};
use crate::request;
use crate::response;
use crate::transport::{HttpTransport, PayerIpResolver, PublicIpResolver, Transport};
use crate::types::{GatewayResponse, Operation, OrderDetails, PaymentData, RequestEnvelope};

/// Client for the PayPay payment gateway.
///
/// # Examples
///
/// ```no_run
/// use paypay_ao::{OrderDetails, PayPayClient, PayPayConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PayPayConfig::new(
///     "200001234567",
///     std::fs::read_to_string("merchant_private_key.pem")?,
/// );
/// let client = PayPayClient::new(config)?;
///
/// let order = OrderDetails::new("ORDER-2024-001", 2500.0)
///     .with_subject("Monthly subscription")
///     .with_phone("923456789");
///
/// let payment = client.create_express_payment(order).await?;
/// println!("trade token: {:?}", payment.trade_token);
/// # Ok(())
/// # }
/// ```
pub struct PayPayClient {
    config: PayPayConfig,
    private_key: KeyMaterial,
    paypay_public_key: Option<KeyMaterial>,
    transport: Arc<dyn Transport>,
    ip_resolver: Arc<dyn PayerIpResolver>,
}

impl PayPayClient {
    /// Creates a client from a validated configuration.
    ///
    /// Both PEM keys are parsed here, so a malformed key fails construction
    /// instead of the first payment.
    ///
    /// # Arguments
    ///
    /// * `config` - Merchant credentials and client behavior, see [`PayPayConfig`]
    pub fn new(config: PayPayConfig) -> Result<Self> {
        config.validate()?;

        let private_key = KeyMaterial::from_pem(&config.private_key_pem, KeyKind::Private)?;
        let paypay_public_key = match &config.paypay_public_key_pem {
            Some(pem) => Some(KeyMaterial::from_pem(pem, KeyKind::Public)?),
            None => None,
        };
        let transport = Arc::new(HttpTransport::new(config.timeout)?);

        Ok(Self {
            config,
            private_key,
            paypay_public_key,
            transport,
            ip_resolver: Arc::new(PublicIpResolver::new()),
        })
    }

    /// Replaces the HTTP transport, e.g. with a scripted gateway in tests.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the payer IP resolver.
    pub fn with_ip_resolver(mut self, resolver: Arc<dyn PayerIpResolver>) -> Self {
        self.ip_resolver = resolver;
        self
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &PayPayConfig {
        &self.config
    }

    /// Creates a Multicaixa Express payment.
    ///
    /// Pushes a payment prompt to the payer's phone, which is why
    /// `order.phone_num` is mandatory for this flow.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use paypay_ao::{OrderDetails, PayPayClient, PayPayConfig};
    /// # async fn example(client: PayPayClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let order = OrderDetails::new("ORDER-2024-001", 2500.0).with_phone("923456789");
    /// let payment = client.create_express_payment(order).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_express_payment(&self, order: OrderDetails) -> Result<PaymentData> {
        self.execute(Operation::Express { order }).await
    }

    /// Creates a Multicaixa reference payment.
    ///
    /// The response carries `entity_id` and `reference_id`, which the payer
    /// uses to settle at an ATM or through their bank.
    pub async fn create_reference_payment(&self, order: OrderDetails) -> Result<PaymentData> {
        self.execute(Operation::Reference { order }).await
    }

    /// Creates a payment to be completed inside the PayPay app.
    ///
    /// The response carries `trade_token` and `dynamic_link` for handing
    /// off to the app.
    pub async fn create_app_payment(&self, order: OrderDetails) -> Result<PaymentData> {
        self.execute(Operation::AppPayment { order }).await
    }

    /// Queries the current state of an order.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use paypay_ao::{PayPayClient, TradeStatus};
    /// # async fn example(client: PayPayClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let status = client.order_status("ORDER-2024-001").await?;
    /// if status.trade_status == Some(TradeStatus::TradeSuccess) {
    ///     println!("paid");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn order_status(&self, out_trade_no: &str) -> Result<PaymentData> {
        self.execute(Operation::StatusQuery {
            out_trade_no: out_trade_no.to_string(),
        })
        .await
    }

    /// Closes an order that has not been paid.
    pub async fn close_order(&self, out_trade_no: &str) -> Result<PaymentData> {
        self.execute(Operation::CloseOrder {
            out_trade_no: out_trade_no.to_string(),
        })
        .await
    }

    /// Runs one gateway operation end to end.
    ///
    /// Input is validated before any network traffic. The envelope is built
    /// and signed once; retries resend the identical envelope, so the
    /// gateway sees one `request_no` per logical operation and can
    /// deduplicate.
    pub async fn execute(&self, operation: Operation) -> Result<PaymentData> {
        request::validate_operation(&operation)?;

        let payer_ip = self.resolve_payer_ip(&operation).await?;
        let envelope = request::build_envelope(
            &operation,
            &self.config,
            &self.private_key,
            payer_ip.as_deref(),
        )?;

        let endpoint = self.config.endpoint();
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.dispatch(endpoint, &envelope).await {
                Ok(data) => return Ok(data),
                Err(err) => {
                    if attempt >= attempts || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = err.retry_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "gateway request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One send-verify-normalize round trip.
    async fn dispatch(&self, endpoint: &str, envelope: &RequestEnvelope) -> Result<PaymentData> {
        let raw: GatewayResponse = self.transport.send(endpoint, envelope).await?;
        if let Some(public_key) = &self.paypay_public_key {
            response::verify_signature(&raw, public_key)?;
        }
        response::normalize(raw)
    }

    /// Payer IP for payment operations: caller-supplied wins, otherwise the
    /// resolver is asked. Queries and closes carry no IP at all.
    async fn resolve_payer_ip(&self, operation: &Operation) -> Result<Option<String>> {
        let order = match operation {
            Operation::Express { order }
            | Operation::Reference { order }
            | Operation::AppPayment { order } => order,
            Operation::StatusQuery { .. } | Operation::CloseOrder { .. } => return Ok(None),
        };

        if let Some(ip) = &order.payer_ip {
            return Ok(Some(ip.clone()));
        }

        let ip = self.ip_resolver.resolve().await?;
        debug!(payer_ip = %ip, "resolved public IP for payment");
        Ok(Some(ip))
    }

    /// Generates a merchant order number: `prefix` + millisecond timestamp
    /// + four random digits.
    ///
    /// Prefixes up to 15 characters keep the result inside the gateway's
    /// 32-character limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use paypay_ao::PayPayClient;
    ///
    /// let out_trade_no = PayPayClient::generate_trade_no("ORDER-");
    /// assert!(out_trade_no.starts_with("ORDER-"));
    /// ```
    pub fn generate_trade_no(prefix: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
        format!("{prefix}{millis}{suffix}")
    }

    /// Wipes the parsed RSA keys from memory.
    ///
    /// Idempotent. Operations already in flight finish with the key copies
    /// they hold; every later operation fails with a crypto error.
    pub fn destroy(&self) {
        self.private_key.clear();
        if let Some(key) = &self.paypay_public_key {
            key.clear();
        }
        debug!("client key material cleared");
    }

    /// Inspection data for the merchant private key.
    pub fn key_info(&self) -> KeyInfo {
        self.private_key.key_info()
    }
}

impl fmt::Debug for PayPayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayPayClient")
            .field("config", &self.config)
            .field("private_key", &self.private_key)
            .field("has_public_key", &self.paypay_public_key.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{NetworkErrorKind, PayPayError};
    use crate::validate;
    use async_trait::async_trait;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Mutex, OnceLock};

    fn test_pems() -> &'static (String, String) {
        static PEMS: OnceLock<(String, String)> = OnceLock::new();
        PEMS.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
            let public = private.to_public_key();
            (
                private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
                public.to_public_key_pem(LineEnding::LF).unwrap(),
            )
        })
    }

    struct MockTransport {
        replies: Mutex<VecDeque<GatewayResponse>>,
        seen: Mutex<Vec<RequestEnvelope>>,
    }

    impl MockTransport {
        fn new(replies: Vec<GatewayResponse>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn envelope(&self, index: usize) -> RequestEnvelope {
            self.seen.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            _endpoint: &str,
            envelope: &RequestEnvelope,
        ) -> Result<GatewayResponse> {
            self.seen.lock().unwrap().push(envelope.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => Ok(reply),
                None => Ok(GatewayResponse::default()),
            }
        }
    }

    struct StaticIp(&'static str);

    #[async_trait]
    impl PayerIpResolver for StaticIp {
        async fn resolve(&self) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct UnreachableResolver;

    #[async_trait]
    impl PayerIpResolver for UnreachableResolver {
        async fn resolve(&self) -> Result<String> {
            Err(PayPayError::Network {
                kind: NetworkErrorKind::Other,
                message: "resolver should not have been called".to_string(),
            })
        }
    }

    fn reply(value: serde_json::Value) -> GatewayResponse {
        serde_json::from_value(value).unwrap()
    }

    fn client_with(replies: Vec<GatewayResponse>) -> (PayPayClient, Arc<MockTransport>) {
        let (private_pem, public_pem) = test_pems();
        let config = PayPayConfig::new("200001234567", private_pem.clone())
            .with_public_key(public_pem.clone());
        let transport = MockTransport::new(replies);
        let client = PayPayClient::new(config)
            .unwrap()
            .with_transport(transport.clone())
            .with_ip_resolver(Arc::new(StaticIp("102.140.65.1")));
        (client, transport)
    }

    fn express_order() -> OrderDetails {
        OrderDetails::new("ORDER-2024-001", 2500.0).with_phone("923456789")
    }

    #[test]
    fn test_construction_parses_keys_eagerly() {
        let (private_pem, _) = test_pems();
        let client = PayPayClient::new(PayPayConfig::new("200001234567", private_pem.clone()));
        let client = client.unwrap();
        assert_eq!(client.key_info().bits, 1024);
        assert!(!client.key_info().cleared);

        let err = PayPayClient::new(PayPayConfig::new("200001234567", "not a pem")).unwrap_err();
        assert!(matches!(err, PayPayError::KeyFormat(_)));

        let err =
            PayPayClient::new(PayPayConfig::new("", private_pem.clone())).unwrap_err();
        assert!(matches!(err, PayPayError::Config(_)));
    }

    #[tokio::test]
    async fn test_express_payment_success() {
        let (client, transport) = client_with(vec![reply(json!({
            "code": "10000",
            "msg": "Success",
            "out_trade_no": "ORDER-2024-001",
            "dynamic_link": "https://pay.example/abc",
            "trade_token": "tok-1"
        }))]);

        let payment = client.create_express_payment(express_order()).await.unwrap();
        assert_eq!(payment.trade_token.as_deref(), Some("tok-1"));
        assert_eq!(transport.calls(), 1);

        let envelope = transport.envelope(0);
        assert_eq!(envelope.service, "instant_trade");
        assert_eq!(envelope.partner_id, "200001234567");
        assert_eq!(envelope.request_no.len(), 32);
        assert!(!envelope.sign.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_never_touches_the_network() {
        let (client, transport) = client_with(vec![]);
        let client = client.with_ip_resolver(Arc::new(UnreachableResolver));

        // Express without a phone number
        let err = client
            .create_express_payment(OrderDetails::new("ORDER-2024-001", 100.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PayPayError::Validation { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_status_query_skips_ip_resolution() {
        let (client, transport) = client_with(vec![reply(json!({
            "code": "10000",
            "out_trade_no": "ORDER-2024-001",
            "trade_status": "TRADE_SUCCESS"
        }))]);
        let client = client.with_ip_resolver(Arc::new(UnreachableResolver));

        let status = client.order_status("ORDER-2024-001").await.unwrap();
        assert_eq!(
            status.trade_status,
            Some(crate::types::TradeStatus::TradeSuccess)
        );
        assert_eq!(transport.envelope(0).service, "trade_query");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retryable_gateway_error_is_retried() {
        let (client, transport) = client_with(vec![
            reply(json!({"code": "20000", "msg": "Service unavailable"})),
            reply(json!({"code": "10000", "trade_token": "tok-2"})),
        ]);

        let payment = client.create_app_payment(express_order()).await.unwrap();
        assert_eq!(payment.trade_token.as_deref(), Some("tok-2"));
        assert_eq!(transport.calls(), 2);

        // Retries resend the identical signed envelope
        let first = transport.envelope(0);
        let second = transport.envelope(1);
        assert_eq!(first.request_no, second.request_no);
        assert_eq!(first.sign, second.sign);
    }

    #[tokio::test]
    async fn test_non_retryable_gateway_error_fails_fast() {
        let (client, transport) = client_with(vec![reply(json!({
            "code": "40002",
            "msg": "Invalid parameter",
            "sub_code": "INVALID_PARAMETER"
        }))]);

        let err = client
            .create_reference_payment(express_order())
            .await
            .unwrap_err();
        assert!(matches!(err, PayPayError::Gateway { .. }));
        assert!(!err.is_retryable());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_attempts_bound_total_calls() {
        let (private_pem, _) = test_pems();
        let config = PayPayConfig::new("200001234567", private_pem.clone()).with_retry_attempts(2);
        let transport = MockTransport::new(vec![
            reply(json!({"code": "20000"})),
            reply(json!({"code": "20000"})),
            reply(json!({"code": "20000"})),
        ]);
        let client = PayPayClient::new(config)
            .unwrap()
            .with_transport(transport.clone())
            .with_ip_resolver(Arc::new(StaticIp("102.140.65.1")));

        let err = client.close_order("ORDER-2024-001").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_destroy_blocks_later_operations() {
        let (client, transport) = client_with(vec![reply(json!({"code": "10000"}))]);

        client.destroy();
        client.destroy(); // idempotent

        assert!(client.key_info().cleared);
        let err = client.order_status("ORDER-2024-001").await.unwrap_err();
        assert!(matches!(err, PayPayError::Crypto(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_generate_trade_no_is_valid_and_unique() {
        let a = PayPayClient::generate_trade_no("ORDER-");
        let b = PayPayClient::generate_trade_no("ORDER-");
        assert!(a.starts_with("ORDER-"));
        assert_ne!(a, b);
        assert!(validate::validate_trade_no(&a).is_ok());
    }

    #[test]
    fn test_debug_output_hides_key_material() {
        let (client, _) = client_with(vec![]);
        let debug = format!("{client:?}");
        assert!(!debug.contains("BEGIN"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
