//! Core type definitions for the PayPay gateway protocol.
//!
//! Wire-facing structs (biz content, request envelope, gateway response)
//! plus the domain types callers hand to the client. Wire field names
//! follow the gateway's snake_case convention, so most structs serialize
//! without renames.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway API version sent in every request envelope.
pub const API_VERSION: &str = "1.0";

/// Character set declared in every request envelope.
pub const CHARSET_UTF8: &str = "UTF-8";

/// Payload format declared in every request envelope.
pub const FORMAT_JSON: &str = "JSON";

/// Signature type declared in every request envelope.
pub const SIGN_TYPE_RSA: &str = "RSA";

/// Currency for all Multicaixa trades.
pub const CURRENCY_AOA: &str = "AOA";

/// Cashier type for SDK-initiated payments.
pub const CASHIER_TYPE_SDK: &str = "SDK";

/// Order expiry window requested from the gateway.
pub const TIMEOUT_EXPRESS: &str = "15m";

/// Pay product code for Multicaixa payments.
pub const PAY_PRODUCT_CODE_MULTICAIXA: &str = "31";

/// Bank code selecting the Multicaixa Express push flow.
pub const BANK_CODE_EXPRESS: &str = "MUL";

/// Bank code selecting the Multicaixa reference flow.
pub const BANK_CODE_REFERENCE: &str = "REF";

/// Sale product code assigned to SDK merchants by default.
pub const DEFAULT_SALE_PRODUCT_CODE: &str = "050200030";

/// Gateway success code.
pub const SUCCESS_CODE: &str = "10000";

/// Gateway service names, all routed through the single `recv.do` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Create a payment (Express, reference or in-app)
    InstantTrade,
    /// Query the state of an existing order
    TradeQuery,
    /// Close an unpaid order
    TradeClose,
}

impl Service {
    /// Wire name of the service.
    pub fn as_str(self) -> &'static str {
        match self {
            Service::InstantTrade => "instant_trade",
            Service::TradeQuery => "trade_query",
            Service::TradeClose => "trade_close",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Language for gateway-rendered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Portuguese
    Pt,
    /// English
    #[default]
    En,
}

impl Language {
    /// Wire name of the language.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::En => "en",
        }
    }
}

/// Order details supplied by the caller when creating a payment.
///
/// # Examples
///
/// ```
/// use paypay_ao::types::OrderDetails;
///
/// let order = OrderDetails::new("ORDER-2024-001", 2500.0)
///     .with_subject("Monthly subscription")
///     .with_phone("923456789");
/// ```
#[derive(Debug, Clone)]
pub struct OrderDetails {
    /// Merchant order number, unique per partner (6-32 chars, `[A-Za-z0-9_-]`)
    pub out_trade_no: String,

    /// Amount in AOA, at most two decimal places
    pub amount: f64,

    /// Order subject shown to the payer; defaults to "Purchase"
    pub subject: Option<String>,

    /// Payer phone number, required for Express payments
    pub phone_num: Option<String>,

    /// Payer IP address; resolved automatically when absent
    pub payer_ip: Option<String>,
}

impl OrderDetails {
    /// Creates order details with the mandatory fields.
    pub fn new(out_trade_no: &str, amount: f64) -> Self {
        OrderDetails {
            out_trade_no: out_trade_no.to_string(),
            amount,
            subject: None,
            phone_num: None,
            payer_ip: None,
        }
    }

    /// Sets the order subject.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Sets the payer phone number.
    pub fn with_phone(mut self, phone_num: &str) -> Self {
        self.phone_num = Some(phone_num.to_string());
        self
    }

    /// Sets the payer IP, bypassing automatic resolution.
    pub fn with_payer_ip(mut self, payer_ip: &str) -> Self {
        self.payer_ip = Some(payer_ip.to_string());
        self
    }
}

/// One gateway operation, tagged by flow.
///
/// Every request the client can make is one of these variants, so a
/// status query can never carry payment fields and an Express payment
/// cannot lose its order details.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Multicaixa Express: push a payment prompt to the payer's phone
    Express {
        /// Order to charge; `phone_num` is mandatory here
        order: OrderDetails,
    },
    /// Multicaixa reference: payer settles at an ATM or bank using a reference number
    Reference {
        /// Order to charge
        order: OrderDetails,
    },
    /// Payment completed inside the PayPay app
    AppPayment {
        /// Order to charge
        order: OrderDetails,
    },
    /// Query the current state of an order
    StatusQuery {
        /// Merchant order number to look up
        out_trade_no: String,
    },
    /// Close an order that has not been paid
    CloseOrder {
        /// Merchant order number to close
        out_trade_no: String,
    },
}

impl Operation {
    /// Gateway service this operation maps to.
    pub fn service(&self) -> Service {
        match self {
            Operation::Express { .. }
            | Operation::Reference { .. }
            | Operation::AppPayment { .. } => Service::InstantTrade,
            Operation::StatusQuery { .. } => Service::TradeQuery,
            Operation::CloseOrder { .. } => Service::TradeClose,
        }
    }

    /// Merchant order number the operation targets.
    pub fn out_trade_no(&self) -> &str {
        match self {
            Operation::Express { order }
            | Operation::Reference { order }
            | Operation::AppPayment { order } => &order.out_trade_no,
            Operation::StatusQuery { out_trade_no } | Operation::CloseOrder { out_trade_no } => {
                out_trade_no
            }
        }
    }
}

/// Trade details nested inside [`BizContent`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TradeInfo {
    /// Trade currency, always `"AOA"`
    pub currency: String,

    /// Merchant order number
    pub out_trade_no: String,

    /// Payee identity, the merchant's partner id
    pub payee_identity: String,

    /// Payee identity type, `"1"` for partner ids
    pub payee_identity_type: String,

    /// Unit price as a two-decimal string
    pub price: String,

    /// Quantity, `"1"` for SDK trades
    pub quantity: String,

    /// Subject shown to the payer
    pub subject: String,

    /// Total amount as a two-decimal string
    pub total_amount: String,
}

/// Payment method selector for Multicaixa flows.
///
/// Express payments carry the payer's phone number; reference payments
/// do not. In-app payments omit the pay method entirely.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayMethod {
    /// Pay product code, `"31"` for Multicaixa
    pub pay_product_code: String,

    /// Amount as a two-decimal string
    pub amount: String,

    /// `"MUL"` for Express, `"REF"` for reference
    pub bank_code: String,

    /// Payer phone number in `244XXXXXXXXX` form (Express only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_num: Option<String>,
}

/// Plaintext business payload, encrypted into the envelope's `biz_content`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BizContent {
    /// Cashier type, `"SDK"` for this library
    pub cashier_type: String,

    /// Payer IP address
    pub payer_ip: String,

    /// Merchant's sale product code
    pub sale_product_code: String,

    /// Order expiry window, `"15m"`
    pub timeout_express: String,

    /// The trade being created
    pub trade_info: TradeInfo,

    /// Payment method; absent for in-app payments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_method: Option<PayMethod>,
}

/// Minimal biz content for `trade_query` and `trade_close` requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrderRef {
    /// Merchant order number the operation targets
    pub out_trade_no: String,
}

/// The complete signed request sent to the gateway as form fields.
#[derive(Serialize, Debug, Clone)]
pub struct RequestEnvelope {
    /// Always `"UTF-8"`
    pub charset: String,

    /// RSA-encrypted, base64-encoded business payload
    pub biz_content: String,

    /// Merchant partner id
    pub partner_id: String,

    /// Service name, see [`Service`]
    pub service: String,

    /// Fresh request id, 32 lowercase hex chars
    pub request_no: String,

    /// Always `"JSON"`
    pub format: String,

    /// Always `"RSA"`
    pub sign_type: String,

    /// Always `"1.0"`
    pub version: String,

    /// Gateway-local (UTC+1) time, `YYYY-MM-DD HH:mm:ss`
    pub timestamp: String,

    /// `"pt"` or `"en"`
    pub language: String,

    /// RSA-SHA1 signature over every other field
    pub sign: String,
}

impl RequestEnvelope {
    /// Flattens the envelope into `(name, value)` pairs for signing and
    /// form encoding.
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("charset".to_string(), self.charset.clone()),
            ("biz_content".to_string(), self.biz_content.clone()),
            ("partner_id".to_string(), self.partner_id.clone()),
            ("service".to_string(), self.service.clone()),
            ("request_no".to_string(), self.request_no.clone()),
            ("format".to_string(), self.format.clone()),
            ("sign_type".to_string(), self.sign_type.clone()),
            ("version".to_string(), self.version.clone()),
            ("timestamp".to_string(), self.timestamp.clone()),
            ("language".to_string(), self.language.clone()),
            ("sign".to_string(), self.sign.clone()),
        ]
    }
}

/// Raw gateway response, as deserialized from the reply body.
///
/// Every field is optional: error replies carry only codes, success
/// replies carry a flow-dependent subset of the business fields. Fields
/// this library does not know about are preserved in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GatewayResponse {
    /// Gateway result code, `"10000"` on success
    pub code: Option<String>,

    /// Human message for `code`
    pub msg: Option<String>,

    /// More specific error code
    pub sub_code: Option<String>,

    /// Human message for `sub_code`
    pub sub_msg: Option<String>,

    /// Legacy success flag, `"T"` or `true` on older responses
    pub is_success: Option<Value>,

    /// Gateway signature over the response fields
    pub sign: Option<String>,

    /// Signature type, `"RSA"` when signed
    pub sign_type: Option<String>,

    /// Payment link for payer-facing flows
    pub dynamic_link: Option<String>,

    /// Token identifying the trade in the PayPay app
    pub trade_token: Option<String>,

    /// Merchant order number, echoed back
    pub out_trade_no: Option<String>,

    /// Gateway-side trade number (older field name)
    pub inner_trade_no: Option<String>,

    /// Gateway-side trade number
    pub trade_no: Option<String>,

    /// Multicaixa reference number for reference payments
    pub reference_id: Option<String>,

    /// Multicaixa entity id for reference payments
    pub entity_id: Option<String>,

    /// Trade amount; the gateway sends either a string or a number
    pub total_amount: Option<Value>,

    /// Return URL for redirect flows
    pub return_url: Option<String>,

    /// QR code payload for scan-to-pay flows
    pub qr_code: Option<String>,

    /// Order status (older field name)
    pub status: Option<String>,

    /// Trade status, see [`TradeStatus`]
    pub trade_status: Option<String>,

    /// Payment completion time reported by the gateway
    pub gmt_payment: Option<String>,

    /// Any response fields this library does not model
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GatewayResponse {
    /// Whether the legacy `is_success` flag reports success.
    pub fn is_success_flag(&self) -> bool {
        match &self.is_success {
            Some(Value::String(s)) => s == "T",
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Success per both gateway conventions: `code == "10000"` or the
    /// legacy `is_success` flag.
    pub fn indicates_success(&self) -> bool {
        self.code.as_deref() == Some(SUCCESS_CODE) || self.is_success_flag()
    }

    /// Flattens present scalar fields into `(name, value)` pairs for
    /// signature verification.
    ///
    /// Null and nested values are skipped, matching what the gateway
    /// feeds into its own signature.
    pub fn params_for_signature(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Ok(Value::Object(map)) = serde_json::to_value(self) {
            for (key, value) in map {
                let rendered = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                params.push((key, rendered));
            }
        }
        params
    }
}

/// Lifecycle states the gateway reports for a trade.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TradeStatus {
    /// Order created, waiting for the payer to act
    #[serde(rename = "WAIT_BUYER_PAY")]
    WaitBuyerPay,
    /// Payment completed
    #[serde(rename = "TRADE_SUCCESS")]
    TradeSuccess,
    /// Payment completed and settled
    #[serde(rename = "TRADE_FINISHED")]
    TradeFinished,
    /// Order closed without payment
    #[serde(rename = "TRADE_CLOSED")]
    TradeClosed,
    /// A status value this library does not recognize, preserved verbatim
    #[serde(untagged)]
    Other(String),
}

impl TradeStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &str {
        match self {
            TradeStatus::WaitBuyerPay => "WAIT_BUYER_PAY",
            TradeStatus::TradeSuccess => "TRADE_SUCCESS",
            TradeStatus::TradeFinished => "TRADE_FINISHED",
            TradeStatus::TradeClosed => "TRADE_CLOSED",
            TradeStatus::Other(s) => s,
        }
    }
}

impl From<&str> for TradeStatus {
    fn from(value: &str) -> Self {
        match value {
            "WAIT_BUYER_PAY" => TradeStatus::WaitBuyerPay,
            "TRADE_SUCCESS" => TradeStatus::TradeSuccess,
            "TRADE_FINISHED" => TradeStatus::TradeFinished,
            "TRADE_CLOSED" => TradeStatus::TradeClosed,
            other => TradeStatus::Other(other.to_string()),
        }
    }
}

/// Normalized outcome of a successful gateway operation.
///
/// Business fields are coerced to usable types; the untouched reply is
/// kept in `raw` for diagnostics.
#[derive(Serialize, Debug, Clone)]
pub struct PaymentData {
    /// Merchant order number
    pub out_trade_no: Option<String>,

    /// Gateway-side trade number (`inner_trade_no`/`trade_no` coalesced)
    pub trade_no: Option<String>,

    /// Payment link for payer-facing flows
    pub dynamic_link: Option<String>,

    /// Token identifying the trade in the PayPay app
    pub trade_token: Option<String>,

    /// Multicaixa reference number
    pub reference_id: Option<String>,

    /// Multicaixa entity id
    pub entity_id: Option<String>,

    /// Trade amount in AOA
    pub total_amount: Option<f64>,

    /// Return URL for redirect flows
    pub return_url: Option<String>,

    /// QR code payload
    pub qr_code: Option<String>,

    /// Current trade status
    pub trade_status: Option<TradeStatus>,

    /// Payment completion time
    pub gmt_payment: Option<String>,

    /// The response exactly as the gateway sent it
    pub raw: GatewayResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_biz_content_serialization() {
        let content = BizContent {
            cashier_type: CASHIER_TYPE_SDK.to_string(),
            payer_ip: "102.140.65.1".to_string(),
            sale_product_code: DEFAULT_SALE_PRODUCT_CODE.to_string(),
            timeout_express: TIMEOUT_EXPRESS.to_string(),
            trade_info: TradeInfo {
                currency: CURRENCY_AOA.to_string(),
                out_trade_no: "ORDER-001".to_string(),
                payee_identity: "200001234567".to_string(),
                payee_identity_type: "1".to_string(),
                price: "2500.00".to_string(),
                quantity: "1".to_string(),
                subject: "Test order".to_string(),
                total_amount: "2500.00".to_string(),
            },
            pay_method: Some(PayMethod {
                pay_product_code: PAY_PRODUCT_CODE_MULTICAIXA.to_string(),
                amount: "2500.00".to_string(),
                bank_code: BANK_CODE_EXPRESS.to_string(),
                phone_num: Some("244923456789".to_string()),
            }),
        };

        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains("\"cashier_type\":\"SDK\""));
        assert!(json.contains("\"bank_code\":\"MUL\""));
        assert!(json.contains("\"phone_num\":\"244923456789\""));

        let back: BizContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trade_info.total_amount, "2500.00");
    }

    #[test]
    fn test_pay_method_omits_absent_phone() {
        let method = PayMethod {
            pay_product_code: PAY_PRODUCT_CODE_MULTICAIXA.to_string(),
            amount: "100.00".to_string(),
            bank_code: BANK_CODE_REFERENCE.to_string(),
            phone_num: None,
        };

        let json = serde_json::to_string(&method).unwrap();
        assert!(!json.contains("phone_num"));
    }

    #[test]
    fn test_operation_service_mapping() {
        let order = OrderDetails::new("ORDER-001", 100.0);
        assert_eq!(
            Operation::Express { order: order.clone() }.service(),
            Service::InstantTrade
        );
        assert_eq!(
            Operation::StatusQuery {
                out_trade_no: "ORDER-001".to_string()
            }
            .service(),
            Service::TradeQuery
        );
        assert_eq!(
            Operation::CloseOrder {
                out_trade_no: "ORDER-001".to_string()
            }
            .service(),
            Service::TradeClose
        );
        assert_eq!(
            Operation::Reference { order }.out_trade_no(),
            "ORDER-001"
        );
    }

    #[test]
    fn test_gateway_response_success_conventions() {
        let modern: GatewayResponse =
            serde_json::from_value(json!({"code": "10000", "msg": "Success"})).unwrap();
        assert!(modern.indicates_success());

        let legacy: GatewayResponse =
            serde_json::from_value(json!({"is_success": "T", "trade_token": "tok"})).unwrap();
        assert!(legacy.indicates_success());

        let legacy_bool: GatewayResponse =
            serde_json::from_value(json!({"is_success": true})).unwrap();
        assert!(legacy_bool.indicates_success());

        let failure: GatewayResponse = serde_json::from_value(
            json!({"code": "40002", "sub_code": "INVALID_PARAMETER", "sub_msg": "Invalid amount"}),
        )
        .unwrap();
        assert!(!failure.indicates_success());
    }

    #[test]
    fn test_gateway_response_preserves_unknown_fields() {
        let resp: GatewayResponse = serde_json::from_value(json!({
            "code": "10000",
            "brand_new_field": "value"
        }))
        .unwrap();
        assert_eq!(
            resp.extra.get("brand_new_field"),
            Some(&json!("value"))
        );

        let params = resp.params_for_signature();
        assert!(params.iter().any(|(k, v)| k == "brand_new_field" && v == "value"));
        assert!(params.iter().any(|(k, v)| k == "code" && v == "10000"));
    }

    #[test]
    fn test_trade_status_round_trip() {
        assert_eq!(TradeStatus::from("TRADE_SUCCESS"), TradeStatus::TradeSuccess);
        assert_eq!(TradeStatus::TradeClosed.as_str(), "TRADE_CLOSED");

        let odd = TradeStatus::from("TRADE_PENDING_REVIEW");
        assert_eq!(odd.as_str(), "TRADE_PENDING_REVIEW");
        assert!(matches!(odd, TradeStatus::Other(_)));
    }

    #[test]
    fn test_envelope_to_params() {
        let envelope = RequestEnvelope {
            charset: CHARSET_UTF8.to_string(),
            biz_content: "abc123".to_string(),
            partner_id: "200001234567".to_string(),
            service: Service::InstantTrade.as_str().to_string(),
            request_no: "a".repeat(32),
            format: FORMAT_JSON.to_string(),
            sign_type: SIGN_TYPE_RSA.to_string(),
            version: API_VERSION.to_string(),
            timestamp: "2024-05-01 12:00:00".to_string(),
            language: Language::En.as_str().to_string(),
            sign: "sig".to_string(),
        };

        let params = envelope.to_params();
        assert_eq!(params.len(), 11);
        assert!(params.iter().any(|(k, v)| k == "service" && v == "instant_trade"));
        assert!(params.iter().any(|(k, _)| k == "sign"));
    }
}
