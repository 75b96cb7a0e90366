//! # paypay-ao
//!
//! A Rust client for the PayPay Africa payment gateway, covering Multicaixa
//! Express, Multicaixa reference and in-app payments in Angola.
//!
//! The gateway speaks a signed-envelope protocol: the business payload is
//! RSA-encrypted with the merchant's private key, wrapped in a form-encoded
//! envelope, and signed with SHA1-RSA over a canonical parameter string.
//! This crate builds those envelopes, talks to the gateway with retries for
//! transient failures, verifies response signatures, and folds the gateway's
//! loosely typed replies into one normalized result type.
//!
//! ## Features
//!
//! - **Multicaixa Express**: push a payment prompt to the payer's phone
//! - **Multicaixa reference**: entity and reference numbers for ATM and bank payment
//! - **In-app payments**: trade tokens and dynamic links for the PayPay app
//! - **Order lifecycle**: status queries and closing of unpaid orders
//! - **Typed errors**: one error enum with retry guidance built in
//! - **Key hygiene**: RSA keys are zeroized on drop and can be wiped early
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paypay_ao::{OrderDetails, PayPayClient, PayPayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PayPayConfig::new(
//!     "200001234567",
//!     std::fs::read_to_string("merchant_private_key.pem")?,
//! );
//! let client = PayPayClient::new(config)?;
//!
//! let order = OrderDetails::new("ORDER-2024-001", 2500.0)
//!     .with_subject("Monthly subscription")
//!     .with_phone("923456789");
//!
//! let payment = client.create_express_payment(order).await?;
//! println!("Trade token: {:?}", payment.trade_token);
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! Every operation follows the same request flow:
//!
//! 1. **Validate locally**: amounts, order numbers, phone numbers and IPs
//!    are checked before any crypto or network work
//! 2. **Build biz content**: the operation's business payload as JSON
//! 3. **Encrypt**: the JSON is RSA-encrypted with the merchant private key
//!    in 117-byte chunks and base64-encoded
//! 4. **Sign**: envelope fields are canonicalized (sorted, `key=value`
//!    joined with `&`, `sign`/`sign_type` excluded) and signed with SHA1-RSA
//! 5. **POST**: the envelope goes to the gateway as a form body
//! 6. **Verify and normalize**: the response signature is checked against
//!    PayPay's public key when configured, then the reply is normalized or
//!    converted into a typed error
//!
//! ## Security
//!
//! - **Private-key encryption**: the gateway protocol encrypts `biz_content`
//!   with the merchant's *private* key, so it authenticates the merchant
//!   rather than hiding the payload; transport privacy comes from TLS
//! - **SHA1 signatures**: a gateway requirement, not a choice this crate
//!   makes; both sides pin the scheme
//! - **Key lifetime**: parsed keys live behind [`keys::KeyMaterial`], are
//!   zeroized on drop, and can be wiped early with
//!   [`client::PayPayClient::destroy`]
//! - **No key leakage**: `Debug` output never contains PEM or modulus bytes
//!
//! ## References
//!
//! - [PayPay Africa](https://paypayafrica.com)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod keys;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;
pub mod validate;

// Re-export commonly used items
pub use client::PayPayClient;
pub use config::{Environment, PayPayConfig};
pub use errors::{GatewayErrorKind, NetworkErrorKind, PayPayError, Result};
pub use keys::{KeyInfo, KeyKind, KeyMaterial};
pub use types::{Language, Operation, OrderDetails, PaymentData, TradeStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_constants() {
        assert_eq!(types::API_VERSION, "1.0");
        assert_eq!(types::SIGN_TYPE_RSA, "RSA");
        assert_eq!(
            config::GATEWAY_ENDPOINT,
            "https://gateway.paypayafrica.com/recv.do"
        );
    }

    #[test]
    fn test_module_accessibility() {
        let order = OrderDetails::new("ORDER-001", 100.0);
        let operation = Operation::StatusQuery {
            out_trade_no: order.out_trade_no.clone(),
        };
        assert_eq!(operation.service().as_str(), "trade_query");

        let config = PayPayConfig::new("200001234567", "pem");
        assert_eq!(config.endpoint(), config::GATEWAY_ENDPOINT);
    }
}
