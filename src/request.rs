//! Request construction: validation, biz content and envelope assembly.
//!
//! The pipeline is strict: validate every caller-supplied field, build the
//! per-operation biz content, serialize and encrypt it, then assemble the
//! envelope and sign it last over the complete field set. Invalid input
//! never reaches the crypto engine or the wire.

use crate::config::PayPayConfig;
use crate::crypto;
use crate::errors::{PayPayError, Result};
use crate::keys::KeyMaterial;
use crate::types::{
    BizContent, Operation, OrderDetails, OrderRef, PayMethod, RequestEnvelope, TradeInfo,
    API_VERSION, BANK_CODE_EXPRESS, BANK_CODE_REFERENCE, CASHIER_TYPE_SDK, CHARSET_UTF8,
    CURRENCY_AOA, FORMAT_JSON, PAY_PRODUCT_CODE_MULTICAIXA, SIGN_TYPE_RSA, TIMEOUT_EXPRESS,
};
use crate::validate;

/// Subject used when the caller does not provide one.
pub const DEFAULT_SUBJECT: &str = "Purchase";

/// Validates every caller-supplied field of an operation.
///
/// This runs before payer IP resolution, before any RSA work and before
/// the transport is touched, so rejected input costs nothing.
pub fn validate_operation(operation: &Operation) -> Result<()> {
    match operation {
        Operation::Express { order } => {
            validate_order(order)?;
            let phone = order.phone_num.as_deref().ok_or_else(missing_phone)?;
            validate::normalize_phone(phone)?;
            Ok(())
        }
        Operation::Reference { order } | Operation::AppPayment { order } => validate_order(order),
        Operation::StatusQuery { out_trade_no } | Operation::CloseOrder { out_trade_no } => {
            validate::validate_trade_no(out_trade_no)
        }
    }
}

/// Assembles the complete signed envelope for an operation.
///
/// `payer_ip` is required for payment operations and ignored for status
/// and close requests. The signature is computed over every envelope field
/// except `sign` and `sign_type`, after all other fields are final.
pub fn build_envelope(
    operation: &Operation,
    config: &PayPayConfig,
    key: &KeyMaterial,
    payer_ip: Option<&str>,
) -> Result<RequestEnvelope> {
    validate_operation(operation)?;

    let biz_json = match operation {
        Operation::Express { order } => {
            let ip = require_payer_ip(payer_ip)?;
            let pay_method = express_pay_method(order)?;
            serde_json::to_string(&payment_biz_content(order, Some(pay_method), config, ip))?
        }
        Operation::Reference { order } => {
            let ip = require_payer_ip(payer_ip)?;
            serde_json::to_string(&payment_biz_content(
                order,
                Some(reference_pay_method(order)),
                config,
                ip,
            ))?
        }
        Operation::AppPayment { order } => {
            let ip = require_payer_ip(payer_ip)?;
            serde_json::to_string(&payment_biz_content(order, None, config, ip))?
        }
        Operation::StatusQuery { out_trade_no } | Operation::CloseOrder { out_trade_no } => {
            serde_json::to_string(&OrderRef {
                out_trade_no: out_trade_no.clone(),
            })?
        }
    };

    let mut envelope = RequestEnvelope {
        charset: CHARSET_UTF8.to_string(),
        biz_content: crypto::encrypt_biz_content(&biz_json, key)?,
        partner_id: config.partner_id.clone(),
        service: operation.service().as_str().to_string(),
        request_no: crypto::generate_request_no(),
        format: FORMAT_JSON.to_string(),
        sign_type: SIGN_TYPE_RSA.to_string(),
        version: API_VERSION.to_string(),
        timestamp: crypto::gateway_timestamp(),
        language: config.language.as_str().to_string(),
        sign: String::new(),
    };
    envelope.sign = crypto::sign_params(&envelope.to_params(), key)?;
    Ok(envelope)
}

fn validate_order(order: &OrderDetails) -> Result<()> {
    validate::validate_trade_no(&order.out_trade_no)?;
    validate::validate_amount(order.amount)?;
    if let Some(subject) = &order.subject {
        validate::validate_subject(subject)?;
    }
    if let Some(ip) = &order.payer_ip {
        validate::validate_ip(ip)?;
    }
    Ok(())
}

fn payment_biz_content(
    order: &OrderDetails,
    pay_method: Option<PayMethod>,
    config: &PayPayConfig,
    payer_ip: &str,
) -> BizContent {
    let amount = validate::format_amount(order.amount);
    BizContent {
        cashier_type: CASHIER_TYPE_SDK.to_string(),
        payer_ip: payer_ip.to_string(),
        sale_product_code: config.sale_product_code.clone(),
        timeout_express: TIMEOUT_EXPRESS.to_string(),
        trade_info: TradeInfo {
            currency: CURRENCY_AOA.to_string(),
            out_trade_no: order.out_trade_no.clone(),
            payee_identity: config.partner_id.clone(),
            payee_identity_type: "1".to_string(),
            price: amount.clone(),
            quantity: "1".to_string(),
            subject: order
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            total_amount: amount,
        },
        pay_method,
    }
}

fn express_pay_method(order: &OrderDetails) -> Result<PayMethod> {
    let phone = order.phone_num.as_deref().ok_or_else(missing_phone)?;
    Ok(PayMethod {
        pay_product_code: PAY_PRODUCT_CODE_MULTICAIXA.to_string(),
        amount: validate::format_amount(order.amount),
        bank_code: BANK_CODE_EXPRESS.to_string(),
        phone_num: Some(validate::normalize_phone(phone)?),
    })
}

fn reference_pay_method(order: &OrderDetails) -> PayMethod {
    PayMethod {
        pay_product_code: PAY_PRODUCT_CODE_MULTICAIXA.to_string(),
        amount: validate::format_amount(order.amount),
        bank_code: BANK_CODE_REFERENCE.to_string(),
        phone_num: None,
    }
}

fn require_payer_ip(payer_ip: Option<&str>) -> Result<&str> {
    let ip = payer_ip.ok_or_else(|| {
        PayPayError::validation(
            "payer_ip",
            "",
            "could not be determined",
            "dotted IPv4 or IPv6 literal",
        )
    })?;
    validate::validate_ip(ip)?;
    Ok(ip)
}

fn missing_phone() -> PayPayError {
    PayPayError::validation(
        "phone_num",
        "",
        "is required for Express payments",
        "244XXXXXXXXX, 2442XXXXXXX or 9XXXXXXXX",
    )
}
