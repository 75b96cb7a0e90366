//! Gateway response handling: signature checks and normalization.
//!
//! Raw replies are loosely typed (two success conventions, two trade
//! number fields, amounts as strings or numbers). This module folds them
//! into either a [`PaymentData`] or a classified [`PayPayError::Gateway`],
//! so callers never branch on raw gateway codes.

use serde_json::Value;

use crate::crypto;
use crate::errors::{GatewayErrorKind, PayPayError, Result};
use crate::keys::KeyMaterial;
use crate::types::{GatewayResponse, PaymentData, TradeStatus};

/// Verifies the gateway's signature over a response.
///
/// Responses without a `sign` field pass unchecked: the gateway omits the
/// signature on some error replies, and rejecting those would hide the
/// actual error from the caller.
pub fn verify_signature(response: &GatewayResponse, public_key: &KeyMaterial) -> Result<()> {
    let sign = match response.sign.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(()),
    };

    let params = response.params_for_signature();
    if crypto::verify_params(&params, sign, public_key) {
        Ok(())
    } else {
        Err(PayPayError::Crypto(
            "Gateway response signature verification failed".to_string(),
        ))
    }
}

/// Converts a raw reply into [`PaymentData`], or the gateway's error.
///
/// Success is recognized under both conventions (`code == "10000"` or the
/// legacy `is_success` flag). Anything else becomes a
/// [`PayPayError::Gateway`] whose kind drives retry decisions.
pub fn normalize(response: GatewayResponse) -> Result<PaymentData> {
    if !response.indicates_success() {
        return Err(failure_to_error(&response));
    }

    Ok(PaymentData {
        out_trade_no: response.out_trade_no.clone(),
        trade_no: response
            .trade_no
            .clone()
            .or_else(|| response.inner_trade_no.clone()),
        dynamic_link: response.dynamic_link.clone(),
        trade_token: response.trade_token.clone(),
        reference_id: response.reference_id.clone(),
        entity_id: response.entity_id.clone(),
        total_amount: parse_amount(response.total_amount.as_ref()),
        return_url: response.return_url.clone(),
        qr_code: response.qr_code.clone(),
        trade_status: parse_status(&response),
        gmt_payment: response.gmt_payment.clone(),
        raw: response,
    })
}

/// Builds the error for a non-success reply.
///
/// Classification tries the primary code first, then the sub code, so a
/// reply like `{"code": "40000", "sub_code": "INVALID_SIGNATURE"}` still
/// lands in the crypto family.
fn failure_to_error(response: &GatewayResponse) -> PayPayError {
    let code = response
        .code
        .clone()
        .or_else(|| response.sub_code.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let mut kind = GatewayErrorKind::from_code(&code);
    if kind == GatewayErrorKind::Unknown {
        if let Some(sub_code) = response.sub_code.as_deref() {
            let sub_kind = GatewayErrorKind::from_code(sub_code);
            if sub_kind != GatewayErrorKind::Unknown {
                kind = sub_kind;
            }
        }
    }

    let message = response
        .sub_msg
        .clone()
        .or_else(|| response.msg.clone())
        .unwrap_or_else(|| "Unknown gateway error".to_string());

    PayPayError::Gateway {
        kind,
        code,
        message,
        sub_code: response.sub_code.clone(),
        sub_msg: response.sub_msg.clone(),
    }
}

fn parse_amount(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_status(response: &GatewayResponse) -> Option<TradeStatus> {
    response
        .trade_status
        .as_deref()
        .or(response.status.as_deref())
        .map(TradeStatus::from)
}
