//! Input validation for payment parameters.
//!
//! Everything the caller supplies is checked here before any crypto or
//! network work starts, so a bad phone number can never cost an RSA
//! operation or an HTTP round trip. Failures carry the offending field,
//! the value as given and the expected format.

use std::net::IpAddr;

use url::Url;

use crate::errors::{PayPayError, Result};

/// Minimum order amount in AOA.
pub const MIN_AMOUNT: f64 = 1.0;

/// Maximum order amount in AOA.
pub const MAX_AMOUNT: f64 = 10_000_000_000_000.0;

/// Minimum merchant order number length.
pub const TRADE_NO_MIN_LEN: usize = 6;

/// Maximum merchant order number length.
pub const TRADE_NO_MAX_LEN: usize = 32;

/// Maximum subject length.
pub const SUBJECT_MAX_LEN: usize = 128;

/// Validates an order amount: positive, within bounds, at most two
/// decimal places.
pub fn validate_amount(amount: f64) -> Result<()> {
    let as_given = || format!("{amount}");
    let expected = "1.00 to 10000000000000.00 AOA, at most 2 decimal places";

    if !amount.is_finite() {
        return Err(PayPayError::validation(
            "amount",
            as_given(),
            "must be a finite number",
            expected,
        ));
    }
    if amount <= 0.0 {
        return Err(PayPayError::validation(
            "amount",
            as_given(),
            "must be greater than zero",
            expected,
        ));
    }
    if amount < MIN_AMOUNT {
        return Err(PayPayError::validation(
            "amount",
            as_given(),
            "is below the minimum amount",
            expected,
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(PayPayError::validation(
            "amount",
            as_given(),
            "exceeds the maximum amount",
            expected,
        ));
    }
    // Judged on the shortest round-trip representation: scaling to cents
    // loses sub-cent resolution near MAX_AMOUNT.
    let repr = as_given();
    if let Some((_, frac)) = repr.split_once('.') {
        if frac.len() > 2 {
            return Err(PayPayError::validation(
                "amount",
                repr,
                "must have at most two decimal places",
                expected,
            ));
        }
    }
    Ok(())
}

/// Renders an already-validated amount the way the gateway expects it:
/// a fixed two-decimal string.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Validates a merchant order number: 6 to 32 chars from
/// `[A-Za-z0-9_-]`.
pub fn validate_trade_no(out_trade_no: &str) -> Result<()> {
    let expected = "6-32 characters from [A-Za-z0-9_-]";
    let len = out_trade_no.len();
    if len < TRADE_NO_MIN_LEN || len > TRADE_NO_MAX_LEN {
        return Err(PayPayError::validation(
            "out_trade_no",
            out_trade_no,
            format!("length {len} is outside the allowed 6-32 range"),
            expected,
        ));
    }
    if !out_trade_no
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PayPayError::validation(
            "out_trade_no",
            out_trade_no,
            "contains characters outside [A-Za-z0-9_-]",
            expected,
        ));
    }
    Ok(())
}

/// Validates an order subject: non-empty after trimming, at most 128
/// chars, free of markup-sensitive characters.
pub fn validate_subject(subject: &str) -> Result<()> {
    let expected = "1-128 characters without <>'\"&";
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return Err(PayPayError::validation(
            "subject",
            subject,
            "must not be empty",
            expected,
        ));
    }
    if trimmed.chars().count() > SUBJECT_MAX_LEN {
        return Err(PayPayError::validation(
            "subject",
            subject,
            "exceeds the 128 character limit",
            expected,
        ));
    }
    if trimmed.chars().any(|c| matches!(c, '<' | '>' | '\'' | '"' | '&')) {
        return Err(PayPayError::validation(
            "subject",
            subject,
            "contains forbidden characters",
            expected,
        ));
    }
    Ok(())
}

/// Validates and normalizes an Angolan phone number to `244XXXXXXXXX`.
///
/// Accepted inputs, after stripping spaces, dashes and parentheses:
/// `244` + 9-digit mobile (`2449XXXXXXXX`), `244` + landline
/// (`2442XXXXXXX`), or a bare 9-digit mobile (`9XXXXXXXX`) which gets the
/// country code prepended.
///
/// # Examples
///
/// ```
/// use paypay_ao::validate::normalize_phone;
///
/// assert_eq!(normalize_phone("900123456").unwrap(), "244900123456");
/// assert_eq!(normalize_phone("244900123456").unwrap(), "244900123456");
/// assert!(normalize_phone("12345").is_err());
/// ```
pub fn normalize_phone(phone: &str) -> Result<String> {
    let expected = "244XXXXXXXXX, 2442XXXXXXX or 9XXXXXXXX";
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        if cleaned.len() == 12 && cleaned.starts_with("2449") {
            return Ok(cleaned);
        }
        if cleaned.len() == 11 && cleaned.starts_with("2442") {
            return Ok(cleaned);
        }
        if cleaned.len() == 9 && cleaned.starts_with('9') {
            return Ok(format!("244{cleaned}"));
        }
    }

    Err(PayPayError::validation(
        "phone_num",
        phone,
        "is not a recognized Angolan phone number",
        expected,
    ))
}

/// Validates an IP address (v4 or v6).
pub fn validate_ip(ip: &str) -> Result<()> {
    ip.parse::<IpAddr>().map(|_| ()).map_err(|_| {
        PayPayError::validation(
            "payer_ip",
            ip,
            "is not a valid IP address",
            "dotted IPv4 or IPv6 literal",
        )
    })
}

/// Validates an http(s) URL, used for endpoint overrides.
pub fn validate_url(value: &str) -> Result<()> {
    let parsed = Url::parse(value).map_err(|_| {
        PayPayError::validation("url", value, "is not a valid URL", "http(s) URL")
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PayPayError::validation(
            "url",
            value,
            format!("scheme '{other}' is not supported"),
            "http(s) URL",
        )),
    }
}
