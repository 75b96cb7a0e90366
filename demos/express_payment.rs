//! Example Multicaixa Express payment.
//!
//! Pushes a payment prompt to the payer's phone and prints the gateway's
//! reply. Requires real merchant credentials.
//!
//! Run with:
//! ```bash
//! cargo run --example express_payment
//! ```
//!
//! Environment variables:
//! - PAYPAY_PARTNER_ID: Merchant partner id
//! - PAYPAY_PRIVATE_KEY: Merchant RSA private key PEM (escaped newlines are fine)
//! - PAYPAY_PUBLIC_KEY: Optional PayPay public key PEM for response verification
//! - PAYER_PHONE: Payer phone number, e.g. 923456789
//! - AMOUNT: Amount in AOA, e.g. 2500

use paypay_ao::{OrderDetails, PayPayClient, PayPayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let partner_id = std::env::var("PAYPAY_PARTNER_ID").unwrap_or_else(|_| {
        println!("⚠️  No PAYPAY_PARTNER_ID set, using placeholder (requests will be rejected)");
        "200001234567".to_string()
    });

    let private_key = match std::env::var("PAYPAY_PRIVATE_KEY") {
        Ok(pem) => pem,
        Err(_) => std::fs::read_to_string("merchant_private_key.pem")
            .map_err(|_| "set PAYPAY_PRIVATE_KEY or provide merchant_private_key.pem")?,
    };

    let phone = std::env::var("PAYER_PHONE").unwrap_or_else(|_| "923456789".to_string());
    let amount: f64 = std::env::var("AMOUNT")
        .unwrap_or_else(|_| "2500".to_string())
        .parse()?;

    println!("🔐 PayPay Express Payment Example");
    println!("   Partner: {}", partner_id);
    println!("   Phone:   {}", phone);
    println!("   Amount:  {} AOA", amount);
    println!();

    let mut config = PayPayConfig::new(&partner_id, private_key);
    if let Ok(public_key) = std::env::var("PAYPAY_PUBLIC_KEY") {
        config = config.with_public_key(public_key);
    }

    let client = PayPayClient::new(config)?;

    let out_trade_no = PayPayClient::generate_trade_no("DEMO-");
    let order = OrderDetails::new(&out_trade_no, amount)
        .with_subject("Express payment demo")
        .with_phone(&phone);

    println!("📡 Creating Express payment {}...", out_trade_no);

    match client.create_express_payment(order).await {
        Ok(payment) => {
            println!("✅ Payment created, waiting for the payer to confirm on their phone");
            if let Some(link) = &payment.dynamic_link {
                println!("🔗 Dynamic link: {}", link);
            }
            if let Some(token) = &payment.trade_token {
                println!("🎫 Trade token: {}", token);
            }
            println!("\n📦 Raw response:");
            println!("{}", serde_json::to_string_pretty(&payment.raw)?);
        }
        Err(e) => {
            eprintln!("❌ Payment failed: {}", e);
            eprintln!("   code: {}, retryable: {}", e.code(), e.is_retryable());
            return Err(e.into());
        }
    }

    println!("\n✨ Done!");
    Ok(())
}
