//! Example order lifecycle: create, query, close.
//!
//! Creates a Multicaixa reference payment, polls its status once, then
//! closes the unpaid order and confirms the final state.
//!
//! Run with:
//! ```bash
//! cargo run --example order_lifecycle
//! ```
//!
//! Environment variables:
//! - PAYPAY_PARTNER_ID: Merchant partner id
//! - PAYPAY_PRIVATE_KEY: Merchant RSA private key PEM (escaped newlines are fine)
//! - PAYPAY_PUBLIC_KEY: Optional PayPay public key PEM for response verification

use paypay_ao::{OrderDetails, PayPayClient, PayPayConfig, TradeStatus};

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

    println!("🔐 PayPay Order Lifecycle Example");
    println!("   Partner: {}", partner_id);
    println!();

    let mut config = PayPayConfig::new(&partner_id, private_key);
    if let Ok(public_key) = std::env::var("PAYPAY_PUBLIC_KEY") {
        config = config.with_public_key(public_key);
    }

    let client = PayPayClient::new(config)?;
    let out_trade_no = PayPayClient::generate_trade_no("DEMO-");

    // 1. Create a reference payment the payer could settle at an ATM
    println!("📡 Creating reference payment {}...", out_trade_no);
    let order = OrderDetails::new(&out_trade_no, 1000.0).with_subject("Lifecycle demo");
    let payment = client.create_reference_payment(order).await?;

    println!("✅ Reference created");
    if let (Some(entity), Some(reference)) = (&payment.entity_id, &payment.reference_id) {
        println!("🏧 Pay at any Multicaixa ATM: entity {}, reference {}", entity, reference);
    }

    // 2. Query the order state
    println!("\n📡 Querying order status...");
    let status = client.order_status(&out_trade_no).await?;
    match &status.trade_status {
        Some(TradeStatus::WaitBuyerPay) => println!("⏳ Waiting for the payer"),
        Some(other) => println!("ℹ️  Status: {}", other.as_str()),
        None => println!("ℹ️  Gateway reported no status"),
    }

    // 3. Close the unpaid order
    println!("\n📡 Closing order...");
    client.close_order(&out_trade_no).await?;
    println!("✅ Order closed");

    // 4. Confirm the final state
    let final_status = client.order_status(&out_trade_no).await?;
    if final_status.trade_status == Some(TradeStatus::TradeClosed) {
        println!("🔒 Final status: TRADE_CLOSED");
    } else if let Some(other) = &final_status.trade_status {
        println!("ℹ️  Final status: {}", other.as_str());
    }

    // Wipe key material before exit
    client.destroy();

    println!("\n✨ Done!");
    Ok(())
}
