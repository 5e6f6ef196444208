//! Exercises a running server end to end: health probe, single analysis,
//! batch analysis. Start the server with `cargo run`, then
//! `cargo run --example verify_api`.

use std::env;
use std::time::Duration;

use dotenv::dotenv;
use serde_json::{json, Value};

fn face(label: &str) -> &'static str {
    match label {
        "positive" => "😊",
        "negative" => "😞",
        _ => "😐",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let base_url = env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;

    println!("🔌 Checking {}/health", base_url);
    match client.get(format!("{}/health", base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: Value = resp.json().await?;
            println!("✅ {}", body["message"].as_str().unwrap_or("healthy"));
        }
        Ok(resp) => {
            println!("❌ API returned status {}", resp.status());
            return Ok(());
        }
        Err(e) => {
            println!("❌ Cannot connect to API: {e}");
            println!("   Start the server with `cargo run` first.");
            return Ok(());
        }
    }

    println!("\n=== Single analysis ===");
    let texts = [
        "I absolutely love this new design! It's amazing!",
        "This is terrible, I hate everything about it.",
        "It's okay, nothing special really.",
        "¡Me encanta este proyecto! Es fantástico.",
        "C'est vraiment horrible, je déteste ça.",
    ];
    for text in texts {
        let resp = client
            .post(format!("{}/analyze", base_url))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            println!("❌ /analyze returned status {}", resp.status());
            continue;
        }
        let body: Value = resp.json().await?;
        let label = body["label"].as_str().unwrap_or("?");
        println!("📝 {}", text);
        println!("   {} {} (score {})", face(label), label.to_uppercase(), body["score"]);
    }

    println!("\n=== Batch analysis ===");
    let batch = [
        "Great product, highly recommend!",
        "Poor quality, disappointing experience",
        "Average service, nothing noteworthy",
        "Outstanding customer support team!",
        "Could be better, needs improvement",
    ];
    let resp = client
        .post(format!("{}/batch-analyze", base_url))
        .json(&batch)
        .send()
        .await?;
    if !resp.status().is_success() {
        println!("❌ /batch-analyze returned status {}", resp.status());
        return Ok(());
    }
    let body: Value = resp.json().await?;
    println!("📊 Analyzed {} texts:", body["count"]);
    for item in body["results"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let label = item["sentiment"]["label"].as_str().unwrap_or("?");
        println!(
            "   {} {} (score {}) - {}",
            face(label),
            label.to_uppercase(),
            item["sentiment"]["score"],
            item["text"].as_str().unwrap_or("")
        );
    }

    println!("\n✅ Demo complete. Visit {}/docs for the API documentation.", base_url);
    Ok(())
}
