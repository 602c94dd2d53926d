//! Resolve a name over DNS-over-TLS and validate the DNSSEC chain
//! locally: `cargo run --example lookup -- nlnetlabs.nl`

use std::sync::Arc;

use dnsanchor::{Client, Nameserver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dnsanchor=info".into()),
        )
        .init();

    let domain = std::env::args().nth(1).unwrap_or_else(|| "nlnetlabs.nl".to_string());

    let client = Client::new(vec![
        Arc::new(Nameserver::tls("8.8.8.8".parse()?, 853, "dns.google")),
        Arc::new(Nameserver::tls("2001:4860:4860::8888".parse()?, 853, "dns.google")),
    ]);

    let (answers, _message, latency) = client.query_a(&domain).await?;

    println!("{} answers found in {latency:?}", answers.len());
    for (i, answer) in answers.iter().enumerate() {
        println!("answer {i}: {answer}");
    }

    Ok(())
}
