//! Fetch URLs given on the command line with a bounded concurrency window.
//!
//! ```sh
//! cargo run --example fetch_urls -- https://example.com https://example.org
//! ```

use anyhow::Result;
use fetchq::{ConfigValue, FetchQueue};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut queue = FetchQueue::new()?;
    queue.config(vec![
        ("window".into(), ConfigValue::Int(3)),
        ("timeout".into(), ConfigValue::Int(10)),
        (
            "callback".into(),
            ConfigValue::callback(|body, info| {
                println!(
                    "{:>3} {} ({} bytes in {:?})",
                    info.status,
                    info.url,
                    body.len(),
                    info.elapsed
                );
                if let Some(err) = &info.error {
                    println!("    transfer error: {err}");
                }
            }),
        ),
    ])?;

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = vec![
            "https://httpbin.org/get".into(),
            "https://httpbin.org/uuid".into(),
            "https://httpbin.org/ip".into(),
            "https://httpbin.org/user-agent".into(),
        ];
    }
    for url in urls {
        queue.get(url);
    }

    queue.execute().await?;
    Ok(())
}
