use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use surge_testserver::{DataDelay, TestServerStats};
use tokio::net::TcpListener;

const USAGE: &str = "surge-testserver\n\nUSAGE:\n  surge-testserver [--bind 127.0.0.1:8000] [--data-delay-ms MIN-MAX]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready.";

fn parse_delay(s: &str) -> anyhow::Result<DataDelay> {
    let (min, max) = s.split_once('-').unwrap_or((s, s));
    let min = Duration::from_millis(min.trim().parse()?);
    let max = Duration::from_millis(max.trim().parse()?);
    if max < min {
        anyhow::bail!("--data-delay-ms: max must be >= min, got {s}");
    }
    Ok(DataDelay { min, max })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:8000".parse()?;
    let mut data_delay = DataDelay::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--data-delay-ms" => {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--data-delay-ms requires MIN-MAX"))?;
                data_delay = parse_delay(&v)?;
            }
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let ready = Arc::new(AtomicBool::new(true));
    let app = surge_testserver::router(TestServerStats::default(), data_delay, ready.clone());

    println!("HTTP_URL=http://{addr}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        ready.store(false, Ordering::Relaxed);
    });

    serve.await?;
    Ok(())
}
