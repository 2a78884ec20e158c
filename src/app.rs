use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt, stdout};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::cli::Config;
use crate::filter::{HighlightRule, build_rules};
use crate::registry::{Chunks, SourceRegistry};
use crate::sse;

/// Build the registry described by the configuration.
pub fn registry(config: &Config) -> Result<SourceRegistry> {
    let rules: Arc<[HighlightRule]> = if config.no_highlight {
        Arc::from(Vec::new())
    } else {
        build_rules(&config.highlights)?
    };
    let registry = SourceRegistry::new(&config.base_directory, &config.pattern)?
        .with_rules(rules)
        .with_ansi(!config.plain);
    Ok(registry)
}

/// Application runtime: lists sources, or streams one to stdout.
pub async fn run(config: Config) -> Result<()> {
    let registry = registry(&config)?;

    let Some(source) = config.source.as_deref() else {
        for name in registry.list_sources() {
            println!("{name}");
        }
        return Ok(());
    };

    let mut chunks = registry
        .open(source)
        .with_context(|| format!("cannot open source `{source}`"))?;
    info!(source, "streaming");

    forward(&mut chunks, &mut stdout(), config.sse, tokio::signal::ctrl_c()).await;
    Ok(())
}

/// Write chunks to `out` until the stream ends, `out` closes, or `shutdown` completes.
async fn forward<W, F>(chunks: &mut Chunks, out: &mut W, sse: bool, shutdown: F)
where
    W: AsyncWrite + Unpin,
    F: Future,
{
    tokio::pin!(shutdown);
    loop {
        let chunk = tokio::select! {
            chunk = chunks.next() => chunk,
            _ = &mut shutdown => {
                debug!("interrupted");
                break;
            }
        };
        let Some(chunk) = chunk else { break };
        let framed = if sse {
            sse::frame(&chunk)
        } else {
            format!("{chunk}\n")
        };
        // Closed output ends the stream like a disconnecting client
        if out.write_all(framed.as_bytes()).await.is_err() || out.flush().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, oneshot};
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test]
    async fn forwards_until_stream_ends() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("a".to_string()).await.unwrap();
        tx.send("b\nc".to_string()).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        let mut chunks = ReceiverStream::new(rx);
        forward(&mut chunks, &mut out, true, std::future::pending::<()>()).await;
        assert_eq!(out, b"data: a\n\ndata: b\ndata: c\n\n");
    }

    #[tokio::test]
    async fn one_shutdown_signal_spans_many_chunks() {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut chunks = ReceiverStream::new(rx);
        let mut out = Vec::new();

        let producer = tokio::spawn(async move {
            for i in 0..50 {
                tx.send(format!("{i}")).await.unwrap();
            }
            // Keep the stream open; only the signal can end forwarding
            stop_tx.send(()).unwrap();
            tx
        });
        let forwarding = forward(&mut chunks, &mut out, false, stop_rx);
        tokio::time::timeout(std::time::Duration::from_secs(5), forwarding)
            .await
            .expect("shutdown ends forwarding");
        let _tx = producer.await.unwrap();

        let text = String::from_utf8(out).unwrap();
        for (i, line) in text.lines().enumerate() {
            assert_eq!(line, i.to_string());
        }
    }
}
