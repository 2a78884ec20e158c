use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;

use crate::log::LogSource;
use crate::render::{NOTICE_EOF, notice};

const PALETTE: [&str; 5] = ["black", "black", "black", "blue", "red"];

/// Synthetic counter for exercising the streaming path without a real origin.
pub struct MockTail {
    pub count: usize,
    pub delay: Duration,
}

/// Markup of the `i`-th mock item.
pub fn mock_item(i: usize) -> String {
    format!(
        r#"count=<span style="color: {}">{i}</span><br>"#,
        PALETTE[i % PALETTE.len()]
    )
}

#[async_trait::async_trait]
impl LogSource for MockTail {
    async fn stream(self, tx: Sender<String>) -> Result<()> {
        for i in 0..self.count {
            sleep(self.delay).await;
            if tx.send(mock_item(i)).await.is_err() {
                return Ok(());
            }
        }
        let _ = tx.send(notice(NOTICE_EOF)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn yields_count_items_then_eof() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = MockTail {
            count: 7,
            delay: Duration::from_millis(1),
        };
        tokio::spawn(source.stream(tx));

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks[3], r#"count=<span style="color: blue">3</span><br>"#);
        assert_eq!(chunks[4], r#"count=<span style="color: red">4</span><br>"#);
        assert_eq!(chunks[5], mock_item(5));
        assert_eq!(chunks.last().unwrap(), &notice(NOTICE_EOF));
    }
}
