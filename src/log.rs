//! Log ingestion layer: a generic interface for streaming rendered chunks from sources.
//!
//! Every source pushes markup chunks into the channel it is given and stops as
//! soon as the receiving side has gone away. Lifecycle events of the origin
//! (missing file, rotation, process exit) are reported in-band as notices.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::fileopen::{FileIdentity, FileOpener, TailReader};
use crate::render::{
    NOTICE_CREATED, NOTICE_DISAPPEARED, NOTICE_NOT_YET, NOTICE_RECREATED, NOTICE_TRUNCATED,
    Renderer, notice,
};
use crate::settings::TailSettings;

/// Generic trait for log sources.
///
/// Implementors send chunks until their origin ends or the receiver is dropped.
#[async_trait::async_trait]
pub trait LogSource {
    async fn stream(self, tx: Sender<String>) -> Result<()>;
}

/// Follows a file path across creation, rotation, truncation and deletion.
pub struct FileTail {
    pub path: PathBuf,
    pub renderer: Box<dyn Renderer>,
    pub opener: Arc<dyn FileOpener>,
    /// Directory the path must still resolve into each time it is opened.
    pub confine: Option<PathBuf>,
    pub settings: TailSettings,
}

/// Why the read loop gave up on the open file.
enum ReadEnd {
    Recreated(FileIdentity),
    Disappeared,
    ReceiverGone,
}

impl FileTail {
    /// Send a chunk unless it is empty. `false` once the receiver is gone.
    async fn send(tx: &Sender<String>, chunk: String) -> bool {
        chunk.is_empty() || tx.send(chunk).await.is_ok()
    }

    /// Emit the withheld partial line of the old file, then the notice.
    async fn close_instance(&mut self, tx: &Sender<String>, msg: &str) -> bool {
        let rest = self.renderer.flush();
        self.renderer.reset();
        Self::send(tx, rest).await && Self::send(tx, notice(msg)).await
    }

    /// Whether the path currently resolves inside the confining directory.
    /// A path that cannot be resolved is left to the open to fail.
    async fn resolves_inside(&self) -> bool {
        let Some(base) = &self.confine else {
            return true;
        };
        let Ok(real) = tokio::fs::canonicalize(&self.path).await else {
            return true;
        };
        match tokio::fs::canonicalize(base).await {
            Ok(base) => real.starts_with(base),
            Err(_) => false,
        }
    }

    async fn open_reader(&self) -> std::io::Result<TailReader> {
        let opener = self.opener.as_ref();
        TailReader::open(&self.path, opener, self.settings.bom_probe).await
    }

    async fn read_loop(
        &mut self,
        reader: &mut TailReader,
        identity: FileIdentity,
        tx: &Sender<String>,
    ) -> ReadEnd {
        loop {
            match reader.read_available(self.settings.read_limit).await {
                Ok(text) if !text.is_empty() => {
                    let chunk = self.renderer.render(&text);
                    if !Self::send(tx, chunk).await {
                        return ReadEnd::ReceiverGone;
                    }
                    continue;
                }
                Ok(_) => {}
                Err(e) => debug!(path = %self.path.display(), error = %e, "read failed, retrying"),
            }

            match FileIdentity::of(&self.path).await {
                None => return ReadEnd::Disappeared,
                Some(current) if current != identity => return ReadEnd::Recreated(current),
                Some(_) => {}
            }

            if let Ok(len) = reader.file_len().await {
                if len < reader.position() {
                    info!(path = %self.path.display(), "file truncated");
                    if reader.rewind().await.is_err() {
                        return ReadEnd::Disappeared;
                    }
                    if !self.close_instance(tx, NOTICE_TRUNCATED).await {
                        return ReadEnd::ReceiverGone;
                    }
                    continue;
                }
            }

            if tx.is_closed() {
                return ReadEnd::ReceiverGone;
            }
            sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait::async_trait]
impl LogSource for FileTail {
    async fn stream(mut self, tx: Sender<String>) -> Result<()> {
        let mut identity = FileIdentity::of(&self.path).await;
        if identity.is_none() && !Self::send(&tx, notice(NOTICE_NOT_YET)).await {
            return Ok(());
        }

        let mut refused = false;
        loop {
            let Some(current) = FileIdentity::of(&self.path).await else {
                if tx.is_closed() {
                    return Ok(());
                }
                sleep(self.settings.poll_interval).await;
                continue;
            };
            if !self.resolves_inside().await {
                if !refused {
                    warn!(path = %self.path.display(), "path resolves outside the base directory");
                    refused = true;
                }
                if tx.is_closed() {
                    return Ok(());
                }
                sleep(self.settings.poll_interval).await;
                continue;
            }
            refused = false;

            if identity != Some(current) {
                identity = Some(current);
                info!(path = %self.path.display(), "file created");
                self.renderer.reset();
                if !Self::send(&tx, notice(NOTICE_CREATED)).await {
                    return Ok(());
                }
            }

            let mut reader = match self.open_reader().await {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "open failed, retrying");
                    sleep(self.settings.poll_interval).await;
                    continue;
                }
            };
            debug!(path = %self.path.display(), "tailing");

            match self.read_loop(&mut reader, current, &tx).await {
                ReadEnd::Recreated(next) => {
                    info!(path = %self.path.display(), "file recreated");
                    identity = Some(next);
                    if !self.close_instance(&tx, NOTICE_RECREATED).await {
                        return Ok(());
                    }
                }
                ReadEnd::Disappeared => {
                    info!(path = %self.path.display(), "file disappeared");
                    identity = None;
                    if !self.close_instance(&tx, NOTICE_DISAPPEARED).await {
                        return Ok(());
                    }
                }
                ReadEnd::ReceiverGone => {
                    debug!(path = %self.path.display(), "receiver gone");
                    return Ok(());
                }
            }
        }
    }
}
