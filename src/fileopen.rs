//! Opening files for tailing: identity, share-mode opens, and decoding.

#[cfg(not(windows))]
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::sleep;

/// Identifies one file instance at a path. Stable across writes and
/// truncation, changed when the file is deleted and recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    device: u64,
    index: u128,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: meta.dev(),
            index: meta.ino().into(),
        }
    }

    /// Only creation time is portable; it can repeat for a file recreated
    /// under the same name within the filesystem's tunnelling window.
    #[cfg(not(any(unix, windows)))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let created = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        Self {
            device: 0,
            index: created,
        }
    }

    #[cfg(windows)]
    fn from_file_id(id: file_id::FileId) -> Self {
        use file_id::FileId;
        match id {
            FileId::Inode {
                device_id,
                inode_number,
            } => Self {
                device: device_id,
                index: inode_number.into(),
            },
            FileId::LowRes {
                volume_serial_number,
                file_index,
            } => Self {
                device: volume_serial_number.into(),
                index: file_index.into(),
            },
            FileId::HighRes {
                volume_serial_number,
                file_id,
            } => Self {
                device: volume_serial_number,
                index: file_id,
            },
        }
    }

    /// Identity of whatever is at `path` now, without following symlinks.
    #[cfg(not(windows))]
    pub async fn of(path: &Path) -> Option<Self> {
        tokio::fs::symlink_metadata(path)
            .await
            .ok()
            .map(|meta| Self::from_metadata(&meta))
    }

    /// Identity of whatever is at `path` now: volume serial number plus file index.
    #[cfg(windows)]
    pub async fn of(path: &Path) -> Option<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || file_id::get_file_id(&path))
            .await
            .ok()?
            .ok()
            .map(Self::from_file_id)
    }
}

/// Strategy for opening a file so that a writer can keep appending to,
/// rotating, or deleting it while it is being tailed.
pub trait FileOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<std::fs::File>;

    /// Whether to sniff for a UTF-16LE byte-order mark after opening.
    fn detect_bom(&self) -> bool {
        false
    }
}

/// Plain read-only open; sufficient where opening does not lock the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainOpener;

impl FileOpener for PlainOpener {
    fn open(&self, path: &Path) -> io::Result<std::fs::File> {
        std::fs::File::open(path)
    }
}

/// Read-only open that lets other processes write, rename, and delete the file.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedOpener;

#[cfg(windows)]
impl FileOpener for SharedOpener {
    fn open(&self, path: &Path) -> io::Result<std::fs::File> {
        use std::os::windows::fs::OpenOptionsExt;
        const FILE_SHARE_READ: u32 = 0x1;
        const FILE_SHARE_WRITE: u32 = 0x2;
        const FILE_SHARE_DELETE: u32 = 0x4;
        std::fs::OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
            .open(path)
    }

    fn detect_bom(&self) -> bool {
        true
    }
}

#[cfg(windows)]
pub fn default_opener() -> Arc<dyn FileOpener> {
    Arc::new(SharedOpener)
}

#[cfg(not(windows))]
pub fn default_opener() -> Arc<dyn FileOpener> {
    Arc::new(PlainOpener)
}

const UTF16LE_BOM: [u8; 2] = [0xff, 0xfe];

/// Incremental text decoder that holds incomplete sequences between reads.
#[derive(Debug)]
pub enum Decoder {
    Utf8 { pending: Vec<u8> },
    Utf16Le { pending: Vec<u8> },
}

impl Decoder {
    pub fn utf8() -> Self {
        Decoder::Utf8 {
            pending: Vec::new(),
        }
    }

    pub fn utf16le() -> Self {
        Decoder::Utf16Le {
            pending: Vec::new(),
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        match self {
            Decoder::Utf8 { pending } => decode_utf8(pending, bytes),
            Decoder::Utf16Le { pending } => decode_utf16le(pending, bytes),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Decoder::Utf8 { pending } | Decoder::Utf16Le { pending } => pending.clear(),
        }
    }
}

fn decode_utf8(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return out;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match err.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    // Sequence cut short by the end of the read
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

fn decode_utf16le(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut units: Vec<u16> = pending
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let mut keep = pending.len() % 2;
    if units.last().is_some_and(|u| (0xd800..0xdc00).contains(u)) {
        units.pop();
        keep += 2;
    }
    let out = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    let consumed = pending.len() - keep;
    pending.drain(..consumed);
    out
}

/// Attempts and delay while waiting for a producer to write its BOM.
#[derive(Debug, Clone, Copy)]
pub struct BomProbe {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for BomProbe {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(50),
        }
    }
}

/// An open file plus the decoding state for reading it incrementally.
pub struct TailReader {
    file: File,
    decoder: Decoder,
    data_start: u64,
    position: u64,
}

impl TailReader {
    pub async fn open(path: &Path, opener: &dyn FileOpener, probe: BomProbe) -> io::Result<Self> {
        let file = File::from_std(opener.open(path)?);
        let mut reader = Self {
            file,
            decoder: Decoder::utf8(),
            data_start: 0,
            position: 0,
        };
        if opener.detect_bom() {
            reader.sniff_bom(probe).await?;
        }
        Ok(reader)
    }

    async fn sniff_bom(&mut self, probe: BomProbe) -> io::Result<()> {
        for attempt in 0..probe.attempts {
            self.file.seek(SeekFrom::Start(0)).await?;
            let mut head = [0u8; 2];
            let mut filled = 0;
            while filled < head.len() {
                let n = self.file.read(&mut head[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == head.len() {
                if head == UTF16LE_BOM {
                    tracing::debug!("UTF-16LE byte-order mark detected");
                    self.decoder = Decoder::utf16le();
                    self.data_start = 2;
                    self.position = 2;
                    return Ok(());
                }
                // Real content already present, a BOM can no longer appear
                break;
            }
            if attempt + 1 < probe.attempts {
                sleep(probe.delay).await;
            }
        }
        self.file.seek(SeekFrom::Start(0)).await?;
        self.decoder = Decoder::utf8();
        self.data_start = 0;
        self.position = 0;
        Ok(())
    }

    /// Read and decode up to `limit` bytes of what is available; empty when at the end.
    pub async fn read_available(&mut self, limit: usize) -> io::Result<String> {
        let mut bytes = Vec::new();
        let n = (&mut self.file).take(limit as u64).read_to_end(&mut bytes).await?;
        self.position += n as u64;
        Ok(self.decoder.decode(&bytes))
    }

    /// Bytes consumed so far, counted from the start of the file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current length of the open file.
    pub async fn file_len(&self) -> io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    /// Start over from the first byte after the BOM, if any.
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.data_start)).await?;
        self.position = self.data_start;
        self.decoder.clear();
        Ok(())
    }
}
