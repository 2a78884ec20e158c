//! Live tail of growing log files and command output, rendered as HTML
//! fragments and delivered as a stream of chunks.
//!
//! [`SourceRegistry`] lists the selectable sources and opens one of them as a
//! [`Chunks`] stream. File sources follow their path across creation,
//! rotation, truncation and deletion; command sources end when the process
//! exits.

#[cfg(feature = "ansi")]
pub mod ansi;
pub mod app;
pub mod cli;
pub mod error;
pub mod fileopen;
pub mod filter;
pub mod log;
pub mod logging;
pub mod mock;
pub mod process;
pub mod registry;
pub mod render;
pub mod settings;
pub mod sse;

pub use error::SourceError;
pub use registry::{Chunks, Plan, SourceRegistry, SourceSelector};
pub use render::{RenderStyle, Renderer};
pub use settings::TailSettings;
