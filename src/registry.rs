//! Selectable sources and dispatch of a source name to its tailer.
//!
//! A registry is built once at startup and only read afterwards, so it can be
//! shared between any number of concurrent streams.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::fileopen::{FileOpener, default_opener};
use crate::filter::{HighlightRule, default_rules};
use crate::log::{FileTail, LogSource};
use crate::mock::MockTail;
use crate::process::ProcessTail;
use crate::render::{RenderStyle, ansi_available, build_renderer, effective_style, style_for_file};
use crate::settings::TailSettings;

/// Rendered markup chunks of one stream, in origin order.
pub type Chunks = ReceiverStream<String>;

pub const NO_SELECTION: &str = "";
pub const MOCK: &str = "mock";
pub const COMMAND_A: &str = "commandA";
pub const COMMAND_B: &str = "commandB";

/// `*` and `?` stop at path separators, so `*.log` only matches top-level files.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides which on-disk files may be listed and opened.
pub trait SourceSelector: Send + Sync {
    fn is_selectable(&self, path: &Path) -> bool;
}

impl<F> SourceSelector for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_selectable(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Accepts files whose extension is in a fixed list.
#[derive(Debug, Clone)]
pub struct ExtensionSelector {
    extensions: Vec<String>,
}

impl ExtensionSelector {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ExtensionSelector {
    fn default() -> Self {
        Self::new(["log", "txt", "ansi"])
    }
}

impl SourceSelector for ExtensionSelector {
    fn is_selectable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// A fixed external command offered as a source.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSource {
    pub name: String,
    pub args: Vec<String>,
    pub style: RenderStyle,
}

impl CommandSource {
    pub fn new(name: &str, command_line: &str, style: RenderStyle) -> Self {
        Self {
            name: name.to_string(),
            args: command_line.split_whitespace().map(str::to_string).collect(),
            style,
        }
    }
}

/// `commandA` follows the kernel log in colour, `commandB` lists processes.
pub fn default_commands() -> Vec<CommandSource> {
    vec![
        CommandSource::new(
            COMMAND_A,
            "dmesg --follow --level=info --facility=kern --color=always",
            RenderStyle::Ansi,
        ),
        CommandSource::new(COMMAND_B, "ps a", RenderStyle::Preformatted),
    ]
}

/// What opening a source name will do.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan<'a> {
    Empty,
    Mock,
    Command {
        source: &'a CommandSource,
        style: RenderStyle,
    },
    File {
        path: PathBuf,
        style: RenderStyle,
    },
}

pub struct SourceRegistry {
    base_directory: PathBuf,
    pattern: Pattern,
    selector: Arc<dyn SourceSelector>,
    commands: Vec<CommandSource>,
    rules: Arc<[HighlightRule]>,
    opener: Arc<dyn FileOpener>,
    settings: TailSettings,
    ansi: bool,
}

impl SourceRegistry {
    pub fn new(base_directory: impl Into<PathBuf>, pattern: &str) -> Result<Self, SourceError> {
        let compiled = Pattern::new(pattern).map_err(|source| SourceError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        // Glob yields paths spelled like the pattern, so listing and
        // stripping must agree on one absolute base.
        let base_directory = base_directory.into();
        let base_directory = std::path::absolute(&base_directory).unwrap_or(base_directory);
        Ok(Self {
            base_directory,
            pattern: compiled,
            selector: Arc::new(ExtensionSelector::default()),
            commands: default_commands(),
            rules: default_rules(),
            opener: default_opener(),
            settings: TailSettings::default(),
            ansi: ansi_available(),
        })
    }

    pub fn with_selector(mut self, selector: impl SourceSelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    pub fn with_commands(mut self, commands: Vec<CommandSource>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_rules(mut self, rules: Arc<[HighlightRule]>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn FileOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_settings(mut self, settings: TailSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Turn ANSI conversion off. It cannot be turned on when not compiled in.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled && ansi_available();
        self
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn is_selectable(&self, path: &Path) -> bool {
        self.selector.is_selectable(path)
    }

    /// Selectable files under the base directory, then the synthetic sources.
    pub fn list_sources(&self) -> Vec<String> {
        let base = self.base_directory.to_string_lossy();
        let escaped_base = Pattern::escape(base.trim_end_matches(std::path::MAIN_SEPARATOR));
        let full_pattern = format!("{escaped_base}/{}", self.pattern.as_str());
        debug!(pattern = %full_pattern, "listing sources");

        let mut sources = Vec::new();
        match glob::glob_with(&full_pattern, MATCH_OPTIONS) {
            Ok(paths) => {
                for entry in paths {
                    let path = match entry {
                        Ok(path) => path,
                        Err(e) => {
                            debug!(error = %e, "skipping unreadable entry");
                            continue;
                        }
                    };
                    if !path.is_file() || !self.is_selectable(&path) {
                        continue;
                    }
                    match path.strip_prefix(&self.base_directory) {
                        Ok(relative) => sources.push(relative.to_string_lossy().into_owned()),
                        Err(_) => warn!(path = %path.display(), "listed path outside base"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "invalid listing pattern"),
        }
        sources.push(MOCK.to_string());
        sources.extend(self.commands.iter().map(|c| c.name.clone()));
        sources
    }

    /// Decide how `name` is served without starting anything.
    pub fn plan(&self, name: &str) -> Result<Plan<'_>, SourceError> {
        if name == NO_SELECTION {
            return Ok(Plan::Empty);
        }
        if name == MOCK {
            return Ok(Plan::Mock);
        }
        if let Some(source) = self.commands.iter().find(|c| c.name == name) {
            return Ok(Plan::Command {
                source,
                style: effective_style(source.style, self.ansi),
            });
        }
        let path = self.resolve(name)?;
        let style = style_for_file(&path, self.ansi);
        Ok(Plan::File { path, style })
    }

    /// Map a file source name to a path inside the base directory.
    fn resolve(&self, name: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || relative.as_os_str().is_empty() {
            return Err(SourceError::OutsideBase(name.to_string()));
        }
        let matched = self.pattern.matches_path_with(relative, MATCH_OPTIONS);
        if !self.is_selectable(relative) || !matched {
            return Err(SourceError::NotSelectable(name.to_string()));
        }

        let path = self.base_directory.join(relative);
        if path.is_dir() {
            return Err(SourceError::NotSelectable(name.to_string()));
        }
        // Symlinks may still point elsewhere once the file exists
        if let Ok(real) = path.canonicalize() {
            let inside = self
                .base_directory
                .canonicalize()
                .is_ok_and(|base| real.starts_with(base));
            if !inside {
                return Err(SourceError::OutsideBase(name.to_string()));
            }
        }
        Ok(path)
    }

    /// Start streaming `name`. Must be called within a Tokio runtime.
    pub fn open(&self, name: &str) -> Result<Chunks, SourceError> {
        let plan = self.plan(name)?;
        debug!(source = name, ?plan, "opening source");
        let chunks = match plan {
            Plan::Empty => {
                let (_, rx) = mpsc::channel::<String>(1);
                ReceiverStream::new(rx)
            }
            Plan::Mock => self.launch(MockTail {
                count: self.settings.mock_count,
                delay: self.settings.mock_delay,
            }),
            Plan::Command { source, style } => {
                let renderer = build_renderer(style, self.rules.clone());
                let tail = ProcessTail::spawn(&source.args, renderer, &self.settings)?;
                self.launch(tail)
            }
            Plan::File { path, style } => self.launch(FileTail {
                path,
                renderer: build_renderer(style, self.rules.clone()),
                opener: self.opener.clone(),
                confine: Some(self.base_directory.clone()),
                settings: self.settings,
            }),
        };
        Ok(chunks)
    }

    fn launch<S>(&self, source: S) -> Chunks
    where
        S: LogSource + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        tokio::spawn(async move {
            if let Err(e) = source.stream(tx).await {
                warn!(error = %e, "source ended with an error");
            }
        });
        ReceiverStream::new(rx)
    }
}
