use clap::Parser;
use std::path::PathBuf;

/// Immutable configuration used by the application runtime
#[derive(Debug, Clone)]
pub struct Config {
    pub base_directory: PathBuf,
    pub pattern: String,
    pub source: Option<String>,
    pub highlights: Vec<String>,
    pub no_highlight: bool,
    pub plain: bool,
    pub sse: bool,
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(name = "livelog", version, about = "Live tail of log files and commands as HTML")]
struct Args {
    /// Source to stream; lists the available sources when omitted
    #[arg(value_name = "SOURCE")]
    source: Option<String>,

    /// Directory the file sources are taken from
    #[arg(short = 'd', long = "dir", default_value = ".")]
    base_directory: PathBuf,

    /// Glob pattern, relative to --dir, selecting candidate files
    #[arg(short = 'p', long = "pattern", default_value = "**/*")]
    pattern: String,

    /// Keyword highlight as WORD=COLOR (repeatable). Defaults to ERROR, WARNING and INFO.
    #[arg(long = "highlight", value_name = "WORD=COLOR")]
    highlights: Vec<String>,

    /// Disable keyword highlighting
    #[arg(long = "no-highlight")]
    no_highlight: bool,

    /// Render .ansi files and coloured commands without ANSI conversion
    #[arg(long = "plain")]
    plain: bool,

    /// Frame every chunk as a server-sent event
    #[arg(long = "sse")]
    sse: bool,
}

/// Parse CLI options into an application Config
pub fn parse() -> Config {
    let args = Args::parse();
    Config {
        base_directory: args.base_directory,
        pattern: args.pattern,
        source: args.source,
        highlights: args.highlights,
        no_highlight: args.no_highlight,
        plain: args.plain,
        sse: args.sse,
    }
}
