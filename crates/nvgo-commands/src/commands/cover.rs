//! GoCover: run the package tests with coverage and highlight the
//! current buffer line by line.

use crate::outcome::{diagnostics_or_error, CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{CoreError, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct CoverCommand;

pub const HIT_GROUP: &str = "GoCoverHit";
pub const MISS_GROUP: &str = "GoCoverMiss";
pub const PARTIAL_GROUP: &str = "GoCoverPartial";

/// Coverage of one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCoverage {
    Hit,
    Miss,
    Partial,
}

impl LineCoverage {
    pub fn group(&self) -> &'static str {
        match self {
            LineCoverage::Hit => HIT_GROUP,
            LineCoverage::Miss => MISS_GROUP,
            LineCoverage::Partial => PARTIAL_GROUP,
        }
    }

    fn merge(self, other: LineCoverage) -> LineCoverage {
        if self == other {
            self
        } else {
            LineCoverage::Partial
        }
    }
}

/// One block of a coverage profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub statements: u32,
    pub count: u64,
}

fn parse_block(line: &str) -> Option<Block> {
    // path/to/file.go:3.14,5.2 1 0
    let (file, rest) = line.rsplit_once(':')?;
    let mut fields = rest.split_whitespace();
    let span = fields.next()?;
    let statements = fields.next()?.parse().ok()?;
    let count = fields.next()?.parse().ok()?;

    let (start, end) = span.split_once(',')?;
    let start_line = start.split('.').next()?.parse().ok()?;
    let end_line = end.split('.').next()?.parse().ok()?;

    Some(Block {
        file: file.to_string(),
        start_line,
        end_line,
        statements,
        count,
    })
}

/// Parse a profile written by `go test -coverprofile`.
pub fn parse_profile(profile: &str) -> CoreResult<Vec<Block>> {
    let mut lines = profile.lines().filter(|l| !l.trim().is_empty());
    match lines.next() {
        Some(header) if header.starts_with("mode:") => {}
        Some(header) => return Err(CoreError::malformed(header, "missing coverage mode header")),
        None => return Ok(Vec::new()),
    }

    lines
        .map(|line| parse_block(line).ok_or_else(|| CoreError::malformed(line, "invalid coverage block")))
        .collect()
}

/// Per-line coverage of blocks belonging to `file`, keyed by 1-based line.
pub fn line_coverage(blocks: &[Block], file: &Path) -> BTreeMap<usize, LineCoverage> {
    let Some(name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return BTreeMap::new();
    };
    let suffix = format!("/{name}");

    let mut lines = BTreeMap::new();
    for block in blocks.iter().filter(|b| b.file == name || b.file.ends_with(&suffix)) {
        let state = if block.count > 0 {
            LineCoverage::Hit
        } else {
            LineCoverage::Miss
        };
        for line in block.start_line..=block.end_line {
            lines
                .entry(line)
                .and_modify(|s: &mut LineCoverage| *s = s.merge(state))
                .or_insert(state);
        }
    }
    lines
}

async fn clear(session: &Session) -> CoreResult<i64> {
    let editor = session.editor();
    let ns = session.coverage_namespace().await?;
    let buffer = editor.current_buffer().await?;
    editor.clear_namespace(buffer, ns).await?;
    Ok(ns)
}

#[async_trait]
impl Command for CoverCommand {
    fn name(&self) -> &'static str {
        "GoCover"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Cover")
    }

    fn opts(&self) -> CommandOpts {
        CommandOpts {
            bang: true,
            ..command_opts(Nargs::Zero)
        }
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let ns = clear(session).await?;
        if args.bang {
            return Ok(Outcome::Success);
        }

        let file = args.eval.require_file()?.to_path_buf();
        let dir = args.eval.dir();
        let state = session.context_for(&args.eval)?;
        let config = session.config();

        let profile = tempfile::Builder::new().prefix("nvgo-cover").suffix(".out").tempfile()?;
        let profile_path = profile.path().to_string_lossy().into_owned();

        let result = session
            .tool("go", &state, &cancel)
            .arg("test")
            .arg(format!("-coverprofile={profile_path}"))
            .arg(format!("-covermode={}", config.cover.mode))
            .args(config.cover.flags.iter().cloned())
            .current_dir(&dir)
            .run()
            .await;
        if let Err(e) = result {
            return diagnostics_or_error(e, &session.parse_options(&dir, &state, &args.eval));
        }

        let blocks = parse_profile(&tokio::fs::read_to_string(profile.path()).await?)?;
        let lines = line_coverage(&blocks, &file);
        debug!(file = %file.display(), blocks = blocks.len(), lines = lines.len(), "Applying coverage");

        let editor = session.editor();
        let buffer = editor.current_buffer().await?;
        let mut batch = editor.batch();
        batch
            .command(format!("highlight default link {HIT_GROUP} DiffAdd"))
            .command(format!("highlight default link {MISS_GROUP} DiffDelete"))
            .command(format!("highlight default link {PARTIAL_GROUP} DiffChange"));
        for (line, coverage) in &lines {
            batch.call(
                "nvim_buf_add_highlight",
                vec![
                    json!(buffer),
                    json!(ns),
                    json!(coverage.group()),
                    json!(*line as i64 - 1),
                    json!(0),
                    json!(-1),
                ],
            );
        }
        batch.flush().await?;

        Ok(Outcome::Success)
    }
}
