//! Diagnostic and stack-trace remapper: translates positions inside generated
//! files back to original user files and lines

use crate::scaffold::parse_path_comment;
use crate::unit::{CompilationUnitSet, LINE_MARKER};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Line-number convention of an incoming position. Compiler diagnostics and
/// stack frames disagree on this, so the caller states it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineIndexing {
    ZeroBased,
    OneBased,
}

/// Result of one remap lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapOutcome {
    /// Original user file, or `None` for internal-only positions (wrapper
    /// unit, unknown generated files).
    pub file: Option<PathBuf>,
    /// Original 1-based line, or -1 when unresolvable.
    pub line: i32,
    /// Set when the generated-file bookkeeping itself is inconsistent; the
    /// caller prefixes this onto the reported message instead of returning a
    /// silently wrong answer.
    pub internal: Option<String>,
}

impl RemapOutcome {
    fn unresolved() -> Self {
        Self { file: None, line: -1, internal: None }
    }

    fn inconsistent(file: Option<PathBuf>, detail: impl Into<String>) -> Self {
        Self { file, line: -1, internal: Some(detail.into()) }
    }
}

/// Remaps positions for one compile cycle's unit set and temp directory.
pub struct Remapper<'a> {
    units: &'a CompilationUnitSet,
    temp_dir: &'a Path,
}

impl<'a> Remapper<'a> {
    pub fn new(units: &'a CompilationUnitSet, temp_dir: &'a Path) -> Self {
        Self { units, temp_dir }
    }

    /// Remap a position inside a generated file. `generated` may be a bare
    /// file name or a full temp path; lookup is by basename, case-insensitive.
    pub fn remap(&self, generated: &str, line: usize, indexing: LineIndexing) -> RemapOutcome {
        let unit = match self.units.find_generated(generated) {
            Some(unit) => unit,
            // Expected for positions we cannot attribute at all; also covers
            // a stale set after the host reloaded, handled by the disk
            // fallback in remap_frame.
            None => return RemapOutcome::unresolved(),
        };

        if unit.is_wrapper() {
            return RemapOutcome::unresolved();
        }

        let index = match indexing {
            LineIndexing::ZeroBased => line,
            LineIndexing::OneBased => match line.checked_sub(1) {
                Some(i) => i,
                None => {
                    return RemapOutcome::inconsistent(
                        unit.original_path.clone(),
                        format!("line 0 in {} with 1-based indexing", unit.generated_name),
                    )
                }
            },
        };

        let rendered_line = match unit.rendered.lines().nth(index) {
            Some(text) => text,
            None => {
                return RemapOutcome::inconsistent(
                    unit.original_path.clone(),
                    format!("line {} past the end of {}", index + 1, unit.generated_name),
                )
            }
        };

        match extract_marker(rendered_line) {
            Some(original_line) => RemapOutcome {
                file: unit.original_path.clone(),
                line: original_line as i32,
                internal: None,
            },
            None => RemapOutcome::inconsistent(
                unit.original_path.clone(),
                format!("no line marker at {}:{}", unit.generated_name, index + 1),
            ),
        }
    }

    /// Runtime variant: scan an exception message/traceback for the first
    /// frame located inside the temp compile directory and remap it. Frames
    /// outside the temp dir (host frames, prelude) are skipped. With no such
    /// frame the outcome is fully unresolved and the caller reports the raw
    /// message alone.
    pub fn remap_runtime(&self, traceback: &str) -> RemapOutcome {
        match self.first_temp_frame(traceback) {
            Some((path, line)) => self.remap_frame(&path, line),
            None => RemapOutcome::unresolved(),
        }
    }

    /// Remap a single 1-based stack frame, falling back to the generated
    /// file's own first-line path comment when the in-memory set does not
    /// know the file.
    pub fn remap_frame(&self, generated_path: &str, line: usize) -> RemapOutcome {
        if self.units.find_generated(generated_path).is_some() {
            return self.remap(generated_path, line, LineIndexing::OneBased);
        }
        remap_from_disk(Path::new(generated_path), line)
    }

    fn first_temp_frame(&self, traceback: &str) -> Option<(String, usize)> {
        // Generated files always carry the generated extension, which keeps
        // the frame pattern unambiguous inside prose-y error messages.
        let frame = Regex::new(r"([^\s:]+\.lua):(\d+)").ok()?;
        let temp_lower = self.temp_dir.to_string_lossy().to_lowercase();
        for caps in frame.captures_iter(traceback) {
            let path = caps.get(1)?.as_str();
            if path.to_lowercase().contains(&temp_lower) {
                let line: usize = caps.get(2)?.as_str().parse().ok()?;
                return Some((path.to_string(), line));
            }
        }
        None
    }
}

/// Disk-based fallback: recover the original path from the generated file's
/// first-line comment and the original line from the marker on the frame's
/// line. Used when the in-memory unit set is unavailable for the file.
fn remap_from_disk(generated_path: &Path, line: usize) -> RemapOutcome {
    let content = match fs::read_to_string(generated_path) {
        Ok(content) => content,
        Err(_) => return RemapOutcome::unresolved(),
    };
    let mut lines = content.lines();
    let original = lines.next().and_then(parse_path_comment).map(PathBuf::from);
    let Some(original) = original else {
        return RemapOutcome::unresolved();
    };
    let frame_line = line.checked_sub(1).and_then(|i| content.lines().nth(i));
    match frame_line.and_then(extract_marker) {
        Some(original_line) => {
            RemapOutcome { file: Some(original), line: original_line as i32, internal: None }
        }
        None => RemapOutcome::inconsistent(
            Some(original),
            format!("no line marker at {}:{}", generated_path.display(), line),
        ),
    }
}

/// Parse the trailing `--@ N` marker from a rendered line.
fn extract_marker(line: &str) -> Option<usize> {
    let pos = line.rfind(LINE_MARKER)?;
    line[pos + LINE_MARKER.len()..].trim().parse().ok()
}
