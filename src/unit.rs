//! Data model for one compile cycle: annotated lines, source units and the
//! ordered unit set

use std::path::{Path, PathBuf};

/// Comment-start token of the sketch dialect.
pub const COMMENT_TOKEN: &str = "--";

/// Trailing marker appended to every rendered code line, carrying the 1-based
/// original line number. Reuses the comment token so the marker can never
/// collide with line content after comment stripping.
pub const LINE_MARKER: &str = "--@";

/// Extension of generated source files.
pub const GENERATED_EXT: &str = "lua";

/// Indentation prefix applied to every retained code line so it nests inside
/// the generated body block.
pub const BODY_INDENT: &str = "    ";

/// One retained code line together with its position in the user file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedLine {
    /// Rewritten text: comments stripped, trimmed, no indent and no marker.
    pub text: String,
    /// 1-based line number in the original file.
    pub original_line: usize,
}

/// A `@channel` directive stripped from code output and collected for a
/// downstream consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub args: Vec<String>,
    pub file: PathBuf,
    pub line: usize,
}

/// One physical input file being processed, or the synthetic wrapper unit.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Path of the user file this unit was derived from. `None` marks the
    /// internally generated wrapper unit, never attributable to user source.
    pub original_path: Option<PathBuf>,
    /// File name (without directory) the unit is written under, unique within
    /// one compile: `<stem>_src<N>.lua` or `<stem>_wrapper.lua`.
    pub generated_name: String,
    /// Retained code lines in file order.
    pub lines: Vec<AnnotatedLine>,
    /// Complete rendered source text, filled in by the scaffold generator.
    pub rendered: String,
}

impl SourceUnit {
    pub fn new(original_path: Option<PathBuf>, generated_name: String) -> Self {
        Self { original_path, generated_name, lines: Vec::new(), rendered: String::new() }
    }

    pub fn is_wrapper(&self) -> bool {
        self.original_path.is_none()
    }
}

/// Ordered set of units for one compile cycle. Insertion order is discovery
/// order: depth-first pre-order over includes, entry file's own body last
/// among its includes, wrapper unit appended at the very end.
#[derive(Debug, Default)]
pub struct CompilationUnitSet {
    units: Vec<SourceUnit>,
    channels: Vec<ChannelSpec>,
}

impl CompilationUnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: SourceUnit) {
        self.units.push(unit);
    }

    pub fn push_channel(&mut self, spec: ChannelSpec) {
        self.channels.push(spec);
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [SourceUnit] {
        &mut self.units
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Look up a unit by generated file name. Only the basename of `name` is
    /// considered and the comparison is case-insensitive, so full temp paths
    /// from compiler diagnostics and stack frames match directly.
    pub fn find_generated(&self, name: &str) -> Option<&SourceUnit> {
        let base = Path::new(name)
            .file_name()
            .map(|f| f.to_string_lossy().to_lowercase())?;
        self.units
            .iter()
            .find(|u| u.generated_name.to_lowercase() == base)
    }

    /// Distinct original file paths in discovery order, wrapper excluded.
    /// This is the watch list the host registers for auto-recompile.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut seen = Vec::new();
        for unit in &self.units {
            if let Some(path) = &unit.original_path {
                if !seen.contains(path) {
                    seen.push(path.clone());
                }
            }
        }
        seen
    }
}
