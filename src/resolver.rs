//! Include resolver: recursive descent over `@include` directives, building
//! the ordered compilation unit set

use crate::error::{CompileResult, CompilerError, Result, Severity};
use crate::rewrite::{LineClass, LineRewriter};
use crate::unit::{AnnotatedLine, ChannelSpec, CompilationUnitSet, SourceUnit, GENERATED_EXT};
use std::fs;
use std::path::{Path, PathBuf};

/// Builds the complete, ordered [`CompilationUnitSet`] for one entry file.
///
/// Unit order is discovery order: the entry unit is created first, each
/// include's unit is inserted at the point its directive is encountered and
/// processed to completion before the including file continues (depth-first
/// pre-order). Include failures are reported as Error-severity results
/// attributed to the including file and line; the rest of that file still
/// compiles.
pub struct IncludeResolver {
    rewriter: LineRewriter,
    /// Directory of the entry file, the fallback base for relative includes.
    base_dir: PathBuf,
    /// Sanitized entry-file stem used as the generated name prefix.
    stem: String,
    next_index: usize,
    /// Original paths currently on the recursion stack, for cycle detection.
    in_flight: Vec<PathBuf>,
    results: Vec<CompileResult>,
}

impl IncludeResolver {
    pub fn new(entry: &Path, stem: impl Into<String>) -> Self {
        let base_dir = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            rewriter: LineRewriter::new(),
            base_dir,
            stem: stem.into(),
            next_index: 0,
            in_flight: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn with_rewriter(mut self, rewriter: LineRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Resolve the entry file and every reachable include.
    ///
    /// Returns the unit set (wrapper unit not yet appended) plus the include
    /// diagnostics accumulated along the way. Only a missing or unreadable
    /// *entry* file is a hard error.
    pub fn resolve(mut self, entry: &Path) -> Result<(CompilationUnitSet, Vec<CompileResult>)> {
        let mut set = CompilationUnitSet::new();
        self.process_file(entry, &mut set)?;
        Ok((set, self.results))
    }

    fn next_generated_name(&mut self) -> String {
        let name = format!("{}_src{}.{}", self.stem, self.next_index, GENERATED_EXT);
        self.next_index += 1;
        name
    }

    fn process_file(&mut self, path: &Path, set: &mut CompilationUnitSet) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| CompilerError::FileNotFound {
            path: format!("{}: {}", path.display(), e),
        })?;

        let generated_name = self.next_generated_name();
        log::debug!("rewriting {} -> {}", path.display(), generated_name);

        let unit_index = set.len();
        set.push(SourceUnit::new(Some(path.to_path_buf()), generated_name));

        self.in_flight.push(path.to_path_buf());
        for (i, raw) in content.lines().enumerate() {
            let line_num = i + 1;
            match self.rewriter.classify(raw) {
                LineClass::Blank => {}
                LineClass::Code(text) => {
                    set.units_mut()[unit_index]
                        .lines
                        .push(AnnotatedLine { text, original_line: line_num });
                }
                LineClass::Include { path: include } => {
                    self.process_include(&include, path, line_num, set)?;
                }
                LineClass::MalformedDirective { reason } => {
                    self.report(path, line_num, reason);
                }
                LineClass::Channel { name, args } => {
                    log::debug!("channel '{}' declared at {}:{}", name, path.display(), line_num);
                    set.push_channel(ChannelSpec {
                        name,
                        args,
                        file: path.to_path_buf(),
                        line: line_num,
                    });
                }
            }
        }
        self.in_flight.pop();
        Ok(())
    }

    fn process_include(
        &mut self,
        include: &str,
        from: &Path,
        line: usize,
        set: &mut CompilationUnitSet,
    ) -> Result<()> {
        // As given first (absolute or cwd-relative), then relative to the
        // entry file's directory.
        let as_given = PathBuf::from(include);
        let resolved = if as_given.is_file() {
            as_given
        } else {
            let relative = self.base_dir.join(include);
            if relative.is_file() {
                relative
            } else {
                self.report(from, line, format!("include file not found: \"{}\"", include));
                return Ok(());
            }
        };

        if self.in_flight.iter().any(|p| same_file(p, &resolved)) {
            let mut cycle: Vec<String> =
                self.in_flight.iter().map(|p| p.display().to_string()).collect();
            cycle.push(resolved.display().to_string());
            self.report(
                from,
                line,
                format!("circular include: {}", cycle.join(" -> ")),
            );
            return Ok(());
        }

        // An unreadable include is recoverable; a missing file race between
        // the is_file probe and the read lands here too.
        if let Err(e) = self.process_file(&resolved, set) {
            self.report(from, line, e.to_string());
        }
        Ok(())
    }

    fn report(&mut self, file: &Path, line: usize, message: impl Into<String>) {
        self.results.push(CompileResult::new(
            Severity::Error,
            Some(file.to_path_buf()),
            line as i32,
            message,
        ));
    }
}

/// Paths may reach the same file spelled differently (relative vs absolute);
/// compare canonicalized when possible.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
