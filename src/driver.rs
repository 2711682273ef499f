//! Compilation driver: one compile cycle from entry file to script instance
//! or diagnostics list

use crate::error::{CompileResult, Result, Severity};
use crate::loader::{load_script, LoadOutcome, ScriptInstance};
use crate::remap::{LineIndexing, Remapper};
use crate::resolver::IncludeResolver;
use crate::runtime::ScriptHost;
use crate::scaffold::{generated_prefix, make_wrapper, render_unit, sanitize_script_name};
use crate::unit::{ChannelSpec, CompilationUnitSet};
use crate::CompilerConfig;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Drives the pipeline: resolve includes, scaffold, write temp files, compile
/// with the in-process backend, load and instantiate the sketch class.
///
/// `execute` never returns an error: every failure mode lands in the results
/// list, pipeline-internal ones as a single Fatal entry. Callers check for
/// Error/Fatal entries and whether an instance came back; the two agree.
///
/// At most one compile may be in flight per `Compiler` value; concurrent
/// compiles would fight over the temp directory. `&mut self` enforces this
/// for one value, serializing across clones of the path is the host's job.
pub struct Compiler {
    config: CompilerConfig,
    results: Vec<CompileResult>,
    units: CompilationUnitSet,
    temp_dir: PathBuf,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
            units: CompilationUnitSet::new(),
            temp_dir: PathBuf::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CompilerConfig::default())
    }

    /// Run one full compile cycle. Results from the previous cycle are
    /// discarded first; no history persists across compiles.
    pub fn execute(&mut self, entry: &Path) -> Option<ScriptInstance> {
        self.results.clear();
        self.units = CompilationUnitSet::new();
        log::info!("compiling {}", entry.display());

        match self.run_pipeline(entry) {
            Ok(instance) => instance,
            Err(e) => {
                self.push(CompileResult::internal(Severity::Fatal, e.to_string()));
                None
            }
        }
    }

    fn run_pipeline(&mut self, entry: &Path) -> Result<Option<ScriptInstance>> {
        let class_name = sanitize_script_name(entry);
        let prefix = generated_prefix(entry);
        self.temp_dir = match &self.config.temp_dir {
            Some(dir) => dir.clone(),
            None => entry.parent().unwrap_or(Path::new(".")).join("temp"),
        };

        log::debug!("phase: resolving includes");
        let (mut units, include_results) =
            IncludeResolver::new(entry, &prefix).resolve(entry)?;
        for result in include_results {
            self.push(result);
        }

        log::debug!("phase: generating scaffolds");
        for unit in units.units_mut() {
            render_unit(unit, &class_name);
        }
        units.push(make_wrapper(&prefix, &class_name, &self.config.init_statements));

        log::debug!("phase: writing temp files to {}", self.temp_dir.display());
        self.write_temp_files(&units)?;
        self.units = units;

        log::debug!("phase: compiling {} units", self.units.len());
        let host = ScriptHost::new(&self.config)?;
        let mut chunks = Vec::with_capacity(self.units.len());
        let mut compile_failed = false;
        let paths: Vec<PathBuf> = self
            .units
            .units()
            .iter()
            .map(|u| self.temp_dir.join(&u.generated_name))
            .collect();
        for path in &paths {
            // Re-read from disk so remapping sees exactly the bytes the
            // compiler saw.
            let source = fs::read_to_string(path)?;
            match host.compile_chunk(&source, path) {
                Ok(chunk) => chunks.push(chunk),
                Err(mlua::Error::SyntaxError { message, .. }) => {
                    compile_failed = true;
                    self.push_syntax_error(&message);
                }
                Err(other) => return Err(other.into()),
            }
        }

        // Monolithic compilation: any failure, including earlier include
        // errors, fails the whole unit and nothing is loaded.
        if compile_failed || self.has_errors() {
            return Ok(None);
        }

        log::debug!("phase: loading module");
        for chunk in &chunks {
            if let Err(e) = chunk.call::<_, mlua::Value>(()) {
                let result = self.runtime_error(&e.to_string());
                self.push(result);
                return Ok(None);
            }
        }
        drop(chunks);

        Ok(self.apply_load_outcome(load_script(host)?))
    }

    /// Translate the loader's verdict into results and an optional instance.
    /// Zero candidates is a Warning, not an error: a file set defining only
    /// helpers still compiles clean, it just yields nothing to run.
    fn apply_load_outcome(&mut self, outcome: LoadOutcome) -> Option<ScriptInstance> {
        match outcome {
            LoadOutcome::Loaded(instance) => {
                log::info!("instantiated sketch class '{}'", instance.class_name());
                Some(instance)
            }
            LoadOutcome::NoneFound => {
                self.push(CompileResult::internal(
                    Severity::Warning,
                    "no sketch class was produced (nothing extends the Sketch base)",
                ));
                None
            }
            LoadOutcome::Multiple(names) => {
                self.push(CompileResult::internal(
                    Severity::Fatal,
                    format!("multiple sketch classes found: {}", names.join(", ")),
                ));
                None
            }
            LoadOutcome::ConstructorFailed(e) => {
                let result = self.runtime_error(&e.to_string());
                self.push(result);
                None
            }
        }
    }

    /// Clear the temp directory and write every unit's rendered text.
    /// Delete-then-write, so stale files from a failed compile never linger
    /// under the same name.
    fn write_temp_files(&self, units: &CompilationUnitSet) -> Result<()> {
        match fs::remove_dir_all(&self.temp_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.temp_dir)?;
        for unit in units.units() {
            let path = self.temp_dir.join(&unit.generated_name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
            fs::write(&path, &unit.rendered)?;
        }
        Ok(())
    }

    /// Translate one backend syntax error into an Error-severity result at
    /// original coordinates.
    fn push_syntax_error(&mut self, message: &str) {
        let frame = Regex::new(r"([^\s:]+\.lua):(\d+):\s*(.*)").unwrap();
        if let Some(caps) = frame.captures(message) {
            let file = caps.get(1).map_or("", |m| m.as_str());
            let line: usize = caps.get(2).map_or("", |m| m.as_str()).parse().unwrap_or(0);
            let detail = caps.get(3).map_or("", |m| m.as_str()).to_string();
            let outcome = Remapper::new(&self.units, &self.temp_dir)
                .remap(file, line, LineIndexing::OneBased);
            let message = match &outcome.internal {
                Some(note) => format!("{}: {}", note, detail),
                None => detail,
            };
            self.push(CompileResult::new(Severity::Error, outcome.file, outcome.line, message));
        } else {
            self.push(CompileResult::internal(Severity::Error, message));
        }
    }

    /// Translate a runtime exception message/traceback from the current
    /// script session into a Fatal result at original coordinates. The host
    /// feeds uncaught `setup`/`draw` errors through this.
    pub fn runtime_error(&self, message: &str) -> CompileResult {
        let outcome = Remapper::new(&self.units, &self.temp_dir).remap_runtime(message);
        let text = match &outcome.internal {
            Some(note) => format!("{}: {}", note, message),
            None => message.to_string(),
        };
        CompileResult::new(Severity::Fatal, outcome.file, outcome.line, text)
    }

    fn push(&mut self, result: CompileResult) {
        if self.config.ignore_warnings && result.severity <= Severity::Warning {
            return;
        }
        match result.severity {
            Severity::Info => log::info!("{}", result),
            Severity::Warning => log::warn!("{}", result),
            _ => log::error!("{}", result),
        }
        self.results.push(result);
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(CompileResult::is_error)
    }

    /// All results of the last compile, in report order.
    pub fn results(&self) -> &[CompileResult] {
        &self.results
    }

    /// Temp directory of the last compile, for external stack remapping.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Distinct original files of the last compile, the host's watch list.
    pub fn source_files(&self) -> Vec<PathBuf> {
        self.units.source_files()
    }

    /// Channel descriptors collected during the last compile.
    pub fn channels(&self) -> &[ChannelSpec] {
        self.units.channels()
    }
}

/// Remap a runtime error with only a temp directory at hand, after the
/// in-memory unit set is gone. Relies on the first-line path comments of the
/// generated files still on disk.
pub fn process_runtime_error(message: &str, temp_dir: &Path) -> CompileResult {
    let empty = CompilationUnitSet::new();
    let outcome = Remapper::new(&empty, temp_dir).remap_runtime(message);
    let text = match &outcome.internal {
        Some(note) => format!("{}: {}", note, message),
        None => message.to_string(),
    };
    CompileResult::new(Severity::Fatal, outcome.file, outcome.line, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DrawOp, Surface};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn end_to_end_compile_and_draw() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shapes.np", "function draw_circle() circle(50, 50, 10) end\n");
        let entry = write(
            &dir,
            "main.np",
            "@include \"shapes.np\"\nfunction draw()\n    draw_circle()\nend\n",
        );

        let mut compiler = Compiler::with_defaults();
        let mut instance = compiler.execute(&entry).expect("instance");
        assert!(!compiler.has_errors());
        assert_eq!(instance.class_name(), "main");

        // Generated artifacts: one file per unit plus the wrapper.
        let temp = compiler.temp_dir().to_path_buf();
        assert!(temp.join("main_src0.lua").is_file());
        assert!(temp.join("main_src1.lua").is_file());
        assert!(temp.join("main_wrapper.lua").is_file());

        // Watch list in discovery order.
        let files = compiler.source_files();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("main.np"));
        assert!(files[1].ends_with("shapes.np"));

        instance.setup().unwrap();
        instance.bind_surface(Surface::new()).unwrap();
        instance.set_real_time(0.1).unwrap();
        instance.draw().unwrap();
        assert_eq!(
            instance.surface_ops().unwrap(),
            vec![DrawOp::Ellipse { x: 50.0, y: 50.0, w: 10.0, h: 10.0 }]
        );
    }

    #[test]
    fn runtime_error_remaps_to_included_file() {
        let dir = TempDir::new().unwrap();
        let shapes = write(&dir, "shapes.np", "function draw_circle() error(\"boom\") end\n");
        let entry = write(
            &dir,
            "main.np",
            "@include \"shapes.np\"\nfunction draw() draw_circle() end\n",
        );

        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(&entry).expect("instance");
        instance.setup().unwrap();
        let err = instance.draw().unwrap_err();

        let result = compiler.runtime_error(&err.to_string());
        assert_eq!(result.severity, Severity::Fatal);
        assert_eq!(result.file.as_deref(), Some(shapes.as_path()));
        assert_eq!(result.line, 1);
        assert!(result.message.contains("boom"));

        // The disk-only variant resolves the same frame via the generated
        // file's first-line path comment.
        let standalone = process_runtime_error(&err.to_string(), compiler.temp_dir());
        assert_eq!(standalone.file.as_deref(), Some(shapes.as_path()));
        assert_eq!(standalone.line, 1);
    }

    #[test]
    fn syntax_error_remaps_to_original_line() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.np", "x = 1\ny = = 2\n");

        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(&entry);
        assert!(instance.is_none());
        assert!(compiler.has_errors());

        let errors: Vec<&CompileResult> =
            compiler.results().iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[0].file.as_deref(), Some(entry.as_path()));
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn missing_include_blocks_instance_but_keeps_compiling() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.np", "@include \"missing.np\"\nkept = 1\n");

        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(&entry);
        assert!(instance.is_none());

        let errors: Vec<&CompileResult> =
            compiler.results().iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);

        // The line after the failed include still made it into the output.
        let generated =
            fs::read_to_string(compiler.temp_dir().join("main_src0.lua")).unwrap();
        assert!(generated.contains("kept = 1 --@ 2"));
    }

    #[test]
    fn recompiling_unchanged_input_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shapes.np", "function helper() end\n");
        let entry = write(
            &dir,
            "main.np",
            "@include \"shapes.np\"\n@include \"missing.np\"\nfunction draw() helper() end\n",
        );

        let mut compiler = Compiler::with_defaults();
        let _ = compiler.execute(&entry);
        let first: Vec<CompileResult> = compiler.results().to_vec();
        let _ = compiler.execute(&entry);
        assert_eq!(compiler.results(), &first[..]);
    }

    #[test]
    fn deep_include_round_trip() {
        // Include at depth 2: diagnostics inside it must still resolve.
        let dir = TempDir::new().unwrap();
        let inner = write(&dir, "inner.np", "function deep() error(\"deep boom\") end\n");
        write(&dir, "mid.np", "@include \"inner.np\"\nfunction mid() deep() end\n");
        let entry = write(
            &dir,
            "main.np",
            "@include \"mid.np\"\nfunction draw() mid() end\n",
        );

        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(&entry).expect("instance");
        instance.setup().unwrap();
        let err = instance.draw().unwrap_err();
        let result = compiler.runtime_error(&err.to_string());
        assert_eq!(result.file.as_deref(), Some(inner.as_path()));
        assert_eq!(result.line, 1);
    }

    #[test]
    fn frame_rate_feeds_back_to_host() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.np", "function setup() frame_rate = 30 end\n");

        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(&entry).expect("instance");
        assert_eq!(instance.frame_rate().unwrap(), 0);
        instance.setup().unwrap();
        assert_eq!(instance.frame_rate().unwrap(), 30);
    }

    #[test]
    fn init_statements_run_in_the_constructor() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.np", "function draw() end\n");

        let mut config = CompilerConfig::default();
        config.init_statements.push("self.frame_rate = 41".to_string());
        let mut compiler = Compiler::new(config);
        let instance = compiler.execute(&entry).expect("instance");
        assert_eq!(instance.frame_rate().unwrap(), 41);
    }

    #[test]
    fn channels_are_exposed_after_compile() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.np", "@channel pads 10\nfunction draw() end\n");

        let mut compiler = Compiler::with_defaults();
        let _ = compiler.execute(&entry).expect("instance");
        assert_eq!(compiler.channels().len(), 1);
        assert_eq!(compiler.channels()[0].name, "pads");
    }

    #[test]
    fn missing_sketch_class_is_warning_not_error() {
        let mut compiler = Compiler::with_defaults();
        let instance = compiler.apply_load_outcome(LoadOutcome::NoneFound);
        assert!(instance.is_none());
        assert_eq!(compiler.results().len(), 1);
        assert_eq!(compiler.results()[0].severity, Severity::Warning);
        assert!(compiler.results()[0].message.contains("no sketch class"));
        // The one sanctioned case of "no instance" without error-severity
        // results.
        assert!(!compiler.has_errors());
    }

    #[test]
    fn multiple_sketch_classes_is_fatal() {
        let mut compiler = Compiler::with_defaults();
        let instance = compiler
            .apply_load_outcome(LoadOutcome::Multiple(vec!["A".to_string(), "B".to_string()]));
        assert!(instance.is_none());
        assert_eq!(compiler.results()[0].severity, Severity::Fatal);
        assert!(compiler.results()[0].message.contains("A, B"));
        assert!(compiler.has_errors());
    }

    #[test]
    fn ignore_warnings_filters_results() {
        let mut config = CompilerConfig::default();
        config.ignore_warnings = true;
        let mut compiler = Compiler::new(config);
        compiler.push(CompileResult::internal(Severity::Warning, "suppressed"));
        compiler.push(CompileResult::internal(Severity::Error, "kept"));
        assert_eq!(compiler.results().len(), 1);
        assert_eq!(compiler.results()[0].message, "kept");
    }

    #[test]
    fn pipeline_failure_becomes_single_fatal_result() {
        let mut compiler = Compiler::with_defaults();
        let instance = compiler.execute(Path::new("/definitely/not/here.np"));
        assert!(instance.is_none());
        assert_eq!(compiler.results().len(), 1);
        assert_eq!(compiler.results()[0].severity, Severity::Fatal);
        assert_eq!(compiler.results()[0].file, None);
    }
}
