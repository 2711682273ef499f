//! nsketch compilation pipeline
//!
//! Turns a Processing-style sketch entry file into a live script instance:
//! includes are resolved into a flat unit set, every surviving line keeps its
//! original line number, units are scaffolded into class-shaped Lua sources,
//! written to a temp directory and compiled in-process. Diagnostics and
//! runtime stack frames are remapped back to the user's files before anyone
//! sees them.
//!
//! ```no_run
//! use nsketch::{Compiler, CompilerConfig};
//! use std::path::Path;
//!
//! let mut compiler = Compiler::new(CompilerConfig::default());
//! match compiler.execute(Path::new("sketches/orbit.np")) {
//!     Some(instance) => {
//!         instance.setup().unwrap();
//!     }
//!     None => {
//!         for result in compiler.results() {
//!             eprintln!("{}", result);
//!         }
//!     }
//! }
//! ```

pub mod cli;
pub mod driver;
pub mod error;
pub mod loader;
pub mod remap;
pub mod resolver;
pub mod rewrite;
pub mod runtime;
pub mod scaffold;
pub mod unit;

pub use driver::{process_runtime_error, Compiler};
pub use error::{CompileResult, CompilerError, Result, Severity};
pub use loader::{LoadOutcome, ScriptInstance};
pub use remap::{LineIndexing, RemapOutcome, Remapper};
pub use runtime::{DrawOp, ScriptHost, Surface};
pub use unit::{ChannelSpec, CompilationUnitSet, SourceUnit};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Session-level compiler settings. Loaded from a config file by the CLI or
/// built programmatically by a host; one value drives any number of compiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Lua standard libraries opened in the script state.
    pub system_libraries: Vec<String>,
    /// Companion Lua files executed into the state before any sketch code.
    pub local_libraries: Vec<PathBuf>,
    /// Module names `require`d and bound as globals. Needs "package" in
    /// `system_libraries`.
    pub extra_usings: Vec<String>,
    /// Drop Info/Warning results instead of reporting them.
    pub ignore_warnings: bool,
    /// Override for the generated-file directory. Defaults to `temp/` next to
    /// the entry file.
    pub temp_dir: Option<PathBuf>,
    /// Statements injected into the generated constructor, after the instance
    /// binding. `self` is in scope.
    pub init_statements: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            system_libraries: vec![
                "math".to_string(),
                "string".to_string(),
                "table".to_string(),
            ],
            local_libraries: Vec::new(),
            extra_usings: Vec::new(),
            ignore_warnings: false,
            temp_dir: None,
            init_statements: Vec::new(),
        }
    }
}

/// One-shot convenience wrapper around [`Compiler::execute`].
pub fn compile_file(
    entry: impl AsRef<Path>,
    config: CompilerConfig,
) -> (Option<ScriptInstance>, Vec<CompileResult>) {
    let mut compiler = Compiler::new(config);
    let instance = compiler.execute(entry.as_ref());
    (instance, compiler.results().to_vec())
}
