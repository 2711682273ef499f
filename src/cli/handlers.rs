use crate::cli::SKETCH_EXTENSION;
use crate::error::{CompilerError, Result};
use crate::runtime::Surface;
use crate::{Compiler, CompilerConfig};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Instant;

// --- RUN ---
pub fn handle_run_command(cli: &super::Cli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<String>("input").unwrap();
    let frames: u32 = matches
        .get_one::<String>("frames")
        .unwrap()
        .parse()
        .map_err(|_| CompilerError::InvalidFormat {
            message: "Invalid frame count".to_string(),
        })?;
    let dump_ops = matches.get_flag("dump-ops");
    let config = cli.build_compiler_config(matches);

    if matches.get_flag("watch") {
        watch_and_run(Path::new(input_path), config, frames, dump_ops)
    } else {
        let mut compiler = Compiler::new(config);
        run_once(Path::new(input_path), &mut compiler, frames, dump_ops)
    }
}

fn run_once(entry: &Path, compiler: &mut Compiler, frames: u32, dump_ops: bool) -> Result<()> {
    println!("🔨 Compiling {}", entry.display());
    let compile_start = Instant::now();
    let instance = compiler.execute(entry);
    let compile_time = compile_start.elapsed();

    for result in compiler.results() {
        println!("   {}", result);
    }

    let Some(mut instance) = instance else {
        return Err(CompilerError::script(format!(
            "compilation of {} produced no sketch instance",
            entry.display()
        )));
    };
    println!(
        "✅ Compiled '{}' in {:.2}ms",
        instance.class_name(),
        compile_time.as_secs_f64() * 1000.0
    );

    if let Err(e) = instance.setup() {
        let result = compiler.runtime_error(&e.to_string());
        println!("   {}", result);
        return Err(CompilerError::script(result.message));
    }

    instance.bind_surface(Surface::new())?;
    let mut fps = instance.frame_rate()?;
    let mut elapsed = 0.0;
    for _ in 0..frames {
        instance.set_real_time(elapsed)?;
        if let Err(e) = instance.draw() {
            let result = compiler.runtime_error(&e.to_string());
            println!("   {}", result);
            return Err(CompilerError::script(result.message));
        }
        instance.frame_advanced()?;
        // The sketch may retune its own frame rate mid-run.
        fps = instance.frame_rate()?;
        elapsed += if fps > 0 { 1.0 / fps as f64 } else { 1.0 / 60.0 };
    }

    let surface = instance.take_surface()?.unwrap_or_default();
    println!(
        "✅ Drew {} frames ({} fps target), {} drawing calls recorded",
        frames,
        fps,
        surface.ops.len()
    );
    if dump_ops {
        for op in &surface.ops {
            println!("   {:?}", op);
        }
    }
    Ok(())
}

fn watch_and_run(
    entry: &Path,
    config: CompilerConfig,
    frames: u32,
    dump_ops: bool,
) -> Result<()> {
    println!("👀 Watching {} for changes...", entry.display());

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Err(e) = tx.send(event) {
                    eprintln!("Watch error: {}", e);
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| {
        CompilerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create file watcher: {}", e),
        ))
    })?;

    let mut compiler = Compiler::new(config);
    let mut watched: Vec<PathBuf> = Vec::new();

    loop {
        if let Err(e) = run_once(entry, &mut compiler, frames, dump_ops) {
            eprintln!("❌ {}", e);
        }

        // The include graph may have changed; re-point the watcher at the
        // current source set.
        for path in watched.drain(..) {
            let _ = watcher.unwatch(&path);
        }
        let mut sources = compiler.source_files();
        if sources.is_empty() {
            sources.push(entry.to_path_buf());
        }
        for path in sources {
            if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                eprintln!("Watch error on {}: {}", path.display(), e);
                continue;
            }
            watched.push(path);
        }

        match rx.recv() {
            Ok(_event) => println!("🔄 File changed, recompiling..."),
            Err(e) => {
                eprintln!("Watch error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

// --- CHECK ---
pub fn handle_check_command(cli: &super::Cli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<String>("input").unwrap();
    let recursive = matches.get_flag("recursive");
    let config = CompilerConfig {
        ignore_warnings: false,
        ..cli_base_config(cli)
    };

    if recursive && Path::new(input_path).is_dir() {
        check_directory_recursive(input_path, &config)
    } else {
        check_single_file(Path::new(input_path), &config)
    }
}

// Check has no per-run flags; only the config file applies.
fn cli_base_config(cli: &super::Cli) -> CompilerConfig {
    let mut config = CompilerConfig::default();
    if let Some(libs) = &cli.config.system_libraries {
        config.system_libraries = libs.clone();
    }
    if let Some(libs) = &cli.config.local_libraries {
        config.local_libraries = libs.iter().map(PathBuf::from).collect();
    }
    if let Some(usings) = &cli.config.extra_usings {
        config.extra_usings = usings.clone();
    }
    if let Some(dir) = &cli.config.temp_dir {
        config.temp_dir = Some(PathBuf::from(dir));
    }
    config
}

fn check_single_file(entry: &Path, config: &CompilerConfig) -> Result<()> {
    println!("🔍 Checking {}", entry.display());
    let mut compiler = Compiler::new(config.clone());
    // Full compile cycle: loading runs module top-level code and the
    // constructor. Only the frame loop is skipped.
    let _ = compiler.execute(entry);
    for result in compiler.results() {
        println!("   {}", result);
    }
    if compiler.has_errors() {
        println!("❌ {} - errors found", entry.display());
        Err(CompilerError::script(format!("{} has errors", entry.display())))
    } else {
        println!("✅ {} - No issues found", entry.display());
        Ok(())
    }
}

fn check_directory_recursive(dir_path: &str, config: &CompilerConfig) -> Result<()> {
    let mut total_files = 0;
    let mut error_files = 0;

    for entry in walkdir::WalkDir::new(dir_path) {
        let entry = entry.map_err(|e| {
            CompilerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Directory traversal error: {}", e),
            ))
        })?;
        if entry.file_type().is_file() {
            if let Some(ext) = entry.path().extension() {
                if ext == SKETCH_EXTENSION {
                    total_files += 1;
                    if check_single_file(entry.path(), config).is_err() {
                        error_files += 1;
                    }
                }
            }
        }
    }

    println!("\n📊 Check Summary:");
    println!("   Total files: {}", total_files);
    println!("   Files with errors: {}", error_files);
    if total_files > 0 {
        println!(
            "   Success rate: {:.1}%",
            (total_files - error_files) as f64 / total_files as f64 * 100.0
        );
    }

    if error_files > 0 {
        Err(CompilerError::script(format!("{} files have errors", error_files)))
    } else {
        Ok(())
    }
}
