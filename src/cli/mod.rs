mod config;
mod handlers;

use crate::error::Result;
use crate::CompilerConfig;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::time::Instant;

/// Extension of sketch source files, used by recursive check.
pub const SKETCH_EXTENSION: &str = "np";

pub struct Cli {
    config: config::ConfigFile,
    start_time: Instant,
}

impl Cli {
    pub fn new() -> Self {
        Self { config: config::ConfigFile::default(), start_time: Instant::now() }
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        let matches = self.build_cli().get_matches();

        if let Some(config_path) = matches.get_one::<String>("config") {
            self.config = config::load(config_path)?;
        }

        self.setup_logging(matches.get_count("verbose"));

        match matches.subcommand() {
            Some(("run", sub_matches)) => handlers::handle_run_command(self, sub_matches),
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        }
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (.toml or .json)")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count),
            )
            .subcommand(
                Command::new("run")
                    .about("Compile a sketch and drive it headless")
                    .arg(Arg::new("input").help("Sketch entry file").required(true).index(1))
                    .arg(Arg::new("frames").short('n').long("frames").value_name("N").help("Number of frames to draw").default_value("10"))
                    .arg(Arg::new("lib").short('l').long("lib").value_name("FILE").help("Load a companion Lua library before the sketch").action(ArgAction::Append))
                    .arg(Arg::new("using").short('u').long("using").value_name("MODULE").help("Require a module and bind it as a global").action(ArgAction::Append))
                    .arg(Arg::new("temp-dir").long("temp-dir").value_name("DIR").help("Directory for generated files"))
                    .arg(Arg::new("ignore-warnings").long("ignore-warnings").help("Suppress Info and Warning results").action(ArgAction::SetTrue))
                    .arg(Arg::new("dump-ops").long("dump-ops").help("Print every recorded drawing call").action(ArgAction::SetTrue))
                    .arg(Arg::new("watch").short('w').long("watch").help("Watch the sketch's source files and rerun on change").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("check")
                    .about("Compile and load sketches, reporting diagnostics without drawing frames")
                    .long_about(
                        "Runs the full compile cycle, including module top-level code and the \
                         sketch constructor, but never calls setup() or draw(). Side effects in \
                         top-level statements do execute.",
                    )
                    .arg(Arg::new("input").help("Sketch entry file or directory").required(true).index(1))
                    .arg(Arg::new("recursive").short('r').long("recursive").help("Check every sketch in the directory recursively").action(ArgAction::SetTrue)),
            )
    }

    fn setup_logging(&self, verbose_count: u8) {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
    }

    /// Merge the config file and command-line flags into compiler settings.
    /// Flags win; config fields fill the gaps.
    pub fn build_compiler_config(&self, matches: &clap::ArgMatches) -> CompilerConfig {
        let mut config = CompilerConfig::default();
        if let Some(libs) = &self.config.system_libraries {
            config.system_libraries = libs.clone();
        }
        if let Some(libs) = &self.config.local_libraries {
            config.local_libraries = libs.iter().map(PathBuf::from).collect();
        }
        if let Some(usings) = &self.config.extra_usings {
            config.extra_usings = usings.clone();
        }
        if let Some(statements) = &self.config.init_statements {
            config.init_statements = statements.clone();
        }
        if let Some(dir) = &self.config.temp_dir {
            config.temp_dir = Some(PathBuf::from(dir));
        }
        config.ignore_warnings = self.config.ignore_warnings.unwrap_or(false);

        if let Some(libs) = matches.get_many::<String>("lib") {
            config.local_libraries.extend(libs.map(PathBuf::from));
        }
        if let Some(usings) = matches.get_many::<String>("using") {
            config.extra_usings.extend(usings.cloned());
        }
        if let Some(dir) = matches.get_one::<String>("temp-dir") {
            config.temp_dir = Some(PathBuf::from(dir));
        }
        if matches.get_flag("ignore-warnings") {
            config.ignore_warnings = true;
        }
        config
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}
