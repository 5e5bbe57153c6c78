// Luma CLI - headless host shell for luma scripts
// Runs a script against the runtime with a simulated window and frame clock.

mod exit_codes;
mod input;
mod shell;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use luma_config::Settings;
use luma_runtime::modules::{BOOTSTRAP_MODULE, MAIN_MODULE};
use luma_runtime::{ModuleTable, Overlays, ProcessInfo, Runtime, RuntimeError, RuntimeOptions};

use exit_codes::{runtime_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use shell::Shell;

fn long_version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), "\nengine: Lua 5.4 (vendored)")
}

#[derive(Parser)]
#[command(name = "luma")]
#[command(about = "Headless host shell for luma scripts")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Settings file (default: ~/.config/luma/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script as the `main` module
    #[command(after_help = "\
Examples:
  luma run game.lua
  luma run game.lua --frames 120 --console
  luma run game.lua --input clicks.json --size 1280x720 -- level1")]
    Run {
        /// Script file, loaded as the `main` native module
        script: PathBuf,

        /// Stop after this many frames (default: run until the script quits)
        #[arg(long)]
        frames: Option<u64>,

        /// Target frame rate
        #[arg(long)]
        fps: Option<f64>,

        /// Initial window size, WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        size: Option<(u32, u32)>,

        /// JSON file of timed input events to replay
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Replace the builtin bootstrap with this file
        #[arg(long, value_name = "PATH")]
        entry: Option<PathBuf>,

        /// Log filter (overrides RUST_LOG and the settings file)
        #[arg(long, env = "LUMA_LOG")]
        log_level: Option<String>,

        /// Keep os/io/debug/load and friends available to scripts
        #[arg(long)]
        no_sandbox: bool,

        /// Echo script console output to stdout
        #[arg(long)]
        console: bool,

        /// Log frame statistics once per second
        #[arg(long)]
        stats: bool,

        /// Extra arguments exposed to the script in process.argv
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List the native modules compiled into this build
    Modules,

    /// Show the effective settings
    Settings {
        /// Write a commented default settings file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Settings::config_path);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: luma <command> [options]");
            eprintln!("       luma --help for more information");
            Ok(())
        }
        Some(Commands::Run {
            script,
            frames,
            fps,
            size,
            input,
            entry,
            log_level,
            no_sandbox,
            console,
            stats,
            args,
        }) => {
            let settings = load_settings(&config_path, log_level.as_deref());
            cmd_run(
                settings,
                RunArgs { script, frames, fps, size, input, entry, no_sandbox, console, stats, args },
            )
        }
        Some(Commands::Modules) => {
            load_settings(&config_path, None);
            cmd_modules()
        }
        Some(Commands::Settings { init }) => {
            let settings = load_settings(&config_path, None);
            cmd_settings(&config_path, settings, init)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Create error from runtime error with proper exit code.
    pub fn runtime(err: RuntimeError) -> Self {
        let code = runtime_exit_code(&err);
        let hint = match &err {
            RuntimeError::Bootstrap(_) => {
                Some("the entry chunk must evaluate to function(process) ... end".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("window size must be non-zero".to_string());
    }
    Ok((w, h))
}

/// Load settings and initialize logging. Precedence for the log filter is
/// `--log-level`, then `RUST_LOG`, then the settings file.
fn load_settings(path: &Path, log_level: Option<&str>) -> Settings {
    let (settings, problem) = if path.exists() {
        match Settings::load_from(path) {
            Ok(s) => (s, None),
            Err(e) => (Settings::default(), Some(e)),
        }
    } else {
        (Settings::default(), None)
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    );
    if let Some(level) = log_level {
        builder.parse_filters(level);
    }
    if let Err(e) = builder.try_init() {
        eprintln!("warning: logger already set, keeping it: {}", e);
    }

    if let Some(e) = problem {
        log::warn!("{}: {}; using default settings", path.display(), e);
    }
    settings
}

struct RunArgs {
    script: PathBuf,
    frames: Option<u64>,
    fps: Option<f64>,
    size: Option<(u32, u32)>,
    input: Option<PathBuf>,
    entry: Option<PathBuf>,
    no_sandbox: bool,
    console: bool,
    stats: bool,
    args: Vec<String>,
}

fn read_source(path: &Path, what: &str) -> Result<String, CliError> {
    fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read {} {}: {}", what, path.display(), e)))
}

fn cmd_run(mut settings: Settings, args: RunArgs) -> Result<(), CliError> {
    let source = read_source(&args.script, "script")?;
    let entry = args.entry.as_deref().map(|p| read_source(p, "entry")).transpose()?;
    let inputs = match &args.input {
        Some(path) => input::load_inputs(path).map_err(|e| {
            CliError::usage(e).with_hint("expected a JSON array of {\"at\": ms, \"event\": \"...\", ...}")
        })?,
        None => Vec::new(),
    };
    if let Some(fps) = args.fps {
        settings.target_fps = fps;
    }
    let max_frames = args.frames.or(settings.max_frames);
    let (width, height) = args.size.unwrap_or((settings.window_width, settings.window_height));

    let shell = Shell::new(width, height);
    let process = ProcessInfo::from_env();
    let mut argv = vec![process.exec_path.clone(), args.script.display().to_string()];
    argv.extend(args.args);

    let options = RuntimeOptions {
        process: process.with_argv(argv),
        modules: ModuleTable::builtin().with_module(MAIN_MODULE, source),
        exec_queue_capacity: settings.exec_queue_capacity,
        event_queue_capacity: settings.event_queue_capacity,
        callback_timeout: settings.callback_timeout(),
        sandbox: settings.sandbox && !args.no_sandbox,
        console_lines: settings.console_lines,
        host: shell.clone(),
        globals: Vec::new(),
        capabilities: vec![shell.app_capabilities()],
        overlays: Overlays::new(
            settings.overlay_console || args.console,
            settings.overlay_stats || args.stats,
            settings.overlay_frame_rate,
        ),
    };

    let mut rt = Runtime::new(options).map_err(CliError::runtime)?;
    if let Err(e) = rt.initialize(entry.as_deref()) {
        flush_console(&rt);
        return Err(CliError::runtime(e));
    }

    let sender = rt.event_sender();
    sender.resize(width, height).map_err(CliError::runtime)?;

    let stop = Arc::new(AtomicBool::new(false));
    let replay = if inputs.is_empty() {
        None
    } else {
        let handle = input::spawn_replay(inputs, sender, shell.clone(), stop.clone())
            .map_err(|e| CliError::error(format!("cannot start input thread: {}", e)))?;
        Some(handle)
    };

    let result = frame_loop(&mut rt, &shell, settings.frame_interval(), max_frames);

    flush_console(&rt);
    stop.store(true, Ordering::SeqCst);
    rt.shutdown();
    if let Some(handle) = replay {
        match handle.join() {
            Ok(sent) => log::debug!("replayed {} input events", sent),
            Err(_) => log::error!("input thread panicked"),
        }
    }

    let (frames, errors) = result?;
    log::info!("{} frames, {} script errors", frames, errors);
    Ok(())
}

/// Tick until the frame budget is used or the host is asked to quit.
fn frame_loop(
    rt: &mut Runtime,
    shell: &Shell,
    interval: Duration,
    max_frames: Option<u64>,
) -> Result<(u64, usize), CliError> {
    let mut frames = 0u64;
    let mut errors = 0usize;

    loop {
        if shell.quit_requested() || max_frames.is_some_and(|max| frames >= max) {
            break;
        }
        let started = Instant::now();
        let (x, y) = shell.window().cursor;
        rt.set_cursor(x, y);

        let report = rt.tick().map_err(CliError::runtime)?;
        errors += report.errors;
        frames += 1;
        flush_console(rt);

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    Ok((frames, errors))
}

/// Echo script output when the console overlay is on.
fn flush_console(rt: &Runtime) {
    let output = rt.take_console();
    if rt.overlays().console() {
        for line in output.lines {
            println!("{}", line);
        }
    }
}

fn cmd_modules() -> Result<(), CliError> {
    for name in ModuleTable::builtin().names() {
        if name == BOOTSTRAP_MODULE {
            println!("{}  (reserved)", name);
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}

fn cmd_settings(path: &Path, settings: Settings, init: bool) -> Result<(), CliError> {
    if init {
        let written = Settings::write_default_file(path)
            .map_err(|e| CliError::error(format!("{}: {}", path.display(), e)))?;
        if written {
            println!("wrote {}", path.display());
        } else {
            println!("{} already exists", path.display());
        }
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&settings)
        .map_err(|e| CliError::error(format!("cannot render settings: {}", e)))?;
    if path.exists() {
        println!("// {}", path.display());
    } else {
        println!("// {} (not found, defaults)", path.display());
    }
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("64X48"), Ok((64, 48)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_second_logger_init_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let first = load_settings(&path, Some("warn"));
        let second = load_settings(&path, Some("debug"));
        assert_eq!(first.log_level, second.log_level);
        assert!(!path.exists());
    }

    #[test]
    fn test_bootstrap_error_has_hint() {
        let err = CliError::runtime(RuntimeError::Bootstrap("no bootstrap source".into()));
        assert_eq!(err.code, exit_codes::EXIT_BOOTSTRAP);
        assert!(err.hint.is_some());

        let err = CliError::runtime(RuntimeError::Script("boom".into())).with_hint("check main");
        assert_eq!(err.code, EXIT_ERROR);
        assert_eq!(err.hint.as_deref(), Some("check main"));
    }
}
