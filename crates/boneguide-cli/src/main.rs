//! `boneguide` – operator shell for the BoneGuide pose-tracking engine.
//!
//! 1. Checks for `~/.boneguide/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Optionally replays a recorded request snapshot as the camera feed
//!    (`boneguide <snapshot-dir>` or `replay_dir` in the config).
//! 3. Drops the user into an **interactive REPL** with slash-commands.
//! 4. Intercepts **Ctrl-C**: the pending command is abandoned, the server
//!    session is ended and the process exits with status 130.

mod config;
mod replay;
mod repl;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::repl::Console;
use crate::replay::SnapshotScene;

/// Exit status after Ctrl-C, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // User-facing output still uses println!; tracing goes to stderr.
    let _telemetry = boneguide_runtime::init_tracing("boneguide");

    print_banner();
    let console = Console::spawn();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(&console),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    if console.interrupted() {
        println!();
        return ExitCode::from(EXIT_INTERRUPTED);
    }
    let home = config::home_dir();

    // ── Camera feed ───────────────────────────────────────────────────────
    let replay_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| cfg.replay_dir.clone());
    let scene = match replay_dir {
        Some(dir) => match SnapshotScene::open(&dir) {
            Ok(scene) => {
                println!("  Replaying snapshot {}", dir.display().to_string().bold());
                scene
            }
            Err(e) => {
                println!("{}: {}", "Cannot replay snapshot".red(), e);
                SnapshotScene::empty()
            }
        },
        None => SnapshotScene::empty(),
    };
    let scene = Arc::new(scene);

    // ── Engine ────────────────────────────────────────────────────────────
    // Built after tracing so the OTLP exporter never needs a runtime.
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let engine = {
        let _guard = rt.enter();
        match repl::build_engine(&cfg, &home, Arc::clone(&scene)) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("{}: {}", "Failed to start engine".red(), e);
                return ExitCode::FAILURE;
            }
        }
    };

    if !cfg.engine_config(&home).is_server_url_set() {
        println!(
            "  {} Pose server not configured. Use {} to set it.",
            "!".yellow().bold(),
            "/settings".bold()
        );
    } else {
        println!("  Pose server: {}", cfg.server_url.bold());
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let mut shell = repl::Shell::new(&rt, engine, scene, cfg, home, console);
    shell.run();
    let interrupted = shell.interrupted();
    if interrupted {
        println!();
        println!("{}", "⚠  Ctrl-C received – ending session …".yellow().bold());
    }
    shell.shutdown();
    println!("{}", "  ✓ Exiting BoneGuide.".green());

    if interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard(console: &Console) -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      BoneGuide First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up BoneGuide.\n");

    let mut cfg = config::Config::default();

    cfg.server_url = console.prompt_str(
        &format!("  Pose server URL [{}]: ", cfg.server_url),
        &cfg.server_url,
    );

    println!("  Tracking mode:");
    println!("    1) Continuous – keep following the bone  (default)");
    println!("    2) On demand  – refresh with /track");
    let choice = console.prompt_str("  Enter choice [1]: ", "1");
    cfg.continuous_tracking = choice.trim() != "2";

    let save = console.prompt_str("  Save every tracking request to disk? [y/N]: ", "n");
    cfg.save_requests = matches!(save.to_ascii_lowercase().as_str(), "y" | "yes");
    if console.interrupted() {
        return cfg;
    }

    config::apply_env_overrides(&mut cfg);
    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                  _____      _     __   "#.bold().cyan());
    println!("{}", r#"  / _ )___  ___  ___   / ___/_ __ (_)___/ /__ "#.bold().cyan());
    println!("{}", r#" / _  / _ \/ _ \/ -_) / (_ / // / / _  / -_)"#.bold().cyan());
    println!("{}", r#"/____/\___/_//_/\__/  \___/\_,_/_/\_,_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "BoneGuide".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  AR bone overlay pose tracking");
    println!();
}
