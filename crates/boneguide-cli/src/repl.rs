//! REPL – Read-Eval-Print Loop for the BoneGuide operator shell.
//!
//! Supported slash-commands:
//!   /start        – create a server session and load the bone model
//!   /confirm      – confirm alignment and lock the initial pose
//!   /track        – request one pose refresh
//!   /stop         – end the session
//!   /status       – show the current session state
//!   /offsets      – view or change the manual pose offsets
//!   /snapshot     – save the current frame as a request snapshot
//!   /dismiss      – clear the current error
//!   /settings     – edit `~/.boneguide/config.toml`
//!   /help         – show this list
//!   /quit | /exit – end the session and exit

use colored::Colorize;
use std::fmt::Display;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::mpsc;

use boneguide_runtime::{Engine, EngineError, TrackingSession};
use boneguide_types::Offsets;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{self, Config};
use crate::replay::SnapshotScene;

/// Builds an engine for `cfg`.  Must run inside the Tokio runtime context.
pub fn build_engine(
    cfg: &Config,
    home: &Path,
    scene: Arc<SnapshotScene>,
) -> Result<Engine, EngineError> {
    Engine::connect(cfg.engine_config(home), scene)
}

// ─────────────────────────────────────────────────────────────────────────────
// Console
// ─────────────────────────────────────────────────────────────────────────────

/// One terminal event.
#[derive(Debug, PartialEq)]
pub enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Stdin lines and Ctrl-C merged onto one channel, so an interrupt wakes a
/// prompt that is waiting for input.
pub struct Console {
    rx: mpsc::Receiver<Input>,
    interrupt: CancellationToken,
}

impl Console {
    /// Installs the Ctrl-C handler and starts the stdin reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        let interrupt = CancellationToken::new();

        let ctrlc_tx = tx.clone();
        let token = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            token.cancel();
            let _ = ctrlc_tx.send(Input::Interrupted);
        }) {
            warn!(
                error = %e,
                "Failed to install Ctrl-C handler; sessions will not be closed on Ctrl-C"
            );
        }

        std::thread::spawn(move || {
            let stdin = io::stdin();
            loop {
                let mut line = String::new();
                let input = match stdin.lock().read_line(&mut line) {
                    Ok(0) => Input::Eof,
                    Ok(_) => Input::Line(line),
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        Input::Eof
                    }
                };
                let done = input == Input::Eof;
                if tx.send(input).is_err() || done {
                    break;
                }
            }
        });

        Self::from_parts(rx, interrupt)
    }

    fn from_parts(rx: mpsc::Receiver<Input>, interrupt: CancellationToken) -> Self {
        Self { rx, interrupt }
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Next event.  `Eof` once every sender is gone.
    pub fn next(&self) -> Input {
        self.rx.recv().unwrap_or(Input::Eof)
    }

    /// Prompt for a string value.  Returns `default` on Enter, EOF or Ctrl-C.
    pub fn prompt_str(&self, msg: &str, default: &str) -> String {
        print!("{msg}");
        io::stdout().flush().ok();
        match self.next() {
            Input::Line(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    default.to_string()
                } else {
                    trimmed.to_string()
                }
            }
            Input::Eof | Input::Interrupted => default.to_string(),
        }
    }

    fn prompt_number<T>(&self, msg: &str, default: T) -> T
    where
        T: FromStr + Display + Copy,
    {
        let raw = self.prompt_str(msg, &default.to_string());
        parse_number(&raw, default).unwrap_or_else(|| {
            println!(
                "  {} '{}' is not a valid number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        })
    }

    fn prompt_bool(&self, label: &str, default: bool) -> bool {
        let (shown, fallback) = if default { ("Y/n", "y") } else { ("y/N", "n") };
        let raw = self.prompt_str(&format!("{label} [{shown}]: "), fallback);
        matches!(raw.to_ascii_lowercase().as_str(), "y" | "yes" | "true" | "1")
    }
}

/// Drives `fut` on `rt` until it finishes or `interrupt` fires.
pub(crate) fn until_interrupted<F: Future>(
    rt: &Runtime,
    interrupt: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    rt.block_on(async {
        tokio::select! {
            biased;
            _ = interrupt.cancelled() => None,
            out = fut => Some(out),
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

pub struct Shell<'a> {
    rt: &'a Runtime,
    engine: Engine,
    scene: Arc<SnapshotScene>,
    cfg: Config,
    home: PathBuf,
    console: Console,
}

impl<'a> Shell<'a> {
    pub fn new(
        rt: &'a Runtime,
        engine: Engine,
        scene: Arc<SnapshotScene>,
        cfg: Config,
        home: PathBuf,
        console: Console,
    ) -> Self {
        Self {
            rt,
            engine,
            scene,
            cfg,
            home,
            console,
        }
    }

    /// `true` once Ctrl-C was pressed.
    pub fn interrupted(&self) -> bool {
        self.console.interrupted()
    }

    /// Runs an engine call; `None` when Ctrl-C cut it short.
    fn wait<F: Future>(&self, fut: F) -> Option<F::Output> {
        let out = until_interrupted(self.rt, &self.console.interrupt, fut);
        if out.is_none() {
            println!("{}", "interrupted".yellow());
        }
        out
    }

    /// Entry point for the interactive REPL.  Returns on `/quit`, EOF or
    /// Ctrl-C.
    pub fn run(&mut self) {
        let mut stdout = io::stdout();

        loop {
            if self.interrupted() {
                break;
            }

            print!("{} ", "boneguide>".bold().cyan());
            stdout.flush().ok();

            let line = match self.console.next() {
                Input::Line(line) => line,
                Input::Eof | Input::Interrupted => break,
            };

            let cmd = line.trim();
            if cmd.is_empty() {
                continue;
            }
            let (head, rest) = cmd.split_once(' ').unwrap_or((cmd, ""));

            match head {
                "/help" => cmd_help(),
                "/start" => self.cmd_start(),
                "/confirm" => self.cmd_confirm(),
                "/track" => self.cmd_track(),
                "/stop" => self.cmd_stop(),
                "/status" => self.cmd_status(),
                "/offsets" => self.cmd_offsets(rest.trim()),
                "/snapshot" => self.cmd_snapshot(),
                "/dismiss" => self.cmd_dismiss(),
                "/settings" => self.cmd_settings(),
                "/quit" | "/exit" => {
                    println!("{}", "Goodbye.".green());
                    break;
                }
                other => {
                    println!(
                        "{} '{}'. Type {} for available commands.",
                        "Unknown command:".red(),
                        other.yellow(),
                        "/help".bold()
                    );
                }
            }
        }
    }

    /// Ends any live session and stops the coordinator.
    pub fn shutdown(&self) {
        match self.rt.block_on(self.engine.shutdown()) {
            Ok(()) => println!("{}", "  ✓ Session closed.".green()),
            Err(e) => println!("  {}: {}", "Shutdown error".red(), e),
        }
    }

    // ── command handlers ────────────────────────────────────────────────────

    fn cmd_start(&self) {
        let engine = &self.engine;
        print!("  Creating session at {} … ", self.cfg.server_url.dimmed());
        io::stdout().flush().ok();
        match self.wait(engine.start_session()) {
            None => {}
            Some(Ok(())) => {
                println!("{}", "OK".green());
                if let Some(o) = self.scene.overlay() {
                    println!(
                        "  Model: {} triangles, {:.3} x {:.3} x {:.3} m",
                        o.triangles, o.size[0], o.size[1], o.size[2]
                    );
                }
                println!(
                    "  Line the model up with the bone, then type {}.",
                    "/confirm".bold()
                );
            }
            Some(Err(e)) => report(&e, "Could not start session"),
        }
    }

    fn cmd_confirm(&self) {
        let engine = &self.engine;
        print!("  Locking initial pose … ");
        io::stdout().flush().ok();
        match self.wait(engine.confirm_alignment()) {
            None => {}
            Some(Ok(())) => {
                println!("{}", "locked".green());
                if self.cfg.continuous_tracking {
                    println!("  Continuous tracking is running in the background.");
                } else {
                    println!("  Type {} to refresh the pose.", "/track".bold());
                }
            }
            Some(Err(e)) => report(&e, "Tracking failed"),
        }
    }

    fn cmd_track(&self) {
        let engine = &self.engine;
        match self.wait(engine.track_once()) {
            None => {}
            Some(Ok(())) => {
                println!("  {} pose #{}", "✓".green(), engine.snapshot().tracking_count)
            }
            Some(Err(e)) => report(&e, "Tracking failed"),
        }
    }

    fn cmd_stop(&self) {
        let engine = &self.engine;
        match self.wait(engine.stop_session()) {
            None => {}
            Some(Ok(())) => println!("  {} Session ended.", "✓".green()),
            Some(Err(e)) => report(&e, "Could not stop session"),
        }
    }

    fn cmd_dismiss(&self) {
        let engine = &self.engine;
        match self.wait(engine.dismiss_error()) {
            None => {}
            Some(Ok(())) => println!("  {} Error cleared.", "✓".green()),
            Some(Err(e)) => report(&e, "Nothing to dismiss"),
        }
    }

    fn cmd_status(&self) {
        println!("{}", "Session".bold().underline());
        for line in describe(&self.engine.snapshot()) {
            println!("  {line}");
        }
        if !self.scene.has_camera() {
            let hint = "No camera feed (start with a snapshot directory to replay one)";
            println!("  {}", hint.dimmed());
        }
    }

    fn cmd_offsets(&mut self, args: &str) {
        if args.is_empty() {
            let o = self.cfg.offsets;
            println!(
                "  camera_distance={} x={} y={} z={}  (usage: /offsets <d> <x> <y> <z> | reset)",
                o.camera_distance, o.x, o.y, o.z
            );
            return;
        }
        let offsets = match parse_offsets(args) {
            Ok(o) => o,
            Err(e) => {
                println!("  {}: {}", "Invalid offsets".red(), e);
                return;
            }
        };
        if let Err(e) = self.rt.block_on(self.engine.set_offsets(offsets)) {
            report(&e, "Could not apply offsets");
            return;
        }
        self.cfg.offsets = offsets;
        match config::save(&self.cfg) {
            Ok(()) => println!("  {} Offsets applied and saved.", "✓".green()),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
    }

    fn cmd_snapshot(&self) {
        let engine = &self.engine;
        let root = self.cfg.snapshot_root(&self.home);
        match self.wait(engine.save_snapshot(&root)) {
            None => {}
            Some(Ok(dir)) => println!(
                "  {} Snapshot saved to {}",
                "✓".green(),
                dir.display().to_string().bold()
            ),
            Some(Err(e)) => report(&e, "Snapshot failed"),
        }
    }

    fn cmd_settings(&mut self) {
        let mut cfg = self.cfg.clone();
        println!("{}", "Settings Editor".bold().underline());

        let console = &self.console;
        cfg.server_url = console.prompt_str(
            &format!("  Pose server URL    [{}]: ", cfg.server_url),
            &cfg.server_url,
        );
        cfg.continuous_tracking =
            console.prompt_bool("  Continuous tracking", cfg.continuous_tracking);
        cfg.save_requests = console.prompt_bool("  Save every request ", cfg.save_requests);
        cfg.max_tracking_frames = console.prompt_number(
            &format!("  Max tracking frames (0 = unlimited) [{}]: ", cfg.max_tracking_frames),
            cfg.max_tracking_frames,
        );
        cfg.request_timeout_secs = console.prompt_number(
            &format!("  Request timeout (s) [{}]: ", cfg.request_timeout_secs),
            cfg.request_timeout_secs,
        );
        if self.interrupted() {
            return;
        }

        if let Err(e) = config::save(&cfg) {
            println!("{}: {}", "Error saving config".red(), e);
            return;
        }
        println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        );

        // The engine's configuration is fixed at spawn; replace it.
        let rebuilt = {
            let _guard = self.rt.enter();
            build_engine(&cfg, &self.home, Arc::clone(&self.scene))
        };
        match rebuilt {
            Ok(new_engine) => {
                let old = std::mem::replace(&mut self.engine, new_engine);
                let _ = self.rt.block_on(old.shutdown());
                self.cfg = cfg;
                println!("  Engine restarted with the new settings.");
            }
            Err(e) => report(&e, "Could not apply settings"),
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "BoneGuide Commands".bold().underline());
    println!("  {}     – create a session and load the bone model", "/start".bold().cyan());
    println!("  {}   – confirm alignment and lock the pose", "/confirm".bold().cyan());
    println!("  {}     – request one pose refresh", "/track".bold().cyan());
    println!("  {}      – end the session", "/stop".bold().cyan());
    println!("  {}    – show the session state", "/status".bold().cyan());
    println!("  {}   – view or change pose offsets", "/offsets".bold().cyan());
    println!("  {}  – save the current frame to disk", "/snapshot".bold().cyan());
    println!("  {}   – clear the current error", "/dismiss".bold().cyan());
    println!("  {}  – edit ~/.boneguide/config.toml", "/settings".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn report(err: &EngineError, title: &str) {
    let user = err.to_user_error(title);
    println!("{}", "FAILED".red());
    println!("  {}: {}", user.title.red().bold(), user.message);
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable lines for `/status`.
pub(crate) fn describe(s: &TrackingSession) -> Vec<String> {
    let mut lines = vec![
        format!("phase     : {}", s.phase),
        format!("session   : {}", s.session_id.as_deref().unwrap_or("-")),
        format!("poses     : {}", s.tracking_count),
    ];
    if s.tracking_count > 0 || s.phase == boneguide_types::SessionPhase::Aligning {
        let t = s.overlay_transform.translation();
        lines.push(format!("overlay   : ({:.3}, {:.3}, {:.3}) m", t.x, t.y, t.z));
    }
    if let Some(err) = &s.error {
        lines.push(format!("error     : {err}"));
    }
    lines
}

/// `reset`, or four numbers: camera distance, x, y, z (meters).
pub(crate) fn parse_offsets(args: &str) -> Result<Offsets, String> {
    if args.eq_ignore_ascii_case("reset") {
        return Ok(Offsets::default());
    }
    let values = args
        .split_whitespace()
        .map(|v| v.parse::<f32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        &[camera_distance, x, y, z] if values.iter().all(|v| v.is_finite()) => Ok(Offsets {
            camera_distance,
            x,
            y,
            z,
        }),
        &[_, _, _, _] => Err("offsets must be finite".to_string()),
        _ => Err(format!("expected 4 values, got {}", values.len())),
    }
}

/// Parses a prompt answer; `None` when it is not a valid `T`.
pub(crate) fn parse_number<T: FromStr>(raw: &str, default: T) -> Option<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(default);
    }
    raw.parse().ok()
}
