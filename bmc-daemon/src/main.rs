//! mini-bmc supervisor daemon (bmcd)
//!
//! A hardened process that owns the simulated baseboard management
//! controller's state: it polls sensors, drives the fan-speed PID loop,
//! verifies the firmware chain of trust at startup, and serves IPMI-style
//! requests over a local Unix socket.
//!
//! # Security Model
//! - Environment sanitization (clear dangerous env vars)
//! - Restrictive umask and resource limits
//! - PID file with stale-PID detection
//! - Cooperative shutdown on SIGINT/SIGTERM

mod control_loop;
mod ipmi_listener;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use bmc_core::{persistence, sel::Severity, secure_boot, GlobalState};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PID_FILE: &str = "/tmp/bmc_daemon.pid";

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Configuration
// ============================================================================

/// Resolved run configuration: defaults from `bmc_core::constants`, overridable
/// from the command line.
struct Config {
    socket_path: std::path::PathBuf,
    state_path: std::path::PathBuf,
    sel_path: std::path::PathBuf,
    poll_interval_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: std::path::PathBuf::from(bmc_core::constants::paths::IPMI_SOCKET),
            state_path: GlobalState::state_file(),
            sel_path: GlobalState::sel_file(),
            poll_interval_secs: bmc_core::constants::pid::DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn print_help() {
    eprintln!("bmcd {} - mini-bmc supervisor daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    bmcd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -f, --foreground        Run in foreground (don't daemonize)");
    eprintln!("    -s, --socket PATH       IPMI socket path");
    eprintln!("        --state PATH        State snapshot file path");
    eprintln!("        --sel PATH          Event log snapshot file path");
    eprintln!("        --poll-interval SEC Control loop poll interval, in seconds");
    eprintln!("    -v, --version           Print version");
    eprintln!("    -h, --help              Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    BMC_LOG                 Log level (trace, debug, info, warn, error)");
}

fn print_version() {
    println!("bmcd {}", VERSION);
}

/// Parse `argv[1..]` into a `Config`, exiting the process on `-h`/`-v`/bad
/// arguments. Unrecognized flags print help and exit(1).
fn parse_args(args: &[String]) -> Config {
    let mut config = Config::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-f" | "--foreground" => {
                // Foreground mode is always on (no daemonization implemented).
            }
            "-s" | "--socket" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --socket requires a path argument");
                    std::process::exit(1);
                }
                config.socket_path = std::path::PathBuf::from(&args[i]);
            }
            "--state" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --state requires a path argument");
                    std::process::exit(1);
                }
                config.state_path = std::path::PathBuf::from(&args[i]);
            }
            "--sel" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --sel requires a path argument");
                    std::process::exit(1);
                }
                config.sel_path = std::path::PathBuf::from(&args[i]);
            }
            "--poll-interval" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --poll-interval requires a numeric argument");
                    std::process::exit(1);
                }
                match args[i].parse::<f64>() {
                    Ok(secs) if secs > 0.0 => config.poll_interval_secs = secs,
                    _ => {
                        eprintln!("Error: --poll-interval must be a positive number of seconds");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

// ============================================================================
// Security Hardening
// ============================================================================

fn sanitize_environment() {
    const DANGEROUS_VARS: &[&str] = &[
        "LD_PRELOAD",
        "LD_LIBRARY_PATH",
        "LD_AUDIT",
        "LD_DEBUG",
        "LD_PROFILE",
        "MALLOC_CHECK_",
        "HOSTALIASES",
        "LOCALDOMAIN",
        "RES_OPTIONS",
        "IFS",
        "PATH",
    ];

    for var in DANGEROUS_VARS {
        std::env::remove_var(var);
    }

    std::env::set_var("PATH", "/usr/sbin:/usr/bin:/sbin:/bin");
    std::env::set_var("LC_ALL", "C");
    std::env::set_var("LANG", "C");

    debug!("environment sanitized");
}

fn set_resource_limits() {
    set_rlimit(libc::RLIMIT_CORE as i32, 0, 0);
    set_rlimit(libc::RLIMIT_NOFILE as i32, 256, 256);
    set_rlimit(libc::RLIMIT_AS as i32, 128 * 1024 * 1024, 128 * 1024 * 1024);

    debug!("resource limits applied");
}

fn set_rlimit(resource: i32, soft: u64, hard: u64) {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    // SAFETY: setrlimit is safe given a known RLIMIT_* constant and an initialized rlimit struct.
    unsafe {
        #[allow(clippy::useless_conversion)]
        if libc::setrlimit(resource as libc::__rlimit_resource_t, &limit) != 0 {
            warn!("failed to set rlimit for resource {}", resource);
        }
    }
}

fn set_secure_umask() {
    // SAFETY: umask is always safe to call.
    unsafe { libc::umask(0o077) };
    debug!("umask set to 0077");
}

// ============================================================================
// PID File Management
// ============================================================================

fn write_pid_file() -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if Path::new(PID_FILE).exists() {
        if let Ok(content) = std::fs::read_to_string(PID_FILE) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: kill with signal 0 only probes for the process's existence.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        let _ = std::fs::remove_file(PID_FILE);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(PID_FILE)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", PID_FILE);
    Ok(())
}

fn cleanup(socket_path: &Path) {
    debug!("starting cleanup");

    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    if Path::new(PID_FILE).exists() {
        let _ = std::fs::remove_file(PID_FILE);
    }

    info!("cleanup complete");
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Best-effort immediate SEL persist, invoked right after any append that
/// may have just written a Critical entry: Critical entries persist
/// immediately rather than waiting for the next scheduled tick.
fn persist_sel_if_critical(state: &GlobalState, sel_path: &Path) {
    if state.event_log.last_is_critical() {
        if let Err(e) = persistence::save_atomic(sel_path, &state.event_log.snapshot()) {
            warn!("failed to persist SEL snapshot after critical entry: {}", e);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        eprintln!("PANIC at {}: {}", location, message);
    }));

    sanitize_environment();
    set_secure_umask();
    set_resource_limits();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = parse_args(&args);

    let log_level = std::env::var("BMC_LOG").unwrap_or_else(|_| "info".to_string());
    let mut use_journald = Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
            }
            Err(e) => {
                eprintln!("failed to create journald layer: {}, falling back to stdout", e);
                use_journald = false;
                tracing_subscriber::fmt()
                    .with_target(false)
                    .with_level(true)
                    .with_env_filter(&log_level)
                    .init();
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(&log_level)
            .init();
    }

    info!("STARTUP: bmcd {} starting", VERSION);

    if let Err(e) = write_pid_file() {
        error!("could not write PID file: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: received SIGINT/SIGTERM, initiating shutdown");
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("failed to set signal handler: {}. shutdown via signals may not work cleanly.", e);
    }

    // Phase 1: state
    let mut state = GlobalState::init(now_unix());
    state.event_log.add(Severity::Info, "Daemon", "BMC daemon starting up", now_unix());

    // Phase 2: firmware chain of trust
    let fw_dir = GlobalState::fw_image_dir();
    match secure_boot::init_images(&fw_dir) {
        Ok(images) => {
            state.fw_images = images;
            let passed = secure_boot::verify_chain(&mut state.fw_images, &mut state.event_log, now_unix());
            state.secure_boot_passed = passed;
            if passed {
                info!("secure boot verification passed");
            } else {
                warn!("secure boot verification failed, continuing in degraded mode");
            }
            persist_sel_if_critical(&state, &config.sel_path);
        }
        Err(e) => {
            error!("failed to initialize firmware images: {}", e);
            state.event_log.add(
                Severity::Critical,
                "SecureBoot",
                format!("failed to initialize firmware images: {}", e),
                now_unix(),
            );
            persist_sel_if_critical(&state, &config.sel_path);
        }
    }

    state.running = true;
    let state = Arc::new(Mutex::new(state));

    // Phase 3: IPMI listener (non-fatal if it fails to bind)
    let listener_state = state.clone();
    let socket_path = config.socket_path.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = ipmi_listener::run(listener_state, &SHUTDOWN, &socket_path).await {
            error!("IPMI listener exited with error: {}", e);
        }
    });

    {
        let mut guard = state.lock().await;
        guard
            .event_log
            .add(Severity::Info, "Daemon", "BMC daemon fully operational", now_unix());
    }
    info!("STARTUP: bmc daemon fully operational");

    // Phase 4: control loop (blocks until shutdown)
    control_loop::run(state.clone(), &SHUTDOWN, config.poll_interval_secs, &config.state_path, &config.sel_path).await;

    {
        let mut guard = state.lock().await;
        guard
            .event_log
            .add(Severity::Info, "Daemon", "BMC daemon shutting down", now_unix());
    }

    let _ = listener_handle.await;
    cleanup(&config.socket_path);
    info!("SHUTDOWN: daemon terminated gracefully");

    Ok(())
}
