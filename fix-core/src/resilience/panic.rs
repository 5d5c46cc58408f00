//! Panic policy for the engine process.
//!
//! A panic anywhere in the reader/writer threads leaves a `Session` in an
//! undefined state — half-written wire bytes, a lock held mid-update — so
//! the policy here is not "recover and keep going" but "log everything
//! useful, give registered shutdown hooks one last chance to flag the
//! venue connection as dead, then exit non-zero." `panic = "abort"` in the
//! release profile still runs this hook before aborting; only the
//! post-hook unwind is skipped.
//!
//! # Usage
//!
//! Call `install_panic_handler()` once, early in `main()`:
//!
//! ```no_run
//! use fix_core::resilience::install_panic_handler;
//!
//! fn main() {
//!     install_panic_handler();
//!     // ... rest of application
//! }
//! ```

use std::panic::{self, PanicHookInfo};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::error;

static PANIC_COUNT: AtomicU64 = AtomicU64::new(0);

type ShutdownHook = Box<dyn Fn() + Send + Sync>;

fn shutdown_hooks() -> &'static Mutex<Vec<ShutdownHook>> {
    static HOOKS: OnceLock<Mutex<Vec<ShutdownHook>>> = OnceLock::new();
    HOOKS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a callback to run from the panic hook, before the process
/// exits. Intended for best-effort cleanup that does not depend on the
/// thread that panicked still being able to make progress — e.g. marking
/// a session's phase as faulted for an external health check to observe,
/// not flushing an in-flight wire write. Hooks run in registration order
/// and a panicking hook is caught and ignored so one bad hook can't stop
/// the rest from running.
pub fn register_shutdown_hook(hook: impl Fn() + Send + Sync + 'static) {
    shutdown_hooks().lock().unwrap().push(Box::new(hook));
}

/// Total panics observed by this process since `install_panic_handler`
/// was called. Exported for the metrics registry rather than logged only,
/// since a panic rate climbing across reconnect attempts is the signal an
/// operator actually wants to alert on.
pub fn panic_count() -> u64 {
    PANIC_COUNT.load(Ordering::Relaxed)
}

fn describe(panic_info: &PanicHookInfo<'_>) -> (String, String) {
    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "<unknown location>".to_string());

    let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    };

    (location, message)
}

fn run_shutdown_hooks() {
    let hooks = shutdown_hooks().lock().unwrap();
    for hook in hooks.iter() {
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(hook));
    }
}

/// Install a global panic handler with a default 100ms grace period
/// before the process exits, giving the tracing subscriber time to flush
/// a JSON line out over the wire to a log collector.
pub fn install_panic_handler() {
    install_panic_handler_with_grace_period(Duration::from_millis(100));
}

/// Same as [`install_panic_handler`] but with an explicit grace period,
/// for deployments whose log shipper needs longer to drain (or tests that
/// want it shorter).
pub fn install_panic_handler_with_grace_period(grace_period: Duration) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let count = PANIC_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
        let (location, message) = describe(panic_info);

        error!(
            location = %location,
            message = %message,
            panic_count = count,
            "engine session thread panicked; running shutdown hooks and exiting"
        );

        eprintln!("═══════════════════════════════════════════════════════════");
        eprintln!("FATAL: FIX engine thread panicked (panic #{count})");
        eprintln!("Location: {location}");
        eprintln!("Message:  {message}");
        eprintln!("═══════════════════════════════════════════════════════════");

        run_shutdown_hooks();

        default_hook(panic_info);

        std::thread::sleep(grace_period);
        process::exit(1);
    }));

    tracing::info!("panic handler installed; sessions should register shutdown hooks before connecting");
}
