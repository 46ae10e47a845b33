//! Colored diagnostics output for the runtime compiler.
//!
//! Provides a custom `tracing` layer that formats compiler and JIT events
//! as `#######`-prefixed lines on stderr, the way the host prints its own
//! messages.
//!
//! ## Log Levels
//!
//! - **INFO**: Lifecycle events (compile, link, environment create/destroy)
//! - **WARN**: Recovered failures (rejected requests, leaked code memory)
//! - **DEBUG**: Planned jobs, target triple, per-unit materialization
//! - **TRACE**: Individual symbol lookups

use owo_colors::OwoColorize;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: OnceLock<()> = OnceLock::new();
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Line prefix shared with the host's own messages.
pub const PREFIX: &str = "#######";

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "opjit=info";

/// Initializes diagnostics output.
///
/// Safe to call multiple times - only the first call has effect. If another
/// global subscriber is already installed it is left in place.
pub fn init() {
    INIT.get_or_init(|| {
        EPOCH.get_or_init(Instant::now);

        let filter = EnvFilter::builder()
            .with_default_directive(
                DEFAULT_DIRECTIVE
                    .parse()
                    .unwrap_or_else(|_| LevelFilter::INFO.into()),
            )
            .from_env_lossy();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(DiagnosticsLayer)
            .try_init();
    });
}

fn elapsed_secs() -> f64 {
    EPOCH
        .get()
        .map(|epoch| epoch.elapsed().as_secs_f64())
        .unwrap_or(0.0)
}

/// A tracing layer that formats opjit events with colors.
pub struct DiagnosticsLayer;

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        // Accept events from opjit crates only
        if !metadata.target().starts_with("opjit") {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let output = format_event(&visitor, *metadata.level());
        if !output.is_empty() {
            let _ = writeln!(io::stderr(), "{}", output);
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    event: Option<String>,
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "event" => self.event = Some(value),
            "message" => self.message = Some(value),
            name => self.fields.push((name, value)),
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        self.push(field, s.trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }
}

fn format_event(v: &EventVisitor, level: Level) -> String {
    let headline = match (&v.event, &v.message) {
        (Some(event), _) => format_headline(event, level),
        (None, Some(message)) => message.clone(),
        (None, None) => return String::new(),
    };

    let mut output = format!("{} {} {}", format_elapsed(), format_prefix(level), headline);

    if let (Some(_), Some(message)) = (&v.event, &v.message) {
        let _ = write!(output, " │ {}", message);
    }
    for (name, value) in &v.fields {
        let _ = write!(output, " │ {}={}", name.bright_black(), value);
    }
    output
}

fn format_elapsed() -> String {
    format!("{:>7.3}s", elapsed_secs())
        .bright_black()
        .to_string()
}

fn format_prefix(level: Level) -> String {
    match level {
        Level::ERROR => PREFIX.bright_red().bold().to_string(),
        Level::WARN => PREFIX.bright_yellow().bold().to_string(),
        Level::INFO => PREFIX.bright_cyan().to_string(),
        _ => PREFIX.bright_black().to_string(),
    }
}

fn format_headline(event: &str, level: Level) -> String {
    let label = event.replace('_', " ");
    match level {
        Level::ERROR => label.bright_red().bold().to_string(),
        Level::WARN => label.bright_yellow().to_string(),
        Level::INFO => label.white().bold().to_string(),
        _ => label.white().to_string(),
    }
}
