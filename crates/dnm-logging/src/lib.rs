//! ---
//! dnm_section: "03-persistence-logging"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Structured logging context for generator stages."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging helpers used by every generator stage.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and tooling.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Pipeline stage emitting the event (`topology`, `weather`, ...).
    pub stage: Option<&'a str>,
    /// Substation identifier associated with the event.
    pub substation: Option<&'a str>,
    /// Feeder identifier associated with the event.
    pub feeder: Option<&'a str>,
    /// Base seed of the run.
    pub seed: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the pipeline stage.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attach a substation identifier.
    pub fn with_substation(mut self, substation: &'a str) -> Self {
        self.substation = Some(substation);
        self
    }

    /// Attach a feeder identifier.
    pub fn with_feeder(mut self, feeder: &'a str) -> Self {
        self.feeder = Some(feeder);
        self
    }

    /// Attach the run seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Outcome attached to stage lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage completed.
    Success,
    /// The stage completed but adjusted data (e.g. clamped coordinates).
    Degraded,
    /// The stage aborted the run.
    Fault,
}

impl StageOutcome {
    /// Stable label written into the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Success => "success",
            StageOutcome::Degraded => "degraded",
            StageOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized stage event; the level follows the outcome.
pub fn log_stage_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: StageOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                event,
                outcome = outcome.as_str(),
                stage = ctx.stage.unwrap_or(""),
                substation = ctx.substation.unwrap_or(""),
                feeder = ctx.feeder.unwrap_or(""),
                seed = ctx.seed.unwrap_or_default(),
                message = %message
            )
        };
    }
    match outcome {
        StageOutcome::Success => emit!(Level::INFO),
        StageOutcome::Degraded => emit!(Level::WARN),
        StageOutcome::Fault => emit!(Level::ERROR),
    }
}
