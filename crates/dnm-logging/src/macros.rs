//! ---
//! dnm_section: "03-persistence-logging"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Context-enriched logging macros."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __dnm_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            stage = ctx.stage.unwrap_or(""),
            substation = ctx.substation.unwrap_or(""),
            feeder = ctx.feeder.unwrap_or(""),
            seed = ctx.seed.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with generator context.
#[macro_export]
macro_rules! dnm_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with generator context.
#[macro_export]
macro_rules! dnm_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with generator context.
#[macro_export]
macro_rules! dnm_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error enriched with generator context.
#[macro_export]
macro_rules! dnm_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__dnm_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
