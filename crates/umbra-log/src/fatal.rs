//! Single termination path for unrecoverable failures.
//!
//! Panics (through [`install_panic_hook`]) and fatal errors surfaced at the
//! top of the frame loop both end in [`terminate`], which logs the cause and
//! exits with [`EXIT_FATAL`].

use std::panic::PanicHookInfo;

/// Process exit code used for every fatal termination.
pub const EXIT_FATAL: i32 = 1;

/// Why the process is going down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalSignal {
    /// A panic escaped somewhere in the process.
    #[error("panic at {location}: {message}")]
    Panic {
        /// Panic payload rendered as text.
        message: String,
        /// `file:line:column` of the panic, or `unknown`.
        location: String,
    },
    /// An error that the frame loop cannot recover from.
    #[error("fatal {source_kind} error: {message}")]
    Error {
        /// Short name of the failing subsystem, e.g. `render`.
        source_kind: &'static str,
        /// The error rendered with its source chain.
        message: String,
    },
}

impl FatalSignal {
    /// Wrap an error and its source chain.
    pub fn from_error(source_kind: &'static str, err: &dyn std::error::Error) -> Self {
        let mut message = err.to_string();
        let mut cause = err.source();
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Error {
            source_kind,
            message,
        }
    }

    /// Capture a panic's payload and location.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        Self::Panic { message, location }
    }
}

/// Log a fatal signal without exiting.
pub fn report(signal: &FatalSignal) {
    tracing::error!(target: "umbra::fatal", "{signal}");
}

/// Log the signal and exit the process. Never returns.
pub fn terminate(signal: &FatalSignal) -> ! {
    report(signal);
    std::process::exit(EXIT_FATAL);
}

/// Route every panic into [`terminate`].
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let signal = FatalSignal::from_panic(info);
        // The subscriber may not be up yet.
        eprintln!("{signal}");
        terminate(&signal);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("device lost")]
    struct Inner;

    #[derive(Debug, thiserror::Error)]
    #[error("shadow pass failed")]
    struct Outer(#[source] Inner);

    #[test]
    fn test_from_error_includes_source_chain() {
        let signal = FatalSignal::from_error("render", &Outer(Inner));
        assert_eq!(
            signal.to_string(),
            "fatal render error: shadow pass failed: device lost"
        );
    }

    #[test]
    fn test_panic_signal_display() {
        let signal = FatalSignal::Panic {
            message: "index out of bounds".to_string(),
            location: "src/lib.rs:1:1".to_string(),
        };
        assert_eq!(
            signal.to_string(),
            "panic at src/lib.rs:1:1: index out of bounds"
        );
    }

    #[test]
    fn test_report_does_not_exit() {
        report(&FatalSignal::Error {
            source_kind: "test",
            message: "still running".to_string(),
        });
    }
}
