//! Extension point for a real syslog backend. `relay6_core` itself never
//! calls [`LogSink`] — its own logging always goes through the ordinary
//! `tracing` macros — this trait exists purely so `relay6d` can hang a
//! `tracing_subscriber::Layer` off of it without this crate knowing
//! anything about syslog, journald, or any other destination.

/// Receives a copy of every `tracing` event alongside whatever
/// subscriber `relay6d` installed. The no-op default lets a caller
/// implement only the events it cares about.
pub trait LogSink {
    fn emit(&self, record: &tracing::Event<'_>) {
        let _ = record;
    }
}

/// The default sink: discards everything. Used when no real backend is
/// configured, so `relay6d` always has a concrete [`LogSink`] to hand
/// around rather than an `Option`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {}
