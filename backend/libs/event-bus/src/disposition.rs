//! Three-way message disposition and the policy that picks it.

use std::fmt;

/// Terminal outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Processed; never redelivered.
    Ack,
    /// Transient failure; redelivered after the broker's backoff.
    Nak,
    /// Poison pill; never redelivered.
    Term,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Nak => "nak",
            Disposition::Term => "term",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that can never be processed, however often it is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonPill {
    pub reason: String,
}

impl PoisonPill {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PoisonPill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poison pill: {}", self.reason)
    }
}

impl std::error::Error for PoisonPill {}

/// A failure that may clear up by itself (I/O, downstream outage, timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientError {
    pub reason: String,
}

impl TransientError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transient failure: {}", self.reason)
    }
}

impl std::error::Error for TransientError {}

impl From<anyhow::Error> for TransientError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Pick the disposition from the three stage results, checked in order:
/// parse, validation, persistence.
///
/// Pure: no broker or persistence types are involved.
pub fn decide(
    parse: Result<(), &PoisonPill>,
    validation: Result<(), &PoisonPill>,
    persistence: Result<(), &TransientError>,
) -> Disposition {
    if parse.is_err() || validation.is_err() {
        return Disposition::Term;
    }
    if persistence.is_err() {
        return Disposition::Nak;
    }
    Disposition::Ack
}
