//! Error kinds and the thrown-error cell (spec §7).
//!
//! Boron errors are descriptive, not dispatched on: every fallible core
//! operation returns `Result<T, BoronError>`, matching the Result-style
//! control-flow design note in spec §9 ("the source already threads the
//! status"). `QUIT`/`HALT` are a different, lighter-weight signal — they
//! carry only a word atom, not a formatted message — so they are modeled
//! separately as [`ControlFlow`] rather than forced into `BoronError`.

use std::fmt;

/// The five descriptive error kinds from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Value did not satisfy a datatype constraint.
    Type,
    /// Tokenizer rejected input at a known line number.
    Syntax,
    /// Runtime semantic fault (unbound word, bad index, shared mutation, ...).
    Script,
    /// External resource refused or failed.
    Access,
    /// Resource exhaustion or internal inconsistency (fatal).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Type => "type",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Script => "script",
            ErrorKind::Access => "access",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A single entry in an error's trace: the block buffer id and the cursor
/// position within it at the time of re-entry (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub block: i32,
    pub position: i32,
}

/// A formatted runtime error, as would be held by an Error cell: kind, a
/// message, and a trace of block re-entries.
#[derive(Debug, Clone, PartialEq)]
pub struct BoronError {
    pub kind: ErrorKind,
    pub message: String,
    pub trace: Vec<TraceEntry>,
}

impl BoronError {
    pub fn new(kind: ErrorKind, message: String) -> BoronError {
        BoronError { kind, message, trace: Vec::new() }
    }

    pub fn script(message: impl Into<String>) -> BoronError {
        BoronError::new(ErrorKind::Script, message.into())
    }

    pub fn type_(message: impl Into<String>) -> BoronError {
        BoronError::new(ErrorKind::Type, message.into())
    }

    pub fn syntax(message: impl Into<String>) -> BoronError {
        BoronError::new(ErrorKind::Syntax, message.into())
    }

    pub fn access(message: impl Into<String>) -> BoronError {
        BoronError::new(ErrorKind::Access, message.into())
    }

    pub fn internal(message: impl Into<String>) -> BoronError {
        BoronError::new(ErrorKind::Internal, message.into())
    }

    /// Append a trace entry, unless the error was built with the
    /// skip-trace flag set by the caller (spec §7: "unless the
    /// suppression flag is set").
    pub fn append_trace(&mut self, block: i32, position: i32) {
        self.trace.push(TraceEntry { block, position });
    }
}

impl fmt::Display for BoronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BoronError {}

/// Non-error exceptional control flow: `QUIT`/`HALT` carry a word atom
/// rather than a formatted message (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Quit(u16),
    Halt(u16),
}

/// What a thread's distinguished exception slot can hold after a `THROW`
/// status is returned by a primitive (spec §7).
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Error(BoronError),
    Control(ControlFlow),
}

impl From<BoronError> for Signal {
    fn from(e: BoronError) -> Signal {
        Signal::Error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_accumulates_in_order() {
        let mut e = BoronError::script("unbound word");
        e.append_trace(3, 1);
        e.append_trace(3, 4);
        assert_eq!(e.trace, vec![TraceEntry { block: 3, position: 1 }, TraceEntry { block: 3, position: 4 }]);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let e = BoronError::type_("expected int!");
        assert_eq!(e.to_string(), "type: expected int!");
    }
}
