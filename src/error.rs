use serde_json::{json, Value};
use thiserror::Error;

/// Closed classification for faults raised by candidate code or by the
/// collaborators that load and run it. Fault origins the boundary does not
/// recognise are tagged [`FaultKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Division by zero, overflow and similar arithmetic failures.
    Arithmetic,
    /// Sequence index outside its bounds.
    OutOfBounds,
    /// Lookup of a key that does not exist.
    MissingKey,
    /// Reference to a name the unit never defined.
    UndefinedName,
    /// Operation applied to a value of the wrong type.
    TypeMismatch,
    /// Operation applied to a value of the right type but unusable content.
    InvalidValue,
    /// Input/output failure while the candidate was running.
    Io,
    /// Recursion limit exceeded.
    Recursion,
    /// The named entry point exists but cannot be invoked.
    NotCallable,
    /// Anything the boundary could not classify.
    Other,
}

impl FaultKind {
    /// Message catalog key for this kind. Lookups fall back to
    /// `GenericError` when a locale does not carry the specific key.
    pub fn key(&self) -> &'static str {
        match self {
            FaultKind::Arithmetic => "ArithmeticFault",
            FaultKind::OutOfBounds => "OutOfBoundsFault",
            FaultKind::MissingKey => "MissingKeyFault",
            FaultKind::UndefinedName => "UndefinedNameFault",
            FaultKind::TypeMismatch => "TypeFault",
            FaultKind::InvalidValue => "ValueFault",
            FaultKind::Io => "IoFault",
            FaultKind::Recursion => "RecursionFault",
            FaultKind::NotCallable => "NotCallable",
            FaultKind::Other => "GenericError",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::Arithmetic => "arithmetic",
            FaultKind::OutOfBounds => "out-of-bounds",
            FaultKind::MissingKey => "missing-key",
            FaultKind::UndefinedName => "undefined-name",
            FaultKind::TypeMismatch => "type",
            FaultKind::InvalidValue => "value",
            FaultKind::Io => "io",
            FaultKind::Recursion => "recursion",
            FaultKind::NotCallable => "not-callable",
            FaultKind::Other => "other",
        }
    }
}

/// One call-stack frame recorded when a fault was raised. Frames point into
/// candidate source so the engine can report the offending line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub code: String,
}

/// A fault raised while exercising candidate code.
#[derive(Debug, Clone, Error)]
#[error("{} fault: {message}", kind.name())]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub frames: Vec<Frame>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, file: impl Into<String>, line: u32, code: impl Into<String>) -> Self {
        self.frames.push(Frame {
            file: file.into(),
            line,
            code: code.into(),
        });
        self
    }

    /// Last frame whose source file matches `file` - the candidate line
    /// responsible for the fault.
    pub fn last_frame_in(&self, file: &str) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.file == file)
    }

    /// Encodes the fault as a result value, used when a test validates
    /// raised faults instead of propagating them.
    pub fn into_value(self) -> Value {
        json!({ "fault": self.kind.name(), "message": self.message })
    }
}

/// Raised by output parsers that cannot make sense of the captured text.
/// Distinct from invocation faults; reported with pattern guidance.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Assertion-style failure returned by comparators, probers and output
/// validators. The optional key selects the catalog message to show; the
/// caller supplies a fallback key when it is absent.
#[derive(Debug, Clone, Default, Error)]
#[error("mismatch{}", key.as_deref().map(|k| format!(" ({k})")).unwrap_or_default())]
pub struct Mismatch {
    pub key: Option<String>,
}

impl Mismatch {
    pub fn new() -> Self {
        Self { key: None }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

/// Errors in the grading definition itself. These are configuration bugs:
/// the engine does not catch them and they are never shown to the learner.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no message catalog for locale '{locale}', category '{category}'")]
    MissingCatalog { locale: String, category: String },
    #[error("malformed message catalog for locale '{locale}': {source}")]
    Malformed {
        locale: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no message for key '{key}' in locale '{locale}'")]
    MissingKey { key: String, locale: String },
}
