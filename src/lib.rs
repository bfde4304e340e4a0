//! Automated correctness grading for submitted code units.
//!
//! A grading session loads a candidate unit through an external loader,
//! exercises it case by case through an execution adapter, and narrates the
//! outcome as an ordered JSON report using a locale-aware message catalog.
//! Candidate I/O runs through an in-memory capture channel; comparison,
//! presentation and scoring are callback-driven.

pub mod adapter;
pub mod callbacks;
pub mod case;
pub mod channel;
pub mod engine;
pub mod error;
pub mod lint;
pub mod messages;
pub mod report;
pub mod unit;

pub use adapter::{ExecutionAdapter, FunctionAdapter, ProgramAdapter, SnippetAdapter};
pub use callbacks::{
    Comparator, Grader, Informer, OutputParser, OutputValidator, PassFailGrader, Presenter,
    PresenterSet, Prober,
};
pub use case::TestCase;
pub use channel::Channel;
pub use engine::{LoadOptions, RunOptions, Session};
pub use error::{CatalogError, Fault, FaultKind, Mismatch, ParseError};
pub use lint::{
    LintCategory, LintFinding, LintGrader, LintOptions, LintSummary, SourceProber, StaticOptions,
    ThresholdGrader,
};
pub use messages::{detect_locale, Catalog, Category, Entry, Flag, OverrideLayer};
pub use report::{Message, Report, Run, TestSection, Verdict};
pub use unit::{validate_unit_name, CandidateUnit, NameError, UnitLoader};
