use serde_json::Value;

use crate::case::TestCase;
use crate::channel::Channel;
use crate::error::{Fault, FaultKind};
use crate::messages::Category;
use crate::unit::{CandidateUnit, UnitLoader};

/// How one kind of test exercises candidate code. The engine drives the
/// same state machine for every kind; the adapter decides what "running a
/// case" means and which message category narrates it.
pub trait ExecutionAdapter {
    fn category(&self) -> Category;

    /// Catalog key for the test section title.
    fn title_key(&self) -> &'static str;

    /// Name shown in the section title (entry point or unit name).
    fn target(&self) -> &str;

    fn unit(&self) -> Option<&dyn CandidateUnit>;

    /// Runs one case against the candidate, reading and writing through
    /// `io`. The channel is already acquired with the case's inputs.
    fn invoke(&mut self, case: &TestCase, io: &mut Channel) -> Result<Value, Fault>;

    /// Code the adapter assembled around the candidate's own source, when
    /// it differs from that source. Shown once so the learner knows what
    /// actually ran.
    fn constructed_code(&self) -> Option<&str> {
        None
    }
}

/// Tests a single entry point: each case calls it with the case's
/// arguments and compares the returned value.
pub struct FunctionAdapter {
    unit: Box<dyn CandidateUnit>,
    entry: String,
    repeat: u32,
    validate_faults: bool,
}

impl FunctionAdapter {
    pub fn new(unit: Box<dyn CandidateUnit>, entry: impl Into<String>) -> Self {
        Self {
            unit,
            entry: entry.into(),
            repeat: 1,
            validate_faults: false,
        }
    }

    /// Calls the entry point this many times per case, keeping the last
    /// result. Used for functions whose behavior depends on accumulated
    /// state.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Treats raised faults as the result under test instead of aborting
    /// the case. The fault is encoded as a value and compared against the
    /// reference; [`FaultKind::NotCallable`] still aborts.
    pub fn validating_faults(mut self) -> Self {
        self.validate_faults = true;
        self
    }
}

impl ExecutionAdapter for FunctionAdapter {
    fn category(&self) -> Category {
        Category::Function
    }

    fn title_key(&self) -> &'static str {
        "FunctionName"
    }

    fn target(&self) -> &str {
        &self.entry
    }

    fn unit(&self) -> Option<&dyn CandidateUnit> {
        Some(self.unit.as_ref())
    }

    fn invoke(&mut self, case: &TestCase, io: &mut Channel) -> Result<Value, Fault> {
        let mut result = Value::Null;
        for _ in 0..self.repeat {
            result = match self.unit.call(&self.entry, &case.args, io) {
                Ok(value) => value,
                Err(fault) if self.validate_faults && fault.kind != FaultKind::NotCallable => {
                    fault.into_value()
                }
                Err(fault) => return Err(fault),
            };
        }
        Ok(result)
    }
}

/// Tests a whole program: each case re-runs the unit top to bottom with the
/// case's scripted inputs and evaluates the captured output.
pub struct ProgramAdapter {
    unit: Box<dyn CandidateUnit>,
    name: String,
}

impl ProgramAdapter {
    pub fn new(unit: Box<dyn CandidateUnit>) -> Self {
        let name = unit.name().to_string();
        Self { unit, name }
    }
}

impl ExecutionAdapter for ProgramAdapter {
    fn category(&self) -> Category {
        Category::Program
    }

    fn title_key(&self) -> &'static str {
        "ProgramName"
    }

    fn target(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> Option<&dyn CandidateUnit> {
        Some(self.unit.as_ref())
    }

    fn invoke(&mut self, _case: &TestCase, io: &mut Channel) -> Result<Value, Fault> {
        self.unit.reset(io)?;
        Ok(Value::Null)
    }
}

/// Tests a code snippet: the candidate's source is wrapped by a constructor
/// (setup lines before, inspection after), executed, and the resulting
/// namespace becomes the value under test.
pub struct SnippetAdapter {
    loader: Box<dyn UnitLoader>,
    name: String,
    source: String,
    full_code: String,
    unit: Option<Box<dyn CandidateUnit>>,
}

impl SnippetAdapter {
    pub fn new(loader: Box<dyn UnitLoader>, name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            loader,
            name: name.into(),
            full_code: source.clone(),
            source,
            unit: None,
        }
    }

    /// Wraps the candidate source with a constructor before execution.
    pub fn with_constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        self.full_code = construct(&self.source);
        self
    }
}

impl ExecutionAdapter for SnippetAdapter {
    fn category(&self) -> Category {
        Category::Snippet
    }

    fn title_key(&self) -> &'static str {
        "SnippetTest"
    }

    fn target(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> Option<&dyn CandidateUnit> {
        self.unit.as_deref()
    }

    fn invoke(&mut self, _case: &TestCase, io: &mut Channel) -> Result<Value, Fault> {
        match self.unit.as_mut() {
            Some(unit) => unit.reset(io)?,
            None => {
                let unit = self.loader.load_source(&self.name, &self.full_code, io)?;
                self.unit = Some(unit);
            }
        }
        let namespace = self.unit.as_ref().map(|u| u.namespace()).unwrap_or_default();
        let map: serde_json::Map<String, Value> = namespace.into_iter().collect();
        Ok(Value::Object(map))
    }

    fn constructed_code(&self) -> Option<&str> {
        (self.full_code != self.source).then_some(self.full_code.as_str())
    }
}
