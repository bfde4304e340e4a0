use indexmap::IndexMap;
use serde_json::{json, Value};

use autograde::adapter::{ProgramAdapter, SnippetAdapter};
use autograde::callbacks::{NamespaceComparator, PresenterSet, VarsPresenter};
use autograde::channel::Channel;
use autograde::error::{Fault, FaultKind, ParseError};
use autograde::unit::{CandidateUnit, UnitLoader};
use autograde::{Flag, LoadOptions, RunOptions, Session, TestCase};

/// Candidate program that reads two numbers and prints their sum.
struct SummingProgram;

impl CandidateUnit for SummingProgram {
    fn name(&self) -> &str {
        "summer"
    }

    fn call(&mut self, _entry: &str, _args: &[Value], _io: &mut Channel) -> Result<Value, Fault> {
        Err(Fault::new(FaultKind::NotCallable, "not a function"))
    }

    fn reset(&mut self, io: &mut Channel) -> Result<(), Fault> {
        let mut total = 0i64;
        for _ in 0..2 {
            let line = io
                .read_line()
                .map_err(|e| Fault::new(FaultKind::Io, e.to_string()))?
                .ok_or_else(|| Fault::new(FaultKind::Io, "ran out of input"))?;
            total += line
                .parse::<i64>()
                .map_err(|_| Fault::new(FaultKind::InvalidValue, "not a number"))?;
        }
        io.write_line(&format!("The sum is {total}"))
            .map_err(|e| Fault::new(FaultKind::Io, e.to_string()))
    }
}

fn last_int_parser(raw: &str) -> Result<Value, ParseError> {
    raw.split_whitespace()
        .rev()
        .find_map(|tok| tok.parse::<i64>().ok())
        .map(|n| json!(n))
        .ok_or_else(|| ParseError::new("no number found in the output"))
}

#[test]
fn program_cases_compare_parsed_output() {
    let mut session = Session::new("en");
    let mut cases = TestCase::build_program_cases(
        vec![
            vec!["2".to_string(), "3".to_string()],
            vec!["10".to_string(), "20".to_string()],
        ],
        |inputs| json!(inputs.iter().filter_map(|s| s.parse::<i64>().ok()).sum::<i64>()),
    );
    for case in &mut cases {
        case.parser = Box::new(last_int_parser);
    }

    let mut adapter = ProgramAdapter::new(Box::new(SummingProgram));
    let score = session
        .run_cases(&mut adapter, &mut cases, RunOptions::default())
        .unwrap();
    assert_eq!(score, Some(1.0));
    assert_eq!(session.report().tests[0].title, "Testing program: summer");
}

#[test]
fn unparseable_output_is_reported_with_pattern_guidance() {
    struct Silent;

    impl CandidateUnit for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn call(&mut self, _: &str, _: &[Value], _: &mut Channel) -> Result<Value, Fault> {
            Err(Fault::new(FaultKind::NotCallable, "not a function"))
        }

        fn reset(&mut self, _io: &mut Channel) -> Result<(), Fault> {
            Ok(())
        }
    }

    let mut session = Session::new("en");
    let mut cases = vec![TestCase::program(json!(5))];
    cases[0].parser = Box::new(last_int_parser);

    let mut adapter = ProgramAdapter::new(Box::new(Silent));
    let score = session
        .run_cases(&mut adapter, &mut cases, RunOptions::default())
        .unwrap();
    assert_eq!(score, Some(0.0));
    assert_eq!(cases[0].correct, Some(false));

    let output = &session.report().tests[0].runs[0].output;
    assert!(output
        .iter()
        .any(|m| m.flag == Flag::Incorrect && m.msg.contains("no number found")));
    assert!(output
        .iter()
        .any(|m| m.flag == Flag::Info && m.msg.contains("format")));
}

/// Loader whose units expose a fixed namespace after "executing" source.
struct NamespaceLoader;

struct NamespaceUnit {
    name: String,
    vars: IndexMap<String, Value>,
}

impl CandidateUnit for NamespaceUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&mut self, _: &str, _: &[Value], _: &mut Channel) -> Result<Value, Fault> {
        Err(Fault::new(FaultKind::NotCallable, "not a function"))
    }

    fn reset(&mut self, _io: &mut Channel) -> Result<(), Fault> {
        Ok(())
    }

    fn namespace(&self) -> IndexMap<String, Value> {
        self.vars.clone()
    }
}

impl UnitLoader for NamespaceLoader {
    fn load(&self, name: &str, _io: &mut Channel) -> Result<Box<dyn CandidateUnit>, Fault> {
        Ok(Box::new(NamespaceUnit {
            name: name.to_string(),
            vars: IndexMap::new(),
        }))
    }

    fn load_source(
        &self,
        name: &str,
        source: &str,
        _io: &mut Channel,
    ) -> Result<Box<dyn CandidateUnit>, Fault> {
        // pretend-execution: every `name = int` line defines a variable
        let mut vars = IndexMap::new();
        for line in source.lines() {
            if let Some((var, value)) = line.split_once('=') {
                if let Ok(n) = value.trim().parse::<i64>() {
                    vars.insert(var.trim().to_string(), json!(n));
                }
            }
        }
        Ok(Box::new(NamespaceUnit {
            name: name.to_string(),
            vars,
        }))
    }
}

#[test]
fn snippet_namespace_is_validated_against_the_reference() {
    let mut session = Session::new("en");
    let mut adapter = SnippetAdapter::new(Box::new(NamespaceLoader), "snippet", "total = 10")
        .with_constructor(|source| format!("base = 2\n{source}\n"));
    let mut cases = vec![TestCase::new(json!({"total": 10, "base": 2}))
        .with_comparator(NamespaceComparator)
        .with_presenters(PresenterSet {
            result: Box::new(VarsPresenter),
            ..PresenterSet::default()
        })];

    let score = session
        .run_cases(&mut adapter, &mut cases, RunOptions::default())
        .unwrap();
    assert_eq!(score, Some(1.0));

    let output = &session.report().tests[0].runs[0].output;
    assert!(output
        .iter()
        .any(|m| m.flag == Flag::Info && m.msg.contains("evaluated as part")));
}

#[test]
fn units_load_from_source_files() {
    use std::fs;
    use tempfile::tempdir;

    /// Loads `{name}.py` from a directory, interpreting assignment lines.
    struct DirLoader {
        dir: std::path::PathBuf,
    }

    impl UnitLoader for DirLoader {
        fn load(&self, name: &str, io: &mut Channel) -> Result<Box<dyn CandidateUnit>, Fault> {
            let path = self.dir.join(format!("{name}.py"));
            let source = fs::read_to_string(&path)
                .map_err(|e| Fault::new(FaultKind::Io, e.to_string()))?;
            self.load_source(name, &source, io)
        }

        fn load_source(
            &self,
            name: &str,
            source: &str,
            io: &mut Channel,
        ) -> Result<Box<dyn CandidateUnit>, Fault> {
            NamespaceLoader.load_source(name, source, io)
        }
    }

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("solution.py"), "answer = 42\n").unwrap();

    let mut session = Session::new("en");
    let loader = DirLoader {
        dir: dir.path().to_path_buf(),
    };
    let unit = session
        .load_unit(&loader, "solution.py", LoadOptions::default())
        .unwrap()
        .expect("unit should load");
    assert_eq!(unit.name(), "solution");
    assert_eq!(unit.namespace().get("answer"), Some(&json!(42)));

    // a file that is not there is a load fault, reported and section-fatal
    let missing = session
        .load_unit(&loader, "other.py", LoadOptions::default())
        .unwrap();
    assert!(missing.is_none());
    let output = &session.report().tests[1].runs[0].output;
    assert_eq!(output[0].flag, Flag::Error);
}

#[test]
fn load_stage_reports_disallowed_output() {
    struct ChattyLoader;

    impl UnitLoader for ChattyLoader {
        fn load(&self, name: &str, io: &mut Channel) -> Result<Box<dyn CandidateUnit>, Fault> {
            io.write_line("hello from import time")
                .map_err(|e| Fault::new(FaultKind::Io, e.to_string()))?;
            Ok(Box::new(NamespaceUnit {
                name: name.to_string(),
                vars: IndexMap::new(),
            }))
        }

        fn load_source(
            &self,
            _name: &str,
            _source: &str,
            _io: &mut Channel,
        ) -> Result<Box<dyn CandidateUnit>, Fault> {
            unimplemented!()
        }
    }

    let mut session = Session::new("en");
    let opts = LoadOptions {
        allow_output: false,
        ..LoadOptions::default()
    };
    let unit = session
        .load_unit(&ChattyLoader, "solution.py", opts)
        .unwrap();
    // the unit is still usable, the output is just flagged
    assert!(unit.is_some());
    let output = &session.report().tests[0].runs[0].output;
    assert!(output
        .iter()
        .any(|m| m.flag == Flag::Error && m.msg.contains("hello from import time")));
}
