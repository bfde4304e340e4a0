use serde_json::{json, Value};
use tracing::debug;

use crate::adapter::ExecutionAdapter;
use crate::callbacks::{is_truthy, Grader, InputPresenter, PassFailGrader, Presenter, ProbeContext};
use crate::case::TestCase;
use crate::channel::Channel;
use crate::error::{CatalogError, FaultKind};
use crate::messages::{arg, detect_locale, Catalog, Category, Flag, OverrideLayer};
use crate::report::Report;
use crate::unit::{validate_unit_name, CandidateUnit, NameError, UnitLoader};

/// Options for loading a candidate unit.
pub struct LoadOptions {
    /// Scripted stdin for the unit's top-level execution.
    pub inputs: Vec<String>,
    /// Custom message layers over the import catalog.
    pub overrides: Vec<OverrideLayer>,
    /// Hide the unit's load-time output from the report.
    pub hide_output: bool,
    /// Whether load-time output is acceptable at all.
    pub allow_output: bool,
    /// Required source file extension.
    pub extension: String,
    /// Names reserved by the execution environment.
    pub reserved: Vec<String>,
    /// Presenter for the input vector in load failure messages.
    pub presenter: Box<dyn Presenter>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            overrides: Vec::new(),
            hide_output: true,
            allow_output: true,
            extension: "py".to_string(),
            reserved: Vec::new(),
            presenter: Box::new(InputPresenter),
        }
    }
}

/// Options for one test section.
pub struct RunOptions {
    /// Custom message layers over the section's catalog.
    pub overrides: Vec<OverrideLayer>,
    /// Hide candidate output from the report on successful parses.
    pub hide_output: bool,
    /// Check failed cases against the previous case's outcome.
    pub test_recurrence: bool,
    /// Scoring policy applied once every case has run.
    pub grader: Box<dyn Grader>,
    /// Hook called before each case, for resetting checker-side state.
    pub new_case: Option<Box<dyn FnMut(&[Value], &[String])>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            overrides: Vec::new(),
            hide_output: true,
            test_recurrence: true,
            grader: Box::new(PassFailGrader),
            new_case: None,
        }
    }
}

/// One grading session: owns the report being built and the capture channel
/// every piece of candidate code runs through. Sections run strictly
/// sequentially; each `load_unit`/`run_cases` call appends one test section.
pub struct Session {
    locale: String,
    report: Report,
    channel: Channel,
}

impl Session {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            report: Report::new(),
            channel: Channel::new(),
        }
    }

    /// Session with the locale detected from the environment.
    pub fn from_env() -> Self {
        Self::new(detect_locale())
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_tester(&mut self, name: impl Into<String>) {
        self.report.set_tester(name);
    }

    pub fn set_max_score(&mut self, max: f64) {
        self.report.set_max_score(max);
    }

    /// Seals the verdict.
    pub fn finish(&mut self, correct: bool, score: f64) {
        self.report.update_result(correct, score);
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub(crate) fn report_mut(&mut self) -> &mut Report {
        &mut self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    pub(crate) fn catalog(
        &self,
        category: Category,
        overrides: Vec<OverrideLayer>,
    ) -> Result<Catalog, CatalogError> {
        let mut msgs = Catalog::load(&self.locale, category)?;
        for layer in overrides {
            msgs.push_layer(layer);
        }
        Ok(msgs)
    }

    /// Loads the candidate unit through `loader`, narrating the attempt in
    /// its own test section. Name validation happens before any load; load
    /// faults are reported and end the section with `Ok(None)`.
    pub fn load_unit(
        &mut self,
        loader: &dyn UnitLoader,
        file_name: &str,
        opts: LoadOptions,
    ) -> Result<Option<Box<dyn CandidateUnit>>, CatalogError> {
        let msgs = self.catalog(Category::Import, opts.overrides)?;

        let title = msgs
            .resolve("LoadingUnit", None)?
            .format(&[arg("name", &file_name)]);
        self.report.new_test(title);
        self.report.new_run();
        debug!(file_name, "loading candidate unit");

        let name = match validate_unit_name(file_name, &opts.extension, &opts.reserved) {
            Ok(name) => name,
            Err(err) => {
                let key = match err {
                    NameError::MissingExtension(..) => "MissingFileExtension",
                    NameError::BadIdentifier(..) => "BadUnitName",
                    NameError::ReservedName(..) => "ReservedUnitName",
                };
                let entry = msgs.resolve(key, None)?;
                self.report
                    .push_entry(&entry, Flag::Error, &[arg("name", &file_name)]);
                return Ok(None);
            }
        };

        let inputs_shown = opts.presenter.present(&json!(opts.inputs));
        self.channel.clear();
        let loaded = {
            let mut io = self.channel.acquire(&opts.inputs);
            loader.load(&name, &mut io)
        };
        let captured = self.channel.contents().to_string();

        match loaded {
            Err(fault) => {
                debug!(kind = fault.kind.name(), "unit load faulted");
                let entry = msgs.resolve(fault.kind.key(), Some("GenericError"))?;
                self.report.push_entry(
                    &entry,
                    Flag::Error,
                    &[
                        arg("ename", &fault.kind.name()),
                        arg("emsg", &fault.message),
                        arg("inputs", &inputs_shown),
                    ],
                );
                if !opts.inputs.is_empty() {
                    let entry = msgs.resolve("PrintInputVector", None)?;
                    self.report
                        .push_entry(&entry, Flag::Debug, &[arg("inputs", &inputs_shown)]);
                }
                Ok(None)
            }
            Ok(unit) => {
                if !opts.allow_output && !captured.is_empty() {
                    let entry = msgs.resolve("DisallowedOutput", None)?;
                    self.report
                        .push_entry(&entry, Flag::Error, &[arg("output", &captured)]);
                } else if !opts.hide_output {
                    let entry = msgs.resolve("PrintStudentOutput", None)?;
                    self.report
                        .push_entry(&entry, Flag::Debug, &[arg("output", &captured)]);
                }
                Ok(Some(unit))
            }
        }
    }

    /// Runs every case against the adapter in one test section and returns
    /// the graded score. A not-callable target aborts the section with
    /// `Ok(None)` after reporting. Only catalog misses, which are bugs in
    /// the grading definition, escape as errors.
    pub fn run_cases(
        &mut self,
        adapter: &mut dyn ExecutionAdapter,
        cases: &mut [TestCase],
        mut opts: RunOptions,
    ) -> Result<Option<f64>, CatalogError> {
        let overrides = std::mem::take(&mut opts.overrides);
        let msgs = self.catalog(adapter.category(), overrides)?;

        let title = msgs
            .resolve(adapter.title_key(), None)?
            .format(&[arg("name", &adapter.target())]);
        self.report.new_test(title);
        debug!(name = adapter.target(), cases = cases.len(), "running test section");

        let mut prev_result: Option<Value> = None;
        let mut prev_parsed: Option<Value> = None;

        for (index, case) in cases.iter_mut().enumerate() {
            self.report.new_run();

            if let Some(hook) = opts.new_case.as_mut() {
                hook(&case.args, &case.inputs);
            }

            let args_shown = case.presenters.arg.present(&Value::Array(case.args.clone()));
            let inputs_shown = case.presenters.input.present(&json!(case.inputs));
            let call_shown = case
                .presenters
                .call
                .present_call(adapter.target(), &case.args);
            let has_inputs = !case.inputs.is_empty();

            self.channel.clear();
            let invoked = {
                let mut io = self.channel.acquire(&case.inputs);
                adapter.invoke(case, &mut io)
            };
            let raw_output = self.channel.contents().to_string();

            if index == 0 {
                if let Some(code) = adapter.constructed_code() {
                    let code = code.to_string();
                    let entry = msgs.resolve("PrintConstructedCode", None)?;
                    self.report
                        .push_entry(&entry, Flag::Info, &[arg("code", &code)]);
                }
            }

            let result = match invoked {
                Ok(value) => value,
                Err(fault) if fault.kind == FaultKind::NotCallable => {
                    let target = adapter.target().to_string();
                    let entry = msgs.resolve("NotCallable", None)?;
                    self.report
                        .push_entry(&entry, Flag::Error, &[arg("name", &target)]);
                    return Ok(None);
                }
                Err(fault) => {
                    debug!(case = index, kind = fault.kind.name(), "case faulted");
                    case.correct = Some(false);
                    let entry = msgs.resolve(fault.kind.key(), Some("GenericError"))?;
                    self.report.push_entry(
                        &entry,
                        Flag::Error,
                        &[
                            arg("ename", &fault.kind.name()),
                            arg("emsg", &fault.message),
                            arg("args", &args_shown),
                            arg("inputs", &inputs_shown),
                        ],
                    );
                    let frame = adapter
                        .unit()
                        .and_then(|u| u.source_file())
                        .and_then(|file| fault.last_frame_in(file))
                        .or_else(|| fault.frames.last());
                    let (lineno, line) = match frame {
                        Some(f) => (f.line.to_string(), f.code.clone()),
                        None => ("?".to_string(), "?".to_string()),
                    };
                    let entry = msgs.resolve("PrintFaultLine", None)?;
                    self.report.push_entry(
                        &entry,
                        Flag::Debug,
                        &[arg("lineno", &lineno), arg("line", &line)],
                    );
                    self.emit_vectors(&msgs, &args_shown, &call_shown, has_inputs.then_some(&inputs_shown))?;
                    continue;
                }
            };

            if !opts.hide_output {
                let entry = msgs.resolve("PrintStudentOutput", None)?;
                self.report
                    .push_entry(&entry, Flag::Info, &[arg("output", &raw_output)]);
            }

            let parsed = match case.parser.parse(&raw_output) {
                Ok(value) => value,
                Err(err) => {
                    case.correct = Some(false);
                    let entry = msgs.resolve("OutputParseError", None)?;
                    self.report.push_entry(
                        &entry,
                        Flag::Incorrect,
                        &[
                            arg("args", &args_shown),
                            arg("inputs", &inputs_shown),
                            arg("output", &raw_output),
                            arg("reason", &err.reason),
                        ],
                    );
                    self.emit_vectors(&msgs, &args_shown, &call_shown, has_inputs.then_some(&inputs_shown))?;
                    let entry = msgs.resolve("OutputPatternInfo", None)?;
                    self.report.push_entry(&entry, Flag::Info, &[]);
                    let entry = msgs.resolve("PrintStudentOutput", None)?;
                    self.report
                        .push_entry(&entry, Flag::Info, &[arg("output", &raw_output)]);
                    continue;
                }
            };

            let result_shown = case.presenters.result.present(&result);
            let parsed_shown = case.presenters.parsed.present(&parsed);

            match case.comparator.compare(&case.ref_result, &result, &parsed) {
                Ok(()) => {
                    case.correct = Some(true);
                    let entry = msgs.resolve("CorrectResult", None)?;
                    self.report.push_entry(&entry, Flag::Correct, &[]);
                    self.emit_vectors(&msgs, &args_shown, &call_shown, has_inputs.then_some(&inputs_shown))?;
                    let entry = msgs.resolve("PrintStudentResult", None)?;
                    self.report.push_entry(
                        &entry,
                        Flag::Debug,
                        &[
                            arg("res", &result_shown),
                            arg("parsed", &parsed_shown),
                            arg("output", &raw_output),
                        ],
                    );
                }
                Err(mismatch) => {
                    case.correct = Some(false);
                    let key = mismatch.key.as_deref().unwrap_or("IncorrectResult");
                    let entry = msgs.resolve(key, Some("IncorrectResult"))?;
                    self.report.push_entry(&entry, Flag::Incorrect, &[]);
                    self.emit_vectors(&msgs, &args_shown, &call_shown, has_inputs.then_some(&inputs_shown))?;
                    let entry = msgs.resolve("PrintStudentResult", None)?;
                    self.report.push_entry(
                        &entry,
                        Flag::Debug,
                        &[
                            arg("res", &result_shown),
                            arg("parsed", &parsed_shown),
                            arg("output", &raw_output),
                        ],
                    );
                    let ref_shown = case.presenters.reference.present(&case.ref_result);
                    let entry = msgs.resolve("PrintReference", None)?;
                    self.report
                        .push_entry(&entry, Flag::Debug, &[arg("ref", &ref_shown)]);

                    if !case.wrong_refs.is_empty()
                        || !case.probers.is_empty()
                        || opts.test_recurrence
                    {
                        let entry = msgs.resolve("AdditionalTests", None)?;
                        self.report.push_entry(&entry, Flag::Info, &[]);
                    }

                    // Every matching wrong reference is reported, not just
                    // the first.
                    for (wrong_fn, msg_key) in &case.wrong_refs {
                        let wrong = wrong_fn(&case.args, &case.inputs);
                        if case.comparator.compare(&wrong, &result, &parsed).is_ok() {
                            let entry = msgs.resolve(msg_key, None)?;
                            self.report.push_entry(&entry, Flag::Info, &[]);
                        }
                    }

                    let cx = ProbeContext {
                        result: &result,
                        parsed: &parsed,
                        output: &raw_output,
                        reference: &case.ref_result,
                        args: &case.args,
                        inputs: &case.inputs,
                    };
                    for prober in &case.probers {
                        if let Err(found) = prober.probe(&cx) {
                            let key = found.key.as_deref().unwrap_or(prober.name());
                            let entry = msgs.resolve(key, Some(prober.name()))?;
                            self.report.push_entry(&entry, Flag::Info, &[]);
                        }
                    }

                    if opts.test_recurrence
                        && (prev_result.as_ref() == Some(&result)
                            || (is_truthy(&parsed) && prev_parsed.as_ref() == Some(&parsed)))
                    {
                        let entry = msgs.resolve("RepeatingResult", None)?;
                        self.report.push_entry(&entry, Flag::Info, &[]);
                    }

                    if !case.informers.is_empty() {
                        let entry = msgs.resolve("AdditionalInfo", None)?;
                        self.report.push_entry(&entry, Flag::Info, &[]);
                        for informer in &case.informers {
                            if let Some(text) = informer.info(&cx) {
                                let entry = msgs.resolve(informer.name(), None)?;
                                self.report.push_entry(
                                    &entry,
                                    Flag::Info,
                                    &[arg("func_res", &text)],
                                );
                            }
                        }
                    }
                }
            }

            if let Some(validator) = &case.output_validator {
                match validator.validate(&raw_output, &case.args, &case.inputs) {
                    Ok(()) => {
                        case.output_correct = Some(true);
                        let entry = msgs.resolve("CorrectMessage", None)?;
                        self.report.push_entry(&entry, Flag::Correct, &[]);
                    }
                    Err(found) => {
                        case.output_correct = Some(false);
                        let key = found.key.as_deref().unwrap_or("IncorrectMessage");
                        let entry = msgs.resolve(key, Some("IncorrectMessage"))?;
                        self.report.push_entry(&entry, Flag::Incorrect, &[]);
                        let entry = msgs.resolve("MessageInfo", None)?;
                        self.report.push_entry(&entry, Flag::Info, &[]);
                        let entry = msgs.resolve("PrintStudentOutput", None)?;
                        self.report
                            .push_entry(&entry, Flag::Info, &[arg("output", &raw_output)]);
                    }
                }
            }

            // Recurrence only compares against the last fully validated case.
            prev_result = Some(result);
            prev_parsed = Some(parsed);
        }

        let score = opts.grader.grade(cases);
        debug!(name = adapter.target(), score, "test section graded");
        Ok(Some(score))
    }

    fn emit_vectors(
        &mut self,
        msgs: &Catalog,
        args: &str,
        call: &str,
        inputs: Option<&String>,
    ) -> Result<(), CatalogError> {
        let entry = msgs.resolve("PrintTestVector", None)?;
        self.report
            .push_entry(&entry, Flag::Debug, &[arg("args", &args), arg("call", &call)]);
        if let Some(inputs) = inputs {
            let entry = msgs.resolve("PrintInputVector", None)?;
            self.report
                .push_entry(&entry, Flag::Debug, &[arg("inputs", &inputs)]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FunctionAdapter;
    use crate::error::Fault;
    use serde_json::json;

    struct FixedUnit {
        results: Vec<Value>,
        next: usize,
    }

    impl CandidateUnit for FixedUnit {
        fn name(&self) -> &str {
            "fixed"
        }

        fn call(&mut self, entry: &str, _args: &[Value], _io: &mut Channel) -> Result<Value, Fault> {
            if entry == "missing" {
                return Err(Fault::new(FaultKind::NotCallable, "not a function"));
            }
            let value = self.results[self.next.min(self.results.len() - 1)].clone();
            self.next += 1;
            Ok(value)
        }

        fn reset(&mut self, _io: &mut Channel) -> Result<(), Fault> {
            Ok(())
        }
    }

    struct NoLoader;

    impl UnitLoader for NoLoader {
        fn load(&self, _name: &str, _io: &mut Channel) -> Result<Box<dyn CandidateUnit>, Fault> {
            Err(Fault::new(FaultKind::UndefinedName, "name 'foo' is not defined"))
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

    #[test]
    fn bad_file_name_ends_the_section() {
        let mut session = Session::new("en");
        let unit = session
            .load_unit(&NoLoader, "my solution.py", LoadOptions::default())
            .unwrap();
        assert!(unit.is_none());
        let report = session.report();
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.tests[0].runs[0].output.len(), 1);
        assert_eq!(report.tests[0].runs[0].output[0].flag, Flag::Error);
    }

    #[test]
    fn load_fault_is_reported_and_classified() {
        let mut session = Session::new("en");
        let unit = session
            .load_unit(&NoLoader, "solution.py", LoadOptions::default())
            .unwrap();
        assert!(unit.is_none());
        let msg = &session.report().tests[0].runs[0].output[0];
        assert_eq!(msg.flag, Flag::Error);
        assert!(msg.msg.contains("not defined"), "got: {}", msg.msg);
    }

    #[test]
    fn not_callable_aborts_the_section() {
        let mut session = Session::new("en");
        let unit = FixedUnit {
            results: vec![json!(1)],
            next: 0,
        };
        let mut adapter = FunctionAdapter::new(Box::new(unit), "missing");
        let mut cases = vec![TestCase::new(json!(1)), TestCase::new(json!(2))];
        let score = session
            .run_cases(&mut adapter, &mut cases, RunOptions::default())
            .unwrap();
        assert!(score.is_none());
        // only the first case got a run before the abort
        assert_eq!(session.report().tests[0].runs.len(), 1);
    }

    #[test]
    fn scores_come_from_the_grader() {
        let mut session = Session::new("en");
        let unit = FixedUnit {
            results: vec![json!(5), json!(9)],
            next: 0,
        };
        let mut adapter = FunctionAdapter::new(Box::new(unit), "compute");
        let mut cases = vec![
            TestCase::new(json!(5)).with_args(vec![json!(2), json!(3)]),
            TestCase::new(json!(10)).with_args(vec![json!(5), json!(5)]),
        ];
        let score = session
            .run_cases(&mut adapter, &mut cases, RunOptions::default())
            .unwrap();
        assert_eq!(score, Some(0.0));
        assert_eq!(cases[0].correct, Some(true));
        assert_eq!(cases[1].correct, Some(false));
    }
}
