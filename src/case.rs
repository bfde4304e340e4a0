use serde_json::Value;

use crate::callbacks::{
    Comparator, IdentityParser, Informer, OutputParser, OutputValidator, ParsedComparator,
    PresenterSet, Prober, ValueComparator,
};

/// Recomputes a (usually deliberately wrong) reference outcome for a
/// case's arguments and inputs.
pub type RefFn = dyn Fn(&[Value], &[String]) -> Value;

/// One self-contained comparison: inputs, the precomputed reference
/// outcome, comparison logic and the secondary diagnostic hooks run when
/// the comparison fails. Identity is the case's position in the test
/// vector; the engine mutates `correct`/`output_correct` exactly once per
/// run.
pub struct TestCase {
    pub args: Vec<Value>,
    pub inputs: Vec<String>,
    pub weight: f64,
    pub tag: String,
    pub ref_result: Value,
    pub comparator: Box<dyn Comparator>,
    pub output_validator: Option<Box<dyn OutputValidator>>,
    /// Known-wrong references with the message key emitted when the
    /// candidate's result matches one of them.
    pub wrong_refs: Vec<(Box<RefFn>, String)>,
    pub probers: Vec<Box<dyn Prober>>,
    pub informers: Vec<Box<dyn Informer>>,
    pub parser: Box<dyn OutputParser>,
    pub presenters: PresenterSet,
    /// Tri-state: `None` until the case has run.
    pub correct: Option<bool>,
    pub output_correct: Option<bool>,
}

impl TestCase {
    /// A function-test case: the raw result is compared to `ref_result`.
    pub fn new(ref_result: Value) -> Self {
        Self {
            args: Vec::new(),
            inputs: Vec::new(),
            weight: 1.0,
            tag: String::new(),
            ref_result,
            comparator: Box::new(ValueComparator),
            output_validator: None,
            wrong_refs: Vec::new(),
            probers: Vec::new(),
            informers: Vec::new(),
            parser: Box::new(IdentityParser),
            presenters: PresenterSet::default(),
            correct: None,
            output_correct: None,
        }
    }

    /// A program-test case: the parsed output is compared to `ref_result`.
    pub fn program(ref_result: Value) -> Self {
        let mut case = Self::new(ref_result);
        case.comparator = Box::new(ParsedComparator);
        case
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_comparator<C: Comparator + 'static>(mut self, comparator: C) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn with_output_validator<V: OutputValidator + 'static>(mut self, validator: V) -> Self {
        self.output_validator = Some(Box::new(validator));
        self
    }

    pub fn with_wrong_ref<F>(mut self, wrong_ref: F, msg_key: impl Into<String>) -> Self
    where
        F: Fn(&[Value], &[String]) -> Value + 'static,
    {
        self.wrong_refs.push((Box::new(wrong_ref), msg_key.into()));
        self
    }

    pub fn with_prober<P: Prober + 'static>(mut self, prober: P) -> Self {
        self.probers.push(Box::new(prober));
        self
    }

    pub fn with_informer<I: Informer + 'static>(mut self, informer: I) -> Self {
        self.informers.push(Box::new(informer));
        self
    }

    pub fn with_parser<P: OutputParser + 'static>(mut self, parser: P) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_presenters(mut self, presenters: PresenterSet) -> Self {
        self.presenters = presenters;
        self
    }

    /// Builds function-test cases from argument vectors, computing every
    /// reference outcome up front. References must be in place before any
    /// candidate code runs so a candidate's side effects cannot corrupt
    /// later comparisons.
    pub fn build_cases<F>(vectors: Vec<Vec<Value>>, inputs: Vec<Vec<String>>, ref_fn: F) -> Vec<Self>
    where
        F: Fn(&[Value], &[String]) -> Value,
    {
        vectors
            .into_iter()
            .enumerate()
            .map(|(i, args)| {
                let case_inputs = inputs.get(i).cloned().unwrap_or_default();
                let ref_result = ref_fn(&args, &case_inputs);
                Self::new(ref_result)
                    .with_args(args)
                    .with_inputs(case_inputs)
            })
            .collect()
    }

    /// Builds program-test cases from input vectors, references computed
    /// up front as with [`TestCase::build_cases`].
    pub fn build_program_cases<F>(input_vectors: Vec<Vec<String>>, ref_fn: F) -> Vec<Self>
    where
        F: Fn(&[String]) -> Value,
    {
        input_vectors
            .into_iter()
            .map(|inputs| {
                let ref_result = ref_fn(&inputs);
                Self::program(ref_result).with_inputs(inputs)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn references_are_computed_before_any_candidate_runs() {
        // The reference closure reads shared state; mutating that state
        // after construction (as candidate code might) must not change
        // the stored references.
        let offset = Rc::new(Cell::new(0i64));
        let seen = Rc::clone(&offset);
        let cases = TestCase::build_cases(
            vec![vec![json!(2), json!(3)], vec![json!(5), json!(5)]],
            vec![],
            move |args, _| {
                let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
                json!(sum + seen.get())
            },
        );
        offset.set(100);
        assert_eq!(cases[0].ref_result, json!(5));
        assert_eq!(cases[1].ref_result, json!(10));
    }

    #[test]
    fn case_defaults() {
        let case = TestCase::new(json!(1));
        assert_eq!(case.weight, 1.0);
        assert_eq!(case.correct, None);
        assert_eq!(case.output_correct, None);
        assert!(case.wrong_refs.is_empty());
    }
}
