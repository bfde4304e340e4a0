use serde_json::Value;

use crate::case::TestCase;
use crate::error::{Mismatch, ParseError};

/// Everything a secondary diagnostic can inspect about a finished case.
pub struct ProbeContext<'a> {
    pub result: &'a Value,
    pub parsed: &'a Value,
    pub output: &'a str,
    pub reference: &'a Value,
    pub args: &'a [Value],
    pub inputs: &'a [String],
}

/// Comparison logic for one test case. Implementations signal a mismatch
/// by returning [`Mismatch`]; its key (when set) selects the catalog
/// message shown to the learner, falling back to `IncorrectResult`.
pub trait Comparator {
    fn compare(&self, reference: &Value, result: &Value, parsed: &Value) -> Result<(), Mismatch>;
}

impl<F> Comparator for F
where
    F: Fn(&Value, &Value, &Value) -> Result<(), Mismatch>,
{
    fn compare(&self, reference: &Value, result: &Value, parsed: &Value) -> Result<(), Mismatch> {
        self(reference, result, parsed)
    }
}

/// Loose equality used by the stock comparators: top-level strings are
/// trimmed, numbers compare numerically across integer/float forms, and
/// sequences compare element by element in order. Nested strings are left
/// untouched.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim() == y.trim(),
        _ => inner_eq(a, b),
    }
}

fn inner_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| inner_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| inner_eq(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Python-style truthiness over JSON values, used by the recurrence check.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Default comparator: the candidate's raw result must loosely equal the
/// reference. Suits functions returning simple values or sequences of
/// them.
pub struct ValueComparator;

impl Comparator for ValueComparator {
    fn compare(&self, reference: &Value, result: &Value, _parsed: &Value) -> Result<(), Mismatch> {
        if loose_eq(reference, result) {
            Ok(())
        } else {
            Err(Mismatch::new())
        }
    }
}

/// Default comparator for program tests: the value parsed from the
/// candidate's output must loosely equal the reference.
pub struct ParsedComparator;

impl Comparator for ParsedComparator {
    fn compare(&self, reference: &Value, _result: &Value, parsed: &Value) -> Result<(), Mismatch> {
        if loose_eq(reference, parsed) {
            Ok(())
        } else {
            Err(Mismatch::new())
        }
    }
}

/// Compares floating point results rounded to a fixed number of decimals,
/// absorbing precision differences between implementations.
pub struct RoundingComparator {
    pub decimals: u32,
}

impl Default for RoundingComparator {
    fn default() -> Self {
        Self { decimals: 2 }
    }
}

impl Comparator for RoundingComparator {
    fn compare(&self, reference: &Value, result: &Value, _parsed: &Value) -> Result<(), Mismatch> {
        let scale = 10f64.powi(self.decimals as i32);
        match (reference.as_f64(), result.as_f64()) {
            (Some(r), Some(s)) if (r * scale).round() == (s * scale).round() => Ok(()),
            _ => Err(Mismatch::new()),
        }
    }
}

/// Default comparator for snippet tests: every variable of the reference
/// namespace must exist in the candidate namespace with an equal value.
pub struct NamespaceComparator;

impl Comparator for NamespaceComparator {
    fn compare(&self, reference: &Value, result: &Value, _parsed: &Value) -> Result<(), Mismatch> {
        let (Value::Object(expected), Value::Object(found)) = (reference, result) else {
            return Err(Mismatch::new());
        };
        for (name, value) in expected {
            if name.starts_with('_') {
                continue;
            }
            let candidate = found
                .get(name)
                .ok_or_else(|| Mismatch::key("fail_missing_variable"))?;
            if !loose_eq(value, candidate) {
                return Err(Mismatch::key("fail_variable_value"));
            }
        }
        Ok(())
    }
}

/// Formats one internal value for the report.
pub trait Presenter {
    fn present(&self, value: &Value) -> String;
}

impl<F> Presenter for F
where
    F: Fn(&Value) -> String,
{
    fn present(&self, value: &Value) -> String {
        self(value)
    }
}

/// Renders the way a candidate entry point was called.
pub trait CallPresenter {
    fn present_call(&self, target: &str, args: &[Value]) -> String;
}

fn repr(value: &Value) -> String {
    value.to_string()
}

/// Default presenter for argument, reference, result and parsed values.
/// Sequences are shown item by item, mappings one pair per line, scalars
/// in their literal form so `"5"` and `5` stay distinguishable.
pub struct ValuePresenter;

impl Presenter for ValuePresenter {
    fn present(&self, value: &Value) -> String {
        match value {
            Value::Array(items) => items.iter().map(repr).collect::<Vec<_>>().join(" "),
            Value::Object(map) => {
                let body = map
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, repr(v)))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("\n{body}")
            }
            other => repr(other),
        }
    }
}

/// Default presenter for input vectors: the scripted lines verbatim inside
/// a preformatted block.
pub struct InputPresenter;

impl Presenter for InputPresenter {
    fn present(&self, value: &Value) -> String {
        let lines = match value {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{{{{{{\n{lines}\n}}}}}}")
    }
}

/// Presenter for candidate namespaces in snippet tests: one
/// `name = value` line per visible variable. Plug in as the result
/// presenter when the value under test is a namespace.
pub struct VarsPresenter;

impl Presenter for VarsPresenter {
    fn present(&self, value: &Value) -> String {
        let Value::Object(map) = value else {
            return repr(value);
        };
        let mut names: Vec<&String> = map.keys().filter(|n| !n.starts_with('_')).collect();
        names.sort();
        let body = names
            .into_iter()
            .map(|name| format!("{name} = {}", repr(&map[name])))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{{{{{{\n{body}\n}}}}}}")
    }
}

/// Default call presenter: a rendered call line, split over multiple lines
/// when it would run long.
pub struct DefaultCallPresenter;

impl CallPresenter for DefaultCallPresenter {
    fn present_call(&self, target: &str, args: &[Value]) -> String {
        let rendered: Vec<String> = args.iter().map(repr).collect();
        let one_line = format!("{target}({})", rendered.join(", "));
        let call = if one_line.len() > 80 {
            format!("{target}(\n    {}\n)", rendered.join(",\n    "))
        } else {
            one_line
        };
        format!("{{{{{{\n{call}\n}}}}}}")
    }
}

/// Formatting functions for each semantic category shown in the report.
pub struct PresenterSet {
    pub arg: Box<dyn Presenter>,
    pub input: Box<dyn Presenter>,
    pub reference: Box<dyn Presenter>,
    pub result: Box<dyn Presenter>,
    pub parsed: Box<dyn Presenter>,
    pub call: Box<dyn CallPresenter>,
}

impl Default for PresenterSet {
    fn default() -> Self {
        Self {
            arg: Box::new(ValuePresenter),
            input: Box::new(InputPresenter),
            reference: Box::new(ValuePresenter),
            result: Box::new(ValuePresenter),
            parsed: Box::new(ValuePresenter),
            call: Box::new(DefaultCallPresenter),
        }
    }
}

/// Custom diagnostic probe, run only after a failed validation. A probe
/// that returns a mismatch has its message shown; `name` supplies the
/// catalog key when the mismatch does not set one.
pub trait Prober {
    fn name(&self) -> &str;
    fn probe(&self, cx: &ProbeContext<'_>) -> Result<(), Mismatch>;
}

/// Informational probe, run last in the escalation ladder. Returning
/// `None` means there is no additional information to show.
pub trait Informer {
    fn name(&self) -> &str;
    fn info(&self, cx: &ProbeContext<'_>) -> Option<String>;
}

/// Validates the unparsed output text, independently of the result
/// comparison (required prompts and the like).
pub trait OutputValidator {
    fn validate(&self, output: &str, args: &[Value], inputs: &[String]) -> Result<(), Mismatch>;
}

impl<F> OutputValidator for F
where
    F: Fn(&str, &[Value], &[String]) -> Result<(), Mismatch>,
{
    fn validate(&self, output: &str, args: &[Value], inputs: &[String]) -> Result<(), Mismatch> {
        self(output, args, inputs)
    }
}

/// Transforms raw captured text into a structured value before
/// validation.
pub trait OutputParser {
    fn parse(&self, raw: &str) -> Result<Value, ParseError>;
}

impl<F> OutputParser for F
where
    F: Fn(&str) -> Result<Value, ParseError>,
{
    fn parse(&self, raw: &str) -> Result<Value, ParseError> {
        self(raw)
    }
}

/// Stock parser for tests that do not evaluate output: passes the raw
/// text through unchanged.
pub struct IdentityParser;

impl OutputParser for IdentityParser {
    fn parse(&self, raw: &str) -> Result<Value, ParseError> {
        Ok(Value::String(raw.to_string()))
    }
}

/// Reduces the finished test cases to a numeric score.
pub trait Grader {
    fn grade(&self, cases: &[TestCase]) -> f64;
}

/// Stock policy: 1 if every case is correct, else 0.
pub struct PassFailGrader;

impl Grader for PassFailGrader {
    fn grade(&self, cases: &[TestCase]) -> f64 {
        if cases.iter().all(|c| c.correct == Some(true)) {
            1.0
        } else {
            0.0
        }
    }
}

/// Stock policy: pass/fail on results, plus a bonus point when every
/// output validation also passed.
pub struct OutputBonusGrader;

impl Grader for OutputBonusGrader {
    fn grade(&self, cases: &[TestCase]) -> f64 {
        if !cases.iter().all(|c| c.correct == Some(true)) {
            return 0.0;
        }
        if cases.iter().all(|c| c.output_correct == Some(true)) {
            2.0
        } else {
            1.0
        }
    }
}

/// Sums the weights of the correct cases.
pub struct WeightedGrader;

impl Grader for WeightedGrader {
    fn grade(&self, cases: &[TestCase]) -> f64 {
        cases
            .iter()
            .filter(|c| c.correct == Some(true))
            .map(|c| c.weight)
            .sum()
    }
}
