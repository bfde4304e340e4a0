use serde::{Deserialize, Serialize};

use crate::messages::{Entry, Flag};

/// One message in a run's output log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub msg: String,
    pub flag: Flag,
    pub triggers: Vec<String>,
    pub hints: Vec<String>,
}

/// One test case execution. Messages are append-only and strictly
/// ordered; the order encodes the narrative the learner reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    pub output: Vec<Message>,
}

/// One test (load, function test, lint review, ...) with its runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSection {
    pub title: String,
    pub runs: Vec<Run>,
}

/// Final verdict of the grading session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub score: f64,
    pub max: f64,
}

/// The serialized evaluation document: ordered tests, each with ordered
/// runs of ordered messages, plus the verdict. One per grading session,
/// owned and mutated only by the orchestration engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub tester: String,
    pub tests: Vec<TestSection>,
    pub result: Verdict,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tester(&mut self, name: impl Into<String>) {
        self.tester = name.into();
    }

    pub fn set_max_score(&mut self, max: f64) {
        self.result.max = max;
    }

    pub fn update_result(&mut self, correct: bool, score: f64) {
        self.result.correct = correct;
        self.result.score = score;
    }

    /// Opens a new test section. The previous section is closed and can
    /// never be reopened or reordered.
    pub fn new_test(&mut self, title: impl Into<String>) {
        self.tests.push(TestSection {
            title: title.into(),
            runs: Vec::new(),
        });
    }

    /// Opens a new run within the current test section.
    pub fn new_run(&mut self) {
        self.current_test().runs.push(Run::default());
    }

    /// Appends a formatted catalog entry to the current run. Entries with
    /// an empty body are suppressed, which is how a catalog override can
    /// silence a stock message.
    pub fn push_entry(&mut self, entry: &Entry, flag: Flag, args: &[(&str, String)]) {
        if entry.content.is_empty() {
            return;
        }
        self.push(Message {
            msg: entry.format(args),
            flag,
            triggers: entry.triggers.clone(),
            hints: entry.hints.clone(),
        });
    }

    pub fn push(&mut self, message: Message) {
        self.current_run().output.push(message);
    }

    fn current_test(&mut self) -> &mut TestSection {
        if self.tests.is_empty() {
            self.tests.push(TestSection {
                title: String::new(),
                runs: Vec::new(),
            });
        }
        self.tests.last_mut().expect("section just ensured")
    }

    fn current_run(&mut self) -> &mut Run {
        let section = self.current_test();
        if section.runs.is_empty() {
            section.runs.push(Run::default());
        }
        section.runs.last_mut().expect("run just ensured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_expected_schema() {
        let mut report = Report::new();
        report.set_tester("checker");
        report.set_max_score(1.0);
        report.new_test("Testing function: add");
        report.new_run();
        report.push_entry(&Entry::text("The result was correct."), Flag::Correct, &[]);
        report.update_result(true, 1.0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tester"], "checker");
        assert_eq!(json["tests"][0]["title"], "Testing function: add");
        assert_eq!(
            json["tests"][0]["runs"][0]["output"][0]["msg"],
            "The result was correct."
        );
        assert_eq!(json["tests"][0]["runs"][0]["output"][0]["flag"], 1);
        assert_eq!(json["result"]["correct"], true);
        assert_eq!(json["result"]["score"], 1.0);
        assert_eq!(json["result"]["max"], 1.0);
    }

    #[test]
    fn empty_entries_are_suppressed() {
        let mut report = Report::new();
        report.new_test("t");
        report.new_run();
        report.push_entry(&Entry::text(""), Flag::Info, &[]);
        assert!(report.tests[0].runs[0].output.is_empty());
    }
}
