use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Session;
use crate::error::{CatalogError, Mismatch};
use crate::messages::{arg, Category, Flag, OverrideLayer};

/// Finding categories of the external linter, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintCategory {
    Convention,
    Refactor,
    Warning,
    Error,
    Fatal,
}

/// One finding reported by the external linter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintFinding {
    pub category: LintCategory,
    pub message: String,
    pub file: String,
    pub line: u32,
}

/// Aggregate linter statistics: the overall score and per-category counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintSummary {
    pub score: f64,
    pub convention: u32,
    pub refactor: u32,
    pub warning: u32,
    pub error: u32,
    pub fatal: u32,
}

/// Scoring policy over the linter's aggregate statistics. A mismatch means
/// the submission failed the review; its key selects the failure message.
pub trait LintGrader {
    fn grade(&self, summary: &LintSummary) -> Result<f64, Mismatch>;
}

/// Stock policy: full grade when the linter score reaches the threshold.
pub struct ThresholdGrader {
    pub threshold: f64,
}

impl Default for ThresholdGrader {
    fn default() -> Self {
        Self { threshold: 9.0 }
    }
}

impl LintGrader for ThresholdGrader {
    fn grade(&self, summary: &LintSummary) -> Result<f64, Mismatch> {
        if summary.score >= self.threshold {
            Ok(1.0)
        } else {
            Err(Mismatch::key("LintFailLowScore"))
        }
    }
}

/// Options for a lint review section.
pub struct LintOptions {
    pub overrides: Vec<OverrideLayer>,
    /// Report a failed grading as informational instead of incorrect.
    pub info_only: bool,
    pub grader: Box<dyn LintGrader>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            overrides: Vec::new(),
            info_only: true,
            grader: Box::new(ThresholdGrader::default()),
        }
    }
}

/// Assertion-style probe over candidate source text, for reviews that never
/// execute the code.
pub trait SourceProber {
    /// Catalog key used when a returned mismatch does not set one.
    fn name(&self) -> &str;
    fn probe(&self, source: &str, doc: &str) -> Result<(), Mismatch>;
}

/// Options for a source review section.
pub struct StaticOptions {
    pub overrides: Vec<OverrideLayer>,
    /// Report findings as informational and exclude them from the grade.
    pub info_only: bool,
    /// Maps the failed probe count to a score.
    pub grader: Box<dyn Fn(usize) -> f64>,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            overrides: Vec::new(),
            info_only: false,
            grader: Box::new(|failed| if failed == 0 { 1.0 } else { 0.0 }),
        }
    }
}

impl Session {
    /// Reviews the findings of the external linter in one test section:
    /// grades the aggregate score, then relays each finding with its
    /// category's flag.
    pub fn lint_review(
        &mut self,
        summary: &LintSummary,
        findings: &[LintFinding],
        opts: LintOptions,
    ) -> Result<f64, CatalogError> {
        let msgs = self.catalog(Category::Lint, opts.overrides)?;

        let title = msgs.resolve("LintReview", None)?.format(&[]);
        self.report_mut().new_test(title);
        self.report_mut().new_run();
        debug!(score = summary.score, findings = findings.len(), "lint review");

        let score_shown = format!("{:.2}", summary.score);
        let score = match opts.grader.grade(summary) {
            Ok(score) => {
                let entry = msgs.resolve("LintSuccess", None)?;
                self.report_mut()
                    .push_entry(&entry, Flag::Correct, &[arg("score", &score_shown)]);
                score
            }
            Err(found) => {
                let key = found.key.as_deref().unwrap_or("LintFailMessage");
                let entry = msgs.resolve(key, Some("LintFailMessage"))?;
                let flag = if opts.info_only {
                    Flag::Info
                } else {
                    Flag::Incorrect
                };
                self.report_mut()
                    .push_entry(&entry, flag, &[arg("score", &score_shown)]);
                0.0
            }
        };

        let entry = msgs.resolve("LintMessagesBegin", None)?;
        self.report_mut().push_entry(&entry, Flag::Info, &[]);

        for finding in findings {
            let (key, flag) = match finding.category {
                LintCategory::Convention => ("LintConvention", Flag::LintConvention),
                LintCategory::Refactor => ("LintRefactor", Flag::LintRefactor),
                LintCategory::Warning => ("LintWarning", Flag::LintWarning),
                LintCategory::Error => ("LintError", Flag::LintFatal),
                LintCategory::Fatal => ("LintFatal", Flag::Error),
            };
            let entry = msgs.resolve(key, None)?;
            let line = finding.line.to_string();
            self.report_mut().push_entry(
                &entry,
                flag,
                &[
                    arg("message", &finding.message),
                    arg("file", &finding.file),
                    arg("line", &line),
                ],
            );
        }

        Ok(score)
    }

    /// Reviews candidate source text without executing it: runs each probe
    /// and grades by the number of failures. With `info_only` the findings
    /// are shown but nothing fails.
    pub fn static_review(
        &mut self,
        target: &str,
        source: &str,
        doc: &str,
        probers: &[Box<dyn SourceProber>],
        opts: StaticOptions,
    ) -> Result<f64, CatalogError> {
        let msgs = self.catalog(Category::Static, opts.overrides)?;

        let title = msgs
            .resolve("StaticReview", None)?
            .format(&[arg("name", &target)]);
        self.report_mut().new_test(title);
        self.report_mut().new_run();

        let mut failed = 0;
        for prober in probers {
            if let Err(found) = prober.probe(source, doc) {
                let key = found.key.as_deref().unwrap_or(prober.name());
                let entry = msgs.resolve(key, Some(prober.name()))?;
                if opts.info_only {
                    self.report_mut().push_entry(&entry, Flag::Info, &[]);
                } else {
                    self.report_mut().push_entry(&entry, Flag::Error, &[]);
                    failed += 1;
                }
            }
        }

        if failed == 0 {
            let entry = msgs.resolve("CorrectResult", None)?;
            self.report_mut().push_entry(&entry, Flag::Correct, &[]);
        }

        Ok((opts.grader)(failed))
    }
}
