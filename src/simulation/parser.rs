//! Progress extraction from simulator stdout.
//!
//! The simulator reports progress as free-form text. Two formats exist:
//!
//! - the percentage protocol, where a line carries a bare `<digits>%` token;
//! - the legacy round/step protocol, with `Round <n>/<total>:` headers
//!   followed by indented `  step <n>/<total>` lines (1-based counters).
//!
//! A run picks one protocol; both parsers implement [`ProgressParser`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%").expect("valid percent regex"));

static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {2,}step\s+(\d+)/\d+").expect("valid step regex"));

static ROUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Round (\d+)/\d+:").expect("valid round regex"));

/// A single progress value reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    /// Completion percentage, as printed (not clamped).
    Percent { value: u32 },
    /// Zero-based round and step counters. A counter is `None` when no
    /// matching line has been seen yet.
    RoundStep {
        round: Option<u32>,
        step: Option<u32>,
    },
}

impl Progress {
    /// Completion as a fraction in `0.0..=1.0`, when it can be derived.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Percent { value } => Some(f64::from((*value).min(100)) / 100.0),
            Self::RoundStep { .. } => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent { value } => write!(f, "{value}%"),
            Self::RoundStep { round, step } => {
                let show = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
                write!(f, "round {} step {}", show(*round), show(*step))
            }
        }
    }
}

/// Which progress format the external simulator speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressProtocol {
    #[default]
    Percent,
    RoundStep,
}

impl ProgressProtocol {
    /// Create a fresh parser for this protocol.
    #[must_use]
    pub fn parser(self) -> Box<dyn ProgressParser> {
        match self {
            Self::Percent => Box::new(PercentParser::new()),
            Self::RoundStep => Box::new(RoundStepParser::new()),
        }
    }
}

/// Incremental parser turning output text into deduplicated progress changes.
pub trait ProgressParser: Send {
    /// Feed newly read text. Returns the progress changes it produced, in
    /// order. A value equal to the last reported one is never returned.
    fn feed(&mut self, chunk: &str) -> Vec<Progress>;

    /// Signal end of output so any held-back text is processed.
    fn finish(&mut self) -> Vec<Progress>;

    /// The last reported progress, if any.
    fn current(&self) -> Option<Progress>;
}

fn is_separator(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Percentage protocol parser.
///
/// Processes complete lines only. The unterminated tail of the stream is
/// kept until a separator arrives or [`ProgressParser::finish`] is called.
#[derive(Debug, Default)]
pub struct PercentParser {
    partial: String,
    current: Option<u32>,
}

impl PercentParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the percentage from one line. The last token wins when a
    /// line holds several.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<u32> {
        PERCENT_RE
            .captures_iter(line)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .last()
    }

    fn accept(&mut self, line: &str, out: &mut Vec<Progress>) {
        let Some(value) = Self::parse_line(line) else {
            return;
        };
        if self.current != Some(value) {
            self.current = Some(value);
            out.push(Progress::Percent { value });
        }
    }
}

impl ProgressParser for PercentParser {
    fn feed(&mut self, chunk: &str) -> Vec<Progress> {
        let mut out = Vec::new();
        self.partial.push_str(chunk);

        let Some(last_sep) = self.partial.rfind(is_separator) else {
            return out;
        };
        let tail = self.partial.split_off(last_sep + 1);
        let complete = std::mem::replace(&mut self.partial, tail);

        for line in complete.split(is_separator).filter(|l| !l.is_empty()) {
            self.accept(line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<Progress> {
        let mut out = Vec::new();
        let line = std::mem::take(&mut self.partial);
        self.accept(&line, &mut out);
        out
    }

    fn current(&self) -> Option<Progress> {
        self.current.map(|value| Progress::Percent { value })
    }
}

/// Longest unterminated line kept between reads. Progress lines are short
/// and matched from their start, so anything past this is dropped.
pub const MAX_LINE_LEN: usize = 4 * 1024;

/// Round/step position derived from the transcript seen so far.
///
/// Holds the latest step line, the nearest round header above it, and the
/// most recent header overall so later steps can be attributed to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStepScan {
    /// One-based round counter as printed.
    pub round: Option<u32>,
    /// One-based step counter as printed.
    pub step: Option<u32>,
    header: Option<u32>,
}

impl RoundStepScan {
    /// Account for one line of output.
    pub fn observe(&mut self, line: &str) {
        if let Some(caps) = ROUND_RE.captures(line) {
            self.header = caps[1].parse().ok();
        } else if let Some(caps) = STEP_RE.captures(line) {
            if let Ok(step) = caps[1].parse() {
                self.step = Some(step);
                self.round = self.header;
            }
        }
    }
}

/// Find the latest step line, then the nearest round line above it.
#[must_use]
pub fn scan_round_step(text: &str) -> RoundStepScan {
    let mut scan = RoundStepScan::default();
    for line in text.split(is_separator) {
        scan.observe(line);
    }
    scan
}

/// Legacy round/step protocol parser.
///
/// Complete lines are folded into a [`RoundStepScan`] and discarded, so a
/// round header and its steps may arrive in different reads while only the
/// unterminated tail is retained. That tail is also considered, which lets
/// a step line be reported before its separator arrives.
#[derive(Debug, Default)]
pub struct RoundStepParser {
    partial: String,
    scan: RoundStepScan,
    round: Option<u32>,
    step: Option<u32>,
}

impl RoundStepParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently retained between reads.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.partial.len()
    }

    fn cap_partial(&mut self) {
        if self.partial.len() <= MAX_LINE_LEN {
            return;
        }
        let mut end = MAX_LINE_LEN;
        while !self.partial.is_char_boundary(end) {
            end -= 1;
        }
        self.partial.truncate(end);
    }

    fn report(&mut self) -> Vec<Progress> {
        let mut view = self.scan;
        view.observe(&self.partial);

        // Printed counters are 1-based.
        let round = view.round.map(|r| r.saturating_sub(1));
        let step = view.step.map(|s| s.saturating_sub(1));
        if round == self.round && step == self.step {
            return Vec::new();
        }
        self.round = round;
        self.step = step;
        vec![Progress::RoundStep { round, step }]
    }
}

impl ProgressParser for RoundStepParser {
    fn feed(&mut self, chunk: &str) -> Vec<Progress> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.partial.push_str(chunk);

        if let Some(last_sep) = self.partial.rfind(is_separator) {
            let tail = self.partial.split_off(last_sep + 1);
            let complete = std::mem::replace(&mut self.partial, tail);
            for line in complete.split(is_separator) {
                self.scan.observe(line);
            }
        }
        self.cap_partial();
        self.report()
    }

    fn finish(&mut self) -> Vec<Progress> {
        let line = std::mem::take(&mut self.partial);
        self.scan.observe(&line);
        self.report()
    }

    fn current(&self) -> Option<Progress> {
        if self.round.is_none() && self.step.is_none() {
            return None;
        }
        Some(Progress::RoundStep {
            round: self.round,
            step: self.step,
        })
    }
}
