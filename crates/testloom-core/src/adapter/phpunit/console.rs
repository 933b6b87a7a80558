//! Console output heuristics, used when no JUnit report is available.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::TestStatus;

/// Counters read from the closing summary lines.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub tests: usize,
    pub assertions: usize,
    pub passed: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Whether any counter line was found at all.
    pub found: bool,
}

impl ConsoleSummary {
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.errors > 0
    }
}

/// A numbered `N) Class::method` failure heading plus its first message line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleFailure {
    pub class: String,
    pub method: String,
    pub message: Option<String>,
}

impl ConsoleFailure {
    pub fn short_class(&self) -> &str {
        self.class.rsplit('\\').next().unwrap_or(&self.class)
    }
}

/// A testdox line: glyph plus humanized test name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoxLine {
    pub status: TestStatus,
    /// Short name of the class from the enclosing `Title (Fq\Class)` header.
    pub class: Option<String>,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct ConsoleOutcome {
    pub summary: ConsoleSummary,
    pub failures: Vec<ConsoleFailure>,
    pub dox: Vec<DoxLine>,
}

struct Patterns {
    labeled: Regex,
    ok_line: Regex,
    passed: Regex,
    failure_heading: Regex,
    dox_header: Regex,
    ansi: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        labeled: Regex::new(r"\b(Tests|Assertions|Failures|Errors|Skipped|Passed):\s*(\d+)")
            .expect("valid labeled counter regex"),
        ok_line: Regex::new(r"OK \((\d+) tests?, (\d+) assertions?\)").expect("valid ok regex"),
        passed: Regex::new(r"(?i)\b(\d+)\s+(passed|failed|skipped)\b").expect("valid count regex"),
        failure_heading: Regex::new(r"^\d+\)\s+([\w\\]+)::(\w+)").expect("valid heading regex"),
        dox_header: Regex::new(r"^\S.*\(([\w\\]+)\)\s*$").expect("valid header regex"),
        ansi: Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"),
    })
}

/// Reads counters, failure headings and testdox lines from console output.
pub fn parse_console(output: &str) -> ConsoleOutcome {
    let patterns = patterns();
    let clean = patterns.ansi.replace_all(output, "");
    let mut outcome = ConsoleOutcome::default();
    let mut current_class: Option<String> = None;
    let mut pending_failure: Option<usize> = None;

    for raw_line in clean.lines() {
        let line = raw_line.trim_end();
        let trimmed = line.trim();

        if let Some(index) = pending_failure {
            if !trimmed.is_empty() {
                outcome.failures[index].message = Some(trimmed.to_string());
                pending_failure = None;
                continue;
            }
        }

        if let Some(caps) = patterns.failure_heading.captures(trimmed) {
            outcome.failures.push(ConsoleFailure {
                class: caps[1].to_string(),
                method: strip_data_set(&caps[2]).to_string(),
                message: None,
            });
            pending_failure = Some(outcome.failures.len() - 1);
            continue;
        }

        if let Some(caps) = patterns.dox_header.captures(line) {
            let class = &caps[1];
            current_class = Some(class.rsplit('\\').next().unwrap_or(class).to_string());
            continue;
        }

        if let Some((status, label)) = dox_glyph(trimmed) {
            outcome.dox.push(DoxLine {
                status,
                class: current_class.clone(),
                label: strip_data_set(label).to_string(),
            });
            continue;
        }

        read_counters(patterns, trimmed, &mut outcome.summary);
    }

    if outcome.summary.found && outcome.summary.passed == 0 {
        let s = &outcome.summary;
        let passed = s.tests.saturating_sub(s.failures + s.errors + s.skipped);
        outcome.summary.passed = passed;
    }
    outcome
}

fn read_counters(patterns: &Patterns, line: &str, summary: &mut ConsoleSummary) {
    if let Some(caps) = patterns.ok_line.captures(line) {
        summary.tests = caps[1].parse().unwrap_or(0);
        summary.assertions = caps[2].parse().unwrap_or(0);
        summary.found = true;
        return;
    }

    // "3 passed, 1 failed" style footers.
    let mut counted = false;
    for caps in patterns.passed.captures_iter(line) {
        let value: usize = caps[1].parse().unwrap_or(0);
        match caps[2].to_ascii_lowercase().as_str() {
            "passed" => summary.passed = value,
            "failed" => summary.failures = value,
            _ => summary.skipped = value,
        }
        summary.tests = summary.passed + summary.failures + summary.skipped;
        summary.found = true;
        counted = true;
    }
    if counted {
        return;
    }

    let mut labeled = false;
    for caps in patterns.labeled.captures_iter(line) {
        let value: usize = caps[2].parse().unwrap_or(0);
        match &caps[1] {
            "Tests" => summary.tests = value,
            "Assertions" => summary.assertions = value,
            "Failures" => summary.failures = value,
            "Errors" => summary.errors = value,
            "Skipped" => summary.skipped = value,
            "Passed" => summary.passed = value,
            _ => {}
        }
        labeled = true;
    }
    if labeled {
        summary.found = true;
    }
}

fn dox_glyph(line: &str) -> Option<(TestStatus, &str)> {
    let mut chars = line.chars();
    let glyph = chars.next()?;
    let status = match glyph {
        '✔' | '✓' => TestStatus::Passed,
        '✘' | '✗' | '✖' => TestStatus::Failed,
        '↩' | '∅' => TestStatus::Skipped,
        _ => return None,
    };
    let label = chars.as_str().trim();
    (!label.is_empty()).then_some((status, label))
}

fn strip_data_set(name: &str) -> &str {
    match name.find(" with data set") {
        Some(idx) => name[..idx].trim_end(),
        None => name,
    }
}

/// Testdox rendering of a method name: `testAddsTwoNumbers` → `Adds two numbers`.
pub fn humanize(method: &str) -> String {
    let base = method
        .strip_prefix("test")
        .filter(|rest| !rest.is_empty())
        .unwrap_or(method)
        .trim_start_matches('_');

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous: Option<char> = None;
    for ch in base.chars() {
        let boundary = ch == '_'
            || (ch.is_uppercase() && previous.is_some_and(|p| !p.is_uppercase()))
            || (ch.is_ascii_digit() && previous.is_some_and(|p| !p.is_ascii_digit()));
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        if ch != '_' {
            current.push(ch);
        }
        previous = Some(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut sentence = words
        .iter()
        .map(|w| {
            if w.chars().all(|c| c.is_uppercase() || c.is_ascii_digit()) {
                w.clone()
            } else {
                w.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(first) = sentence.chars().next() {
        sentence.replace_range(..first.len_utf8(), &first.to_uppercase().to_string());
    }
    sentence
}
