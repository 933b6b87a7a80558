//! JUnit XML report parsing (`--log-junit`).
//!
//! The report is read by locating `<testcase>` elements and their attributes
//! rather than building a DOM.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::adapter::error::AdapterError;
use crate::model::TestStatus;

/// One `<testcase>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct JunitCase {
    /// Method name, possibly with a ` with data set …` suffix.
    pub name: String,
    /// Fully qualified class name.
    pub class: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub time_secs: f64,
    pub status: TestStatus,
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl JunitCase {
    /// Class name without its namespace.
    pub fn short_class(&self) -> &str {
        self.class.rsplit('\\').next().unwrap_or(&self.class)
    }

    /// Method name without a data-provider suffix.
    pub fn method(&self) -> &str {
        match self.name.find(" with data set") {
            Some(idx) => &self.name[..idx],
            None => &self.name,
        }
    }
}

struct Patterns {
    testcase: Regex,
    attribute: Regex,
    outcome: Regex,
    skipped: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        testcase: Regex::new(r"(?s)<testcase\b([^>]*?)(?:/>|>(.*?)</testcase>)")
            .expect("valid testcase regex"),
        attribute: Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#).expect("valid attribute regex"),
        outcome: Regex::new(r"(?s)<(failure|error)\b([^>]*?)(?:/>|>(.*?)</(?:failure|error)>)")
            .expect("valid outcome regex"),
        skipped: Regex::new(r"<skipped\b").expect("valid skipped regex"),
    })
}

/// Parses every `<testcase>` in `xml`.
pub fn parse_junit(xml: &str) -> Result<Vec<JunitCase>, AdapterError> {
    if !xml.contains("<testsuites") && !xml.contains("<testsuite") {
        return Err(AdapterError::parse("junit report", "no <testsuite> element"));
    }

    let patterns = patterns();
    let mut cases = Vec::new();

    for element in patterns.testcase.captures_iter(xml) {
        let attrs = attributes(element.get(1).map(|m| m.as_str()).unwrap_or_default());
        let body = element.get(2).map(|m| m.as_str()).unwrap_or_default();

        let Some(name) = attrs.get("name").cloned() else {
            continue;
        };
        let class = attrs
            .get("class")
            .cloned()
            .or_else(|| attrs.get("classname").map(|c| c.replace('.', "\\")))
            .unwrap_or_default();

        let (status, message, detail) = match patterns.outcome.captures(body) {
            Some(outcome) => {
                let outcome_attrs =
                    attributes(outcome.get(2).map(|m| m.as_str()).unwrap_or_default());
                let detail = outcome
                    .get(3)
                    .map(|m| unescape(m.as_str()).trim().to_string())
                    .filter(|d| !d.is_empty());
                let message = outcome_attrs
                    .get("message")
                    .cloned()
                    .or_else(|| detail.as_deref().map(first_meaningful_line))
                    .or_else(|| outcome_attrs.get("type").cloned());
                (TestStatus::Failed, message, detail)
            }
            None if patterns.skipped.is_match(body) => (TestStatus::Skipped, None, None),
            None => (TestStatus::Passed, None, None),
        };

        cases.push(JunitCase {
            name,
            class,
            file: attrs.get("file").cloned(),
            line: attrs.get("line").and_then(|l| l.parse().ok()),
            time_secs: attrs
                .get("time")
                .and_then(|t| t.parse().ok())
                .unwrap_or(0.0),
            status,
            message,
            detail,
        });
    }

    Ok(cases)
}

fn attributes(raw: &str) -> HashMap<String, String> {
    patterns()
        .attribute
        .captures_iter(raw)
        .filter_map(|c| Some((c.get(1)?.as_str().to_string(), unescape(c.get(2)?.as_str()))))
        .collect()
}

/// PHPUnit repeats `Class::method` as the first line of a failure body.
fn first_meaningful_line(detail: &str) -> String {
    let mut lines = detail.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next().unwrap_or_default();
    if first.contains("::") && !first.contains(' ') {
        lines.next().unwrap_or(first).to_string()
    } else {
        first.to_string()
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}
