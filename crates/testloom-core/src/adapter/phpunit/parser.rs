//! Test class and method extraction from PHP sources.
//!
//! Classes are located with a regex and their bodies delimited by brace
//! matching that skips strings and comments.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::id::TestId;
use crate::model::{TestCase, TestItem, TestLocation, TestSuite};

/// Class declarations with modifiers and optional parent class.
const CLASS_PATTERN: &str =
    r"(?m)^[ \t]*((?:(?:abstract|final|readonly)\s+)*)class\s+(\w+)(?:\s+extends\s+([\w\\]+))?";

/// Method declarations with their modifiers.
const METHOD_PATTERN: &str =
    r"(?m)^[ \t]*((?:(?:public|protected|private|static|final|abstract)\s+)*)function\s+(\w+)\s*\(";

/// `@test` docblock tag or `#[Test]` attribute.
const TEST_MARKER_PATTERN: &str = r"@test\b|#\[\s*\\?(?:PHPUnit\\Framework\\Attributes\\)?Test\s*[\](]";

struct Patterns {
    class: Regex,
    method: Regex,
    marker: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        class: Regex::new(CLASS_PATTERN).expect("valid class regex"),
        method: Regex::new(METHOD_PATTERN).expect("valid method regex"),
        marker: Regex::new(TEST_MARKER_PATTERN).expect("valid marker regex"),
    })
}

/// Parses `content` into a file-level suite with one child per test class.
///
/// `None` when no concrete test class with at least one test is found.
pub fn parse_php(file: &Path, content: &str) -> Option<TestSuite> {
    let patterns = patterns();
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let mut root = TestSuite::new(
        TestId::for_file(file),
        file_name,
        TestLocation::new(file, 1, 1),
        None,
    );

    for class in patterns.class.captures_iter(content) {
        let (Some(whole), Some(name)) = (class.get(0), class.get(2)) else {
            continue;
        };
        let modifiers = class.get(1).map(|m| m.as_str()).unwrap_or_default();
        let parent = class.get(3).map(|m| m.as_str()).unwrap_or_default();
        if modifiers.contains("abstract") || !is_test_class(name.as_str(), parent) {
            continue;
        }

        let Some(open) = content[whole.end()..].find('{').map(|i| whole.end() + i) else {
            continue;
        };
        let close = matching_brace(content, open).unwrap_or(content.len());
        let body = &content[open + 1..close];

        let (line, column) = line_col(content, name.start());
        let class_name = name.as_str().to_string();
        let mut suite = TestSuite::new(
            root.id.child(&class_name),
            class_name.clone(),
            TestLocation::new(file, line, column),
            Some(root.id.clone()),
        );

        let mut previous_end = 0;
        for method in patterns.method.captures_iter(body) {
            let (Some(whole), Some(method_name)) = (method.get(0), method.get(2)) else {
                continue;
            };
            let modifiers = method.get(1).map(|m| m.as_str()).unwrap_or_default();
            let preamble = &body[previous_end..whole.start()];
            previous_end = whole.end();

            let is_public = !modifiers.contains("private") && !modifiers.contains("protected");
            let marked = patterns.marker.is_match(preamble);
            let named = method_name.as_str().starts_with("test");
            if !is_public || modifiers.contains("abstract") || !(named || marked) {
                continue;
            }
            if brace_depth(body, whole.start()) != 0 {
                continue;
            }

            let offset = open + 1 + method_name.start();
            let (line, column) = line_col(content, offset);
            let method_name = method_name.as_str().to_string();
            suite.children.push(TestItem::Case(TestCase {
                id: suite.id.child(&method_name),
                full_name: format!("{}::{}", class_name, method_name),
                name: method_name,
                location: TestLocation::new(file, line, column),
                parent_id: Some(suite.id.clone()),
            }));
        }

        if !suite.is_empty() {
            root.children.push(TestItem::Suite(suite));
        }
    }

    (!root.is_empty()).then_some(root)
}

fn is_test_class(name: &str, parent: &str) -> bool {
    parent.rsplit('\\').next().unwrap_or(parent).ends_with("TestCase") || name.ends_with("Test")
}

/// 1-based line and column of a byte offset.
fn line_col(content: &str, offset: usize) -> (u32, u32) {
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map(|nl| offset - nl).unwrap_or(offset + 1);
    (line as u32, column as u32)
}

/// Index of the `}` closing the `{` at `open`.
fn matching_brace(content: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut scanner = CodeScanner::new(&content[open..]);
    while let Some((i, ch)) = scanner.next_code_char() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Brace nesting at `offset` within a class body.
fn brace_depth(body: &str, offset: usize) -> usize {
    let mut depth = 0usize;
    let mut scanner = CodeScanner::new(&body[..offset]);
    while let Some((_, ch)) = scanner.next_code_char() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// Iterates characters outside string literals and comments.
struct CodeScanner<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> CodeScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
        }
    }

    fn next_code_char(&mut self) -> Option<(usize, char)> {
        while let Some((i, ch)) = self.chars.next() {
            match ch {
                '\'' | '"' => self.skip_string(ch),
                '#' if self.chars.peek().map(|&(_, c)| c) != Some('[') => self.skip_line(),
                '/' => match self.chars.peek().map(|&(_, c)| c) {
                    Some('/') => self.skip_line(),
                    Some('*') => {
                        self.chars.next();
                        self.skip_block_comment();
                    }
                    _ => return Some((i, ch)),
                },
                _ => return Some((i, ch)),
            }
        }
        None
    }

    fn skip_string(&mut self, quote: char) {
        while let Some((_, ch)) = self.chars.next() {
            if ch == '\\' {
                self.chars.next();
            } else if ch == quote {
                return;
            }
        }
    }

    fn skip_line(&mut self) {
        for (_, ch) in self.chars.by_ref() {
            if ch == '\n' {
                return;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let mut star = false;
        for (_, ch) in self.chars.by_ref() {
            if star && ch == '/' {
                return;
            }
            star = ch == '*';
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"<?php

namespace Tests\Unit;

use PHPUnit\Framework\TestCase;
use PHPUnit\Framework\Attributes\Test;

final class MathTest extends TestCase
{
    protected function setUp(): void
    {
        $this->calc = new Calc(); // { not a brace
    }

    public function testAdds(): void
    {
        $fn = function () { return "}"; };
        $this->assertSame(2, 1 + 1);
    }

    /**
     * @test
     */
    public function subtracts(): void
    {
        $this->assertSame(1, 2 - 1);
    }

    #[Test]
    public function divides(): void {}

    private function testHelper(): void {}
}
"#;

    #[test]
    fn test_parse_class_and_methods() {
        let file = Path::new("/proj/tests/Unit/MathTest.php");
        let root = parse_php(file, SOURCE).unwrap();

        assert_eq!(root.children.len(), 1);
        let TestItem::Suite(class) = &root.children[0] else {
            panic!("expected class suite");
        };
        assert_eq!(class.name, "MathTest");
        assert_eq!(class.location.line, 8);

        let names: Vec<&str> = class.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["testAdds", "subtracts", "divides"]);

        let TestItem::Case(adds) = &class.children[0] else {
            panic!("expected case");
        };
        assert_eq!(adds.id.decode().segments, vec!["MathTest", "testAdds"]);
        assert_eq!(adds.full_name, "MathTest::testAdds");
        assert_eq!(adds.location.line, 15);
        assert_eq!(adds.location.column, 21);
    }

    #[test]
    fn test_abstract_and_plain_classes_are_skipped() {
        let source = r#"<?php
abstract class BaseTest extends TestCase {
    public function testShared() {}
}
class Helper {
    public function testLooksLikeATest() {}
}
"#;
        assert!(parse_php(Path::new("/proj/BaseTest.php"), source).is_none());
    }

    #[test]
    fn test_multiple_classes() {
        let source = r#"<?php
class FirstTest extends \PHPUnit\Framework\TestCase {
    public function testOne() {}
}
class SecondTest extends FirstTest {
    function testTwo() {}
}
"#;
        let root = parse_php(Path::new("/proj/FirstTest.php"), source).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.test_count(), 2);
    }

    #[test]
    fn test_line_col() {
        assert_eq!(line_col("ab\ncd", 0), (1, 1));
        assert_eq!(line_col("ab\ncd", 4), (2, 2));
    }
}
