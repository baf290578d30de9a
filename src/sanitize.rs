//! Diagram text sanitizer.
//!
//! Model-written diagram blocks often carry `//` comments, parentheses inside
//! node labels and unbalanced brackets, all of which make the diagram renderer
//! reject the whole block. [`sanitize`] repairs them in four fixed stages:
//!
//! 1. [`strip_comments`]
//! 2. [`neutralize_label_parens`] for `[...]`, then for `{...}`
//! 3. [`repair_brackets`]
//! 4. [`strip_keyword`]
//!
//! Each stage expects the previous stage's output. Bracket repair works one
//! line at a time because the diagram grammar is line-oriented: a broken line
//! must not corrupt the lines after it.

use std::fmt;

const OPENERS: [char; 3] = ['{', '[', '('];

fn closer_for(open: char) -> char {
    match open {
        '{' => '}',
        '[' => ']',
        _ => ')',
    }
}

fn is_closer(ch: char) -> bool {
    matches!(ch, '}' | ']' | ')')
}

// ---------------------------------------------------------------------------
// Stage 1: comments
// ---------------------------------------------------------------------------

/// Remove `//` comments and drop lines left blank.
///
/// A trailing comment starts at a whitespace run followed by `//`, so
/// `http://host` survives. A line beginning with `//` is removed entirely.
pub fn strip_comments(text: &str) -> String {
    text.split('\n')
        .map(strip_line_comment)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_line_comment(line: &str) -> &str {
    let mut cut = line.len();
    let mut run_start: Option<usize> = None;
    for (i, ch) in line.char_indices() {
        if ch.is_whitespace() {
            run_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = run_start.take() {
            if line[i..].starts_with("//") {
                cut = start;
                break;
            }
        }
    }
    let line = &line[..cut];
    if line.starts_with("//") {
        ""
    } else {
        line
    }
}

// ---------------------------------------------------------------------------
// Stage 2: parentheses inside labels
// ---------------------------------------------------------------------------

/// Inside every `open`..`close` span closed on the same line, replace `(` with
/// a space and delete `)`. Afterwards trailing whitespace is trimmed from each
/// line and surrounding whitespace from the whole text.
///
/// Spans come from a stack scan, so nested spans of the same bracket type are
/// covered in full: `[[(x)]]` becomes `[[ x]]` and `[a[b]c(d)]` becomes
/// `[a[b]c d]`. A bracket that never closes on its line opens no span.
pub fn neutralize_label_parens(text: &str, open: char, close: char) -> String {
    let joined = text
        .split('\n')
        .map(|line| {
            let fixed = neutralize_line(line, open, close);
            fixed.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");
    joined.trim().to_string()
}

fn neutralize_line(line: &str, open: char, close: char) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut inside = vec![false; chars.len()];
    let mut stack: Vec<usize> = Vec::new();

    for (i, &ch) in chars.iter().enumerate() {
        if ch == open {
            stack.push(i);
        } else if ch == close {
            if let Some(start) = stack.pop() {
                for flag in &mut inside[start + 1..i] {
                    *flag = true;
                }
            }
        }
    }

    chars
        .iter()
        .zip(inside)
        .filter_map(|(&ch, inside)| match ch {
            '(' if inside => Some(' '),
            ')' if inside => None,
            _ => Some(ch),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stage 3: bracket balance
// ---------------------------------------------------------------------------

/// One repair made by [`repair_brackets`]. Lines and columns are 1-based;
/// the column counts characters of the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketWarning {
    /// A closer with nothing open was dropped.
    Unmatched { line: usize, column: usize, found: char },
    /// A closer of the wrong type was replaced with the expected one.
    Mismatched {
        line: usize,
        column: usize,
        open: char,
        found: char,
    },
    /// An opener left open at end of line got its closer appended.
    Unclosed { line: usize, open: char },
}

impl fmt::Display for BracketWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketWarning::Unmatched { line, column, found } => {
                write!(f, "line {line}:{column}: unmatched closing bracket '{found}' dropped")
            }
            BracketWarning::Mismatched {
                line,
                column,
                open,
                found,
            } => write!(
                f,
                "line {line}:{column}: mismatched brackets '{open}' and '{found}', replaced with '{}'",
                closer_for(*open)
            ),
            BracketWarning::Unclosed { line, open } => write!(
                f,
                "line {line}: unclosed bracket '{open}' at end of line, added '{}'",
                closer_for(*open)
            ),
        }
    }
}

/// Result of a bracket repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    pub text: String,
    pub warnings: Vec<BracketWarning>,
}

/// Balance `{`, `[` and `(` on every line independently.
///
/// * a closer with an empty stack is dropped
/// * a closer that does not match the innermost opener is replaced by the
///   opener's closer
/// * openers still pending at end of line are closed innermost first
///
/// Everything else is copied through in place.
pub fn repair_brackets(text: &str) -> Repair {
    let mut warnings = Vec::new();
    let lines: Vec<String> = text
        .split('\n')
        .enumerate()
        .map(|(idx, line)| repair_line(line, idx + 1, &mut warnings))
        .collect();
    Repair {
        text: lines.join("\n"),
        warnings,
    }
}

fn repair_line(line: &str, line_no: usize, warnings: &mut Vec<BracketWarning>) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut fixed = String::with_capacity(line.len() + 4);

    for (col, ch) in line.chars().enumerate() {
        if OPENERS.contains(&ch) {
            stack.push(ch);
            fixed.push(ch);
        } else if is_closer(ch) {
            match stack.pop() {
                None => warnings.push(BracketWarning::Unmatched {
                    line: line_no,
                    column: col + 1,
                    found: ch,
                }),
                Some(open) if closer_for(open) == ch => fixed.push(ch),
                Some(open) => {
                    warnings.push(BracketWarning::Mismatched {
                        line: line_no,
                        column: col + 1,
                        open,
                        found: ch,
                    });
                    fixed.push(closer_for(open));
                }
            }
        } else {
            fixed.push(ch);
        }
    }

    while let Some(open) = stack.pop() {
        warnings.push(BracketWarning::Unclosed {
            line: line_no,
            open,
        });
        fixed.push(closer_for(open));
    }

    fixed
}

// ---------------------------------------------------------------------------
// Stage 4: keyword
// ---------------------------------------------------------------------------

/// Remove every literal occurrence of `keyword`.
pub fn strip_keyword(text: &str, keyword: &str) -> String {
    if keyword.is_empty() {
        return text.to_string();
    }
    text.replace(keyword, "")
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run all four stages. Never fails; every repair is logged at `warn` and
/// returned in [`Repair::warnings`].
pub fn sanitize(text: &str, keyword: &str) -> Repair {
    let stripped = strip_comments(text);
    let labels = neutralize_label_parens(&stripped, '[', ']');
    let labels = neutralize_label_parens(&labels, '{', '}');
    let repair = repair_brackets(&labels);
    for warning in &repair.warnings {
        tracing::warn!(%warning, "diagram bracket repaired");
    }
    Repair {
        text: strip_keyword(&repair.text, keyword),
        warnings: repair.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    // -- comments --

    #[rstest]
    #[case("A --> B // comment", "A --> B")]
    #[case("// comment", "")]
    #[case("A --> B\n// only comment\nB --> C", "A --> B\nB --> C")]
    #[case("click A http://example.com", "click A http://example.com")]
    #[case("A-->B//tight", "A-->B//tight")]
    #[case("A --> B\t// tab comment", "A --> B")]
    #[case("  // indented comment\nA", "A")]
    #[case("A\n\n   \nB", "A\nB")]
    #[case("  A --> B", "  A --> B")]
    fn test_strip_comments(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_comments(input), expected);
    }

    #[test]
    fn test_strip_comments_cuts_at_first_comment() {
        assert_eq!(strip_comments("A // one // two"), "A");
    }

    // -- label parens --

    #[rstest]
    #[case("[Do (this) now]", '[', ']', "[Do  this now]")]
    #[case("{Wait (a bit)}", '{', '}', "{Wait  a bit}")]
    #[case("A(round) --> B[box (x)]", '[', ']', "A(round) --> B[box  x]")]
    #[case("[[(x)]]", '[', ']', "[[ x]]")]
    #[case("[a[b]c(d)]", '[', ']', "[a[b]c d]")]
    #[case("[unclosed (x)", '[', ']', "[unclosed (x)")]
    #[case("{a (b)} [c (d)]", '{', '}', "{a  b} [c (d)]")]
    fn test_neutralize_label_parens(
        #[case] input: &str,
        #[case] open: char,
        #[case] close: char,
        #[case] expected: &str,
    ) {
        assert_eq!(neutralize_label_parens(input, open, close), expected);
    }

    #[test]
    fn test_neutralize_trims_lines_and_text() {
        let input = "\n\ngraph TD   \n  A[x (y)]  \n\n";
        assert_eq!(neutralize_label_parens(input, '[', ']'), "graph TD\n  A[x  y]");
    }

    #[test]
    fn test_neutralize_does_not_span_lines() {
        assert_eq!(
            neutralize_label_parens("A[x (y)\nz]", '[', ']'),
            "A[x (y)\nz]"
        );
    }

    // -- bracket repair --

    #[rstest]
    #[case("A[B(C)D]", "A[B(C)D]")]
    #[case("A)B", "AB")]
    #[case("(A]", "(A)")]
    #[case("A[B(C", "A[B(C)]")]
    #[case("{[}", "{[]}")]
    #[case("plain text", "plain text")]
    #[case("", "")]
    fn test_repair_brackets(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(repair_brackets(input).text, expected);
    }

    #[test]
    fn test_repair_warnings_matched_is_silent() {
        assert!(repair_brackets("A[B(C)D]").warnings.is_empty());
    }

    #[test]
    fn test_repair_warning_unmatched() {
        let repair = repair_brackets("ok\nA)B");
        assert_eq!(
            repair.warnings,
            vec![BracketWarning::Unmatched {
                line: 2,
                column: 2,
                found: ')'
            }]
        );
    }

    #[test]
    fn test_repair_warning_mismatched() {
        let repair = repair_brackets("(A]");
        assert_eq!(
            repair.warnings,
            vec![BracketWarning::Mismatched {
                line: 1,
                column: 3,
                open: '(',
                found: ']'
            }]
        );
        assert!(repair.warnings[0].to_string().contains("replaced with ')'"));
    }

    #[test]
    fn test_repair_warning_unclosed_innermost_first() {
        let repair = repair_brackets("A[B(C");
        assert_eq!(
            repair.warnings,
            vec![
                BracketWarning::Unclosed { line: 1, open: '(' },
                BracketWarning::Unclosed { line: 1, open: '[' },
            ]
        );
    }

    #[test]
    fn test_repair_is_per_line() {
        // The open bracket on line 1 must not swallow the closer on line 2.
        let repair = repair_brackets("A[B\nC]D");
        assert_eq!(repair.text, "A[B]\nCD");
        assert_eq!(repair.warnings.len(), 2);
    }

    // -- keyword --

    #[test]
    fn test_strip_keyword() {
        assert_eq!(strip_keyword("mermaid\ngraph TD", "mermaid"), "\ngraph TD");
        assert_eq!(strip_keyword("A-->B", ""), "A-->B");
    }

    // -- pipeline --

    #[test]
    fn test_sanitize_pipeline_order() {
        let src = "mermaid\ngraph TD // direction\n  A[Start (here)] --> B{Ok (yes)?\n// dropped\n  B --> C(End]";
        let out = sanitize(src, "mermaid");
        assert_eq!(
            out.text,
            "\ngraph TD\n  A[Start  here] --> B{Ok (yes)?}\n  B --> C(End)"
        );
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn test_sanitize_clean_input_unchanged() {
        let src = "graph LR\n  A[One] --> B[Two]";
        let out = sanitize(src, "mermaid");
        assert_eq!(out.text, src);
        assert!(out.warnings.is_empty());
    }

    fn balanced(line: &str) -> bool {
        let mut stack = Vec::new();
        for ch in line.chars() {
            if OPENERS.contains(&ch) {
                stack.push(closer_for(ch));
            } else if is_closer(ch) && stack.pop() != Some(ch) {
                return false;
            }
        }
        stack.is_empty()
    }

    proptest! {
        #[test]
        fn prop_repair_output_is_balanced(s in "[a-c(){}\\[\\]\\n ]{0,48}") {
            let repair = repair_brackets(&s);
            for line in repair.text.split('\n') {
                prop_assert!(balanced(line), "unbalanced line {:?}", line);
            }
        }

        #[test]
        fn prop_repair_keeps_line_count(s in "[a(\\]\\n]{0,48}") {
            prop_assert_eq!(repair_brackets(&s).text.split('\n').count(), s.split('\n').count());
        }

        #[test]
        fn prop_repair_is_idempotent(s in "[a-c(){}\\[\\]\\n ]{0,48}") {
            let once = repair_brackets(&s).text;
            let twice = repair_brackets(&once);
            prop_assert_eq!(&twice.text, &once);
            prop_assert!(twice.warnings.is_empty());
        }
    }
}
