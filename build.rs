use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::io::{self, Write};
use std::path::{Component, Path};
use walkdir::WalkDir;

// Directories whose Rust sources are held to the house rules.
const SCANNED_ROOTS: [&str; 2] = ["src", "tests"];

const FORBIDDEN_COMMENT_WORDS: [&str; 15] = [
    "CRITICAL",
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

#[derive(Clone, Copy, Debug)]
enum Rule {
    UnderscoreBinding,
    DiscardedLet,
    IgnoredTuple,
    DeadCodeAllowance,
    IgnoredTest,
    DebugAssert,
    CommentWording,
}

impl Rule {
    const ALL: [Rule; 7] = [
        Rule::UnderscoreBinding,
        Rule::DiscardedLet,
        Rule::IgnoredTuple,
        Rule::DeadCodeAllowance,
        Rule::IgnoredTest,
        Rule::DebugAssert,
        Rule::CommentWording,
    ];

    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscoreBinding => r"\b(_[a-zA-Z0-9_]+)\b",
            Rule::DiscardedLet => r"\blet\s+(?:mut\s+)?_\s*=",
            Rule::IgnoredTuple => r"\blet\s*\([^)]*\b_\b[^)]*\)\s*(?::[^=]*)?=",
            Rule::DeadCodeAllowance => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
            Rule::IgnoredTest => r"#\s*\[\s*ignore\s*\]",
            Rule::DebugAssert => r"\bdebug_assert!\s*\(",
            Rule::CommentWording => r"(//|/\*)",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Rule::UnderscoreBinding => {
                "underscore-prefixed names hide unused values; use the value or remove it"
            }
            Rule::DiscardedLet => "`let _ =` silently discards a value; handle it explicitly",
            Rule::IgnoredTuple => "tuple destructuring must bind at least one component",
            Rule::DeadCodeAllowance => "#[allow(dead_code)] is not allowed; delete unused code",
            Rule::IgnoredTest => "#[ignore] is not allowed; tests must run",
            Rule::DebugAssert => "debug_assert! vanishes in release builds; return an error",
            Rule::CommentWording => {
                "comments must describe the code, not its history, and must not shout"
            }
        }
    }

    fn flags(self, line: &str) -> bool {
        match self {
            Rule::UnderscoreBinding => {
                !is_comment_line(line) && has_underscore_ident_outside_strings(line)
            }
            Rule::IgnoredTuple => {
                !is_comment_line(line) && tuple_pattern_is_fully_ignored(code_before_strings(line))
            }
            Rule::DiscardedLet
            | Rule::DeadCodeAllowance
            | Rule::IgnoredTest
            | Rule::DebugAssert => !is_comment_line(line),
            Rule::CommentWording => comment_text(line).is_some_and(|text| {
                comment_is_forbidden(text, line.trim_start().starts_with("///"))
            }),
        }
    }
}

// Collects the offending lines of one file for one rule.
struct RuleCollector {
    rule: Rule,
    violations: Vec<String>,
}

impl Sink for RuleCollector {
    type Error = io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.flags(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_word_byte(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_')
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

fn contains_underscore_ident(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|i| {
        bytes[i] == b'_'
            && (i == 0 || !is_word_byte(bytes[i - 1]))
            && i + 1 < bytes.len()
            && is_word_byte(bytes[i + 1])
    })
}

// Drops a trailing `//` comment unless it could sit inside a string literal.
fn without_trailing_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) if !line[..idx].contains('"') => &line[..idx],
        _ => line,
    }
}

fn code_before_strings(line: &str) -> &str {
    let code = without_trailing_comment(line);
    code.split('"').next().unwrap_or(code)
}

fn has_underscore_ident_outside_strings(line: &str) -> bool {
    without_trailing_comment(line)
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 0 && contains_underscore_ident(part))
}

fn tuple_pattern_is_fully_ignored(line: &str) -> bool {
    let Some(pattern) = extract_tuple_pattern(line) else {
        return false;
    };
    let components = split_top_level(pattern);
    !components.is_empty() && components.into_iter().all(is_component_ignored)
}

fn extract_tuple_pattern(line: &str) -> Option<&str> {
    let let_pos = line.find("let")?;
    let open = let_pos + 3 + line[let_pos + 3..].find('(')?;
    let mut depth = 0usize;
    for (offset, ch) in line[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&line[open + 1..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(pattern: &str) -> Vec<&str> {
    let mut components = Vec::new();
    let mut start = 0usize;
    let mut depth = 0i32;
    for (idx, ch) in pattern.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = (depth - 1).max(0),
            ',' if depth == 0 => {
                components.push(pattern[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    components.push(pattern[start..].trim());
    components.retain(|c| !c.is_empty());
    components
}

fn is_component_ignored(component: &str) -> bool {
    let trimmed = component.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        let inner = split_top_level(&trimmed[1..trimmed.len() - 1]);
        return !inner.is_empty() && inner.into_iter().all(is_component_ignored);
    }
    if trimmed.contains('@') {
        return false;
    }
    let mut candidate = trimmed;
    while let Some(rest) = candidate
        .strip_prefix('&')
        .or_else(|| candidate.strip_prefix("mut "))
        .or_else(|| candidate.strip_prefix("ref "))
    {
        candidate = rest.trim_start();
    }
    candidate == "_"
        || candidate.starts_with('_')
            && candidate.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

// Returns the text of a comment on this line, if there is one outside a string.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches('!').trim());
    }
    let idx = line.find("//").or_else(|| line.find("/*"))?;
    if line[..idx].matches('"').count() % 2 == 1 {
        return None;
    }
    let rest = &line[idx + 2..];
    Some(rest.split("*/").next().unwrap_or(rest).trim())
}

fn comment_is_forbidden(text: &str, is_doc: bool) -> bool {
    let shouts_history = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .any(|word| FORBIDDEN_COMMENT_WORDS.contains(&word));
    let has_stars = !is_doc && text.contains("**");
    shouts_history || has_stars || is_mostly_uppercase(text) || is_mostly_dashes(text)
}

// Only letters in multi-letter words count towards the uppercase share, so
// formulas such as `H = B^-1` are left alone.
fn is_mostly_uppercase(text: &str) -> bool {
    let alpha_count = text.chars().filter(|c| c.is_alphabetic()).count();
    let non_whitespace = text.chars().filter(|c| !c.is_whitespace()).count();
    if alpha_count < 6 || (alpha_count as f64) < 0.6 * non_whitespace as f64 {
        return false;
    }
    let uppercase: usize = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| word.chars().count() > 1)
        .map(|word| word.chars().filter(|c| c.is_uppercase()).count())
        .sum();
    uppercase as f64 / alpha_count as f64 > 0.8
}

fn is_mostly_dashes(text: &str) -> bool {
    let non_whitespace: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if non_whitespace.is_empty() {
        return false;
    }
    let dashes = non_whitespace.iter().filter(|c| **c == '-').count();
    dashes as f64 / non_whitespace.len() as f64 > 0.8
}

fn is_in_ignored_directory(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "target"
        }
        _ => false,
    })
}

fn rust_sources() -> Vec<walkdir::DirEntry> {
    SCANNED_ROOTS
        .iter()
        .filter(|root| Path::new(root).is_dir())
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(Result::ok))
        .filter(|entry| !is_in_ignored_directory(entry.path()))
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .collect()
}

fn scan(rule: Rule, sources: &[walkdir::DirEntry]) -> Vec<String> {
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern()) {
        Ok(matcher) => matcher,
        Err(e) => return vec![format!("Error creating regex matcher for {rule:?}: {e}")],
    };
    let mut searcher = Searcher::new();
    let mut reports = Vec::new();
    for entry in sources {
        let path = entry.path();
        let mut collector = RuleCollector {
            rule,
            violations: Vec::new(),
        };
        if searcher
            .search_path(&matcher, path, &mut collector)
            .is_err()
            || collector.violations.is_empty()
        {
            continue;
        }
        let mut report = format!(
            "\n❌ {rule:?}: {} violation(s) in {}:\n",
            collector.violations.len(),
            path.display()
        );
        for violation in &collector.violations {
            report.push_str(&format!("   {violation}\n"));
        }
        report.push_str(&format!("   {}\n", rule.advice()));
        reports.push(report);
    }
    reports
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SCANNED_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    if std::env::var("PHF_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let sources = rust_sources();
    let all_violations: Vec<String> = Rule::ALL
        .iter()
        .flat_map(|rule| scan(*rule, &sources))
        .collect();

    if all_violations.is_empty() {
        return;
    }

    let mut stderr = io::stderr().lock();
    let mut report = String::from("\n❌ VALIDATION ERRORS\n====================\n");
    for violation in &all_violations {
        report.push_str(violation);
    }
    report.push_str(&format!(
        "\n⚠️ Found {} code quality violation group(s). Fix all issues before committing.\n",
        all_violations.len()
    ));
    if stderr.write_all(report.as_bytes()).is_err() {
        eprintln!("{report}");
    }
    std::process::exit(1);
}
