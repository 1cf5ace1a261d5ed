use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Only the crate's own sources are policed. Anything else under the package root
// (data directories, vendored reference material, target/) is left alone.
const SOURCE_DIRS: [&str; 4] = ["dashboard", "cli", "tests", "benches"];

/// A source rule enforced at build time.
struct Policy {
    pattern: &'static str,
    description: &'static str,
    advice: &'static str,
    // Matches inside comments and string literals are not violations.
    code_only: bool,
    check_build_script: bool,
}

const POLICIES: [Policy; 3] = [
    Policy {
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        description: "underscore-prefixed variables",
        advice: "Either use the variable (removing the underscore) or remove it completely.",
        code_only: true,
        check_build_script: true,
    },
    Policy {
        pattern: r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        description: "change-log style comment markers",
        advice: "Comments describe the code as it is. Remove markers such as 'FIXED', 'NEW' or 'UPDATE'.",
        code_only: false,
        check_build_script: false,
    },
    Policy {
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        description: "#[allow(dead_code)] attributes",
        advice: "Either use the code (removing the attribute) or remove it completely.",
        code_only: true,
        check_build_script: false,
    },
];

// Collects every matching line of one file so the error lists them all at once.
struct ViolationCollector<'a> {
    policy: &'a Policy,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl<'a> ViolationCollector<'a> {
    fn new(policy: &'a Policy, file_path: &Path) -> Self {
        Self {
            policy,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.policy.description,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!(
            "\n⚠️ {} are not allowed in this project.\n   {}\n",
            self.policy.description, self.policy.advice
        ));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if self.policy.code_only && (is_comment(line_text) || is_in_string(line_text)) {
            return Ok(true);
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

// A match counts as quoted when an odd-numbered quote-delimited segment holds an
// underscore.
fn is_in_string(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn source_files() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(policy: &Policy) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(policy.pattern)?;
    let mut searcher = Searcher::new();

    let build_script = policy.check_build_script.then(|| PathBuf::from("build.rs"));
    for path in source_files().chain(build_script) {
        let mut collector = ViolationCollector::new(policy, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    for policy in &POLICIES {
        if let Err(e) = scan(policy) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=APLUSA_BUILD_TIMESTAMP={timestamp}");
}
