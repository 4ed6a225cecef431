//! FileCheck-style test validation for RIR files.
//!
//! This module parses RUN and CHECK directives from `.rir` files, compiles the
//! shader in the file and matches the printed result against the expected
//! patterns, similar to LLVM's FileCheck tool.

use bumpalo::Bump;

use super::{parse_ir, IrShader};
use crate::core::{BuildContext, CompilerOptions};

/// A CHECK directive extracted from a RIR file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match pattern on this or a later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Pattern must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a RIR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub rir_content: String,
}

impl TestSpec {
    /// Parse a RIR file to extract test specifications
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut rir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else if trimmed.starts_with("; CHECK") {
                return Err(format!("Unknown check directive: {trimmed}"));
            } else {
                // Regular RIR content
                rir_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            rir_content: rir_lines.join("\n"),
        })
    }
}

/// Test runner that executes RIR tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a RIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        let ir = parse_ir(&spec.rir_content).map_err(|e| e.to_string())?;

        if spec.run_directives.is_empty() {
            return Err("Test has no RUN directive".to_string());
        }
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&ir, run_dir)?;
            if self.verbose {
                println!("{output}");
            }
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Execute a test command and return the output
    fn execute_command(&self, ir: &IrShader, run_dir: &RunDirective) -> Result<String, String> {
        let mut print_ir = false;
        let mut until = "passes";
        let mut options = CompilerOptions::default();

        let mut args = run_dir.args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--print-ir" => print_ir = true,
                "--details" => options.debug.ir_details = true,
                "--tpu-array-textures" => options.device.tpu_array_textures = true,
                "--until" => match args.next().map(String::as_str) {
                    Some(stage @ ("isel" | "passes")) => until = stage,
                    other => return Err(format!("--until expects isel or passes, got {other:?}")),
                },
                // Input file placeholder
                "%s" => {}
                other => return Err(format!("Unknown RUN argument: {other}")),
            }
        }

        let mut output = Vec::new();

        if print_ir {
            output.push("Printing IR".to_string());
            output.push(format!("{}", ir));
        }

        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, options);
        let shader = match until {
            "isel" => crate::isel::select(&ctx, ir),
            _ => crate::compile(&ctx, ir),
        };
        output.push(format!("{}", shader.display(ctx.debug().ir_details)));

        Ok(output.join("\n"))
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            Self::check_not(&pending_not, &output_lines[line_idx..line_idx + idx])?;
                            pending_not.clear();
                            line_idx += idx + 1; // Move to the next line after the match
                            if self.verbose {
                                println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("CHECK: pattern '{}' not found in output", pattern));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{}' but got '{}'", pattern, line));
                    }
                    pending_not.clear();

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!("CHECK-EMPTY: expected empty line but got '{}'", line));
                    }
                    line_idx += 1;
                }
            }
        }

        // Trailing CHECK-NOTs cover the rest of the output.
        Self::check_not(&pending_not, &output_lines[line_idx.min(output_lines.len())..])
    }

    fn check_not(patterns: &[&str], lines: &[&str]) -> Result<(), String> {
        for pattern in patterns {
            if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
                return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: roguec %s
; CHECK-LABEL: fs shader "test"
; CHECK-NEXT: block0:
; CHECK-NOT: mov
; COM: This is a comment
shader fs "test"
"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].args, vec!["%s".to_string()]);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.rir_content.contains("shader fs"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "fs shader \"test\"\nblock0:\n  0: fadd r0, r1, r2\n  1: nop.end\n";

        let directives = vec![
            CheckDirective::CheckLabel("fs shader".to_string()),
            CheckDirective::CheckNext("block0:".to_string()),
            CheckDirective::CheckNot("mov".to_string()),
            CheckDirective::Check("fadd".to_string()),
            CheckDirective::CheckNext("nop.end".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()), // Should fail
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "a\nmov\nb\n";

        let directives = vec![
            CheckDirective::Check("a".to_string()),
            CheckDirective::CheckNot("mov".to_string()),
            CheckDirective::Check("b".to_string()),
        ];
        let result = runner.validate_output(output, &directives);
        assert!(result.unwrap_err().contains("CHECK-NOT"));

        let trailing = vec![CheckDirective::Check("b".to_string()), CheckDirective::CheckNot("a".to_string())];
        runner.validate_output(output, &trailing).unwrap();
    }
}
