//! Runs every `.rir` file under `tests/filetest/` through the FileCheck-style harness.

use std::fs;
use std::path::{Path, PathBuf};

use rogue::ir::{TestRunner, TestSpec};

/// Discovers all .rir files in a directory recursively
fn discover_rir_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(discover_rir_files(&path));
            } else if path.extension().and_then(|s| s.to_str()) == Some("rir") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn run_rir_file(path: &Path) -> Result<(), String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let spec = TestSpec::parse(&content)?;
    TestRunner::new(false).run_test(&spec)
}

#[test]
fn test_all_rir_files() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetest");
    let files = discover_rir_files(&dir);
    assert!(!files.is_empty(), "no .rir files under {}", dir.display());

    let mut failures = Vec::new();
    for path in &files {
        // Aborts panic; report them like any other failure.
        let result = std::panic::catch_unwind(|| run_rir_file(path))
            .unwrap_or_else(|_| Err("compilation aborted".to_string()));
        match result {
            Ok(()) => log::info!("PASS {}", path.display()),
            Err(e) => failures.push(format!("{}: {}", path.display(), e)),
        }
    }

    assert!(
        failures.is_empty(),
        "{} of {} filetests failed:\n{}",
        failures.len(),
        files.len(),
        failures.join("\n")
    );
}
