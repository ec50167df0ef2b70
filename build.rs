use grep::regex::RegexMatcher;
use grep::searcher::Searcher;
use grep::searcher::sinks::UTF8;
use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories whose sources may not silence dead-code warnings.
const SOURCE_DIRS: [&str; 6] = ["network", "linear", "analysis", "cli", "tests", "benches"];
const ALLOW_DEAD_CODE: &str = r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]";

/// Every `#[allow(dead_code)]` in the source tree, as `path:line: text`.
fn dead_code_allowances() -> Result<Vec<String>, Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(ALLOW_DEAD_CODE)?;
    let mut searcher = Searcher::new();
    let mut found = Vec::new();

    let sources = SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"));
    for entry in sources {
        let path = entry.path();
        searcher.search_path(
            &matcher,
            path,
            UTF8(|line_number, line| {
                found.push(format!("{}:{line_number}: {}", path.display(), line.trim_end()));
                Ok(true)
            }),
        )?;
    }
    Ok(found)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    // Read by the `version` subcommand.
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=GENOMIC_NEURALNET_BUILD_TIMESTAMP={timestamp}");

    match dead_code_allowances() {
        Ok(found) if found.is_empty() => {}
        Ok(found) => {
            eprintln!("#[allow(dead_code)] is not allowed; use the code or remove it:");
            for location in found {
                eprintln!("   {location}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
