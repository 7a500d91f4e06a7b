use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use smbp_core::application::repair::RepairReport;
use smbp_core::application::validator::ValidationResult;
use smbp_core::{repair, validate, SmbpConfig};

const DEFAULT_CASE_DIR: &str = "../Docs/samples/smbp";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let case_dir = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CASE_DIR);
    let case_dir = Path::new(case_dir);

    if !case_dir.exists() {
        anyhow::bail!("case dir not found: {}", case_dir.display());
    }

    let config = match args.get(2) {
        Some(path) => SmbpConfig::load_from_file(Path::new(path))?,
        None => SmbpConfig::default(),
    };
    let extension = config.file_extension.trim_start_matches('.').to_string();

    let out_dir = case_dir.join("repaired_out");
    fs::create_dir_all(&out_dir)?;

    let mut entries: Vec<PathBuf> = fs::read_dir(case_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&extension))
                    .unwrap_or(false)
        })
        .collect();
    entries.sort();

    if entries.is_empty() {
        println!("No {} files found in {}", config.file_extension, case_dir.display());
        return Ok(());
    }

    for path in entries {
        let file_name = path.file_name().unwrap_or_default().to_string_lossy();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            println!("[skip] {} is empty", file_name);
            continue;
        }

        let validation = validate(&text);
        print_validation(&file_name, &validation);

        match repair(&text) {
            Ok(report) => {
                let (out_path, json_path) = output_paths(&out_dir, &file_name);
                fs::write(&out_path, &report.text)
                    .with_context(|| format!("failed to write {}", out_path.display()))?;
                fs::write(&json_path, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("failed to write {}", json_path.display()))?;
                print_repair(&file_name, &report, &out_path);
            }
            Err(err) => {
                println!("[fail] {} repair: {}", file_name, err);
            }
        }
    }

    Ok(())
}

/// 修复结果与报告都写入输出目录，不污染样例目录
fn output_paths(out_dir: &Path, file_name: &str) -> (PathBuf, PathBuf) {
    (
        out_dir.join(file_name),
        out_dir.join(format!("{file_name}.report.json")),
    )
}

fn print_validation(file_name: &str, result: &ValidationResult) {
    println!(
        "[{}] {} errors={} warnings={}",
        if result.valid { "ok" } else { "invalid" },
        file_name,
        result.errors.len(),
        result.warnings.len()
    );
    for finding in result.findings() {
        match &finding.suggestion {
            Some(suggestion) => println!(
                "  - {} {} (suggest {})",
                finding.code.as_str(),
                finding.message,
                suggestion
            ),
            None => println!("  - {} {}", finding.code.as_str(), finding.message),
        }
    }
}

fn print_repair(file_name: &str, report: &RepairReport, out_path: &Path) {
    println!(
        "[repaired] {} -> {} (valid={})",
        file_name,
        out_path.display(),
        report.validation.valid
    );
    println!(
        "  rungs={} declarations={} fixes={} dropped={}",
        report.document.rungs().len(),
        report.document.declarations().len(),
        report.fixes.len(),
        report.dropped.len()
    );
    for fix in &report.fixes {
        println!("  * {}", fix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repaired_file_and_report_share_the_output_dir() {
        let out_dir = Path::new("cases").join("repaired_out");
        let (repaired, report) = output_paths(&out_dir, "motor.smbp");
        assert_eq!(repaired, out_dir.join("motor.smbp"));
        assert_eq!(report, out_dir.join("motor.smbp.report.json"));
        assert_eq!(repaired.parent(), report.parent());
    }
}
