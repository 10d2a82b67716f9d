//! `key=value` outputs for the CI orchestrator.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::domain::{MigrationReport, Result};

/// Write one `key=value` line per output, in report order.
pub fn write_outputs<W: Write>(report: &MigrationReport, mut writer: W) -> Result<()> {
    for (key, value) in report.outputs() {
        // One line per key.
        let value = value.replace(['\r', '\n'], " ");
        writeln!(writer, "{key}={value}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Append the outputs to the file named by `$GITHUB_OUTPUT`.
pub fn append_github_output(report: &MigrationReport, path: &Path) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    write_outputs(report, file)
}

/// Full report as pretty JSON.
pub fn report_json(report: &MigrationReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::{VersionSlot, VersionTag};

    fn report() -> MigrationReport {
        let version = VersionTag::new(6, 13);
        MigrationReport::none(VersionSlot {
            version,
            tag: version.tag_name("v"),
            dir: PathBuf::from("patches/6.13"),
        })
    }

    #[test]
    fn test_write_outputs_lines() {
        let mut buf = Vec::new();
        write_outputs(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "update_mode=none",
                "branch_name=",
                "next_dir=",
                "next_tag=",
                "current_dir=patches/6.13",
                "current_tag=v6.13",
                "has_errors=false",
                "failed_patches=",
            ]
        );
    }

    #[test]
    fn test_append_github_output_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_output");
        std::fs::write(&path, "earlier=1\n").unwrap();

        append_github_output(&report(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("earlier=1\nupdate_mode=none\n"));
    }

    #[test]
    fn test_report_json_has_mode() {
        let json = report_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "none");
        assert_eq!(value["current"]["tag"], "v6.13");
    }
}
