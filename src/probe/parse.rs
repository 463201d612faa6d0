//! Output parsing for probe results.
//!
//! Pure functions that turn raw container output into field values. `None`
//! means the output does not carry a usable value.

use regex::Regex;
use std::sync::LazyLock;

/// `pip show` metadata line carrying the installed version.
static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Version:(.*)$").expect("VERSION_LINE must compile")
});

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Clean the output of an `echo ${VAR}` probe.
///
/// Empty or whitespace-only output means the variable was unset.
pub fn echoed_value(output: &str) -> Option<String> {
    if output.trim().is_empty() {
        return None;
    }
    Some(output.replace('"', "").trim().to_string())
}

/// Version reported by `pip show`, if exactly one `Version:` line exists.
pub fn pip_version(output: &str) -> Option<String> {
    let mut versions = VERSION_LINE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().last().unwrap_or("").to_string());

    let first = versions.next()?;
    if versions.next().is_some() || first.is_empty() {
        return None;
    }
    Some(first)
}

/// Render an image size in bytes as gibibytes, e.g. `"3.0 GB"`.
///
/// Rounded to two decimals, halves to even, and always printed with a
/// fractional part.
pub fn format_size(bytes: f64) -> String {
    let gib = (bytes / GIB * 100.0).round_ties_even() / 100.0;
    if gib.fract() == 0.0 {
        format!("{:.1} GB", gib)
    } else {
        format!("{} GB", gib)
    }
}

/// Normalise a whitespace-separated list to `"a, b, c"`.
pub fn join_list(output: &str) -> String {
    output.split_whitespace().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoed_value_strips_quotes_and_whitespace() {
        assert_eq!(
            echoed_value("\"Ubuntu 20.04.3 LTS\"\n"),
            Some("Ubuntu 20.04.3 LTS".to_string())
        );
    }

    #[test]
    fn echoed_value_rejects_blank_output() {
        assert_eq!(echoed_value("\n"), None);
        assert_eq!(echoed_value("   \t\n"), None);
        assert_eq!(echoed_value(""), None);
    }

    #[test]
    fn pip_version_single_line() {
        let out = "Name: nvtabular\nVersion: 1.2.3\nSummary: GPU ETL\n";
        assert_eq!(pip_version(out), Some("1.2.3".to_string()));
    }

    #[test]
    fn pip_version_without_version_line() {
        assert_eq!(pip_version("Name: nvtabular\nSummary: GPU ETL\n"), None);
    }

    #[test]
    fn pip_version_with_two_version_lines_is_ambiguous() {
        let out = "Name: a\nVersion: 1.0\n---\nName: a\nVersion: 2.0\n";
        assert_eq!(pip_version(out), None);
    }

    #[test]
    fn pip_version_ignores_indented_marker() {
        let out = "Name: a\nVersion: 22.2.0\nDescription:\n  Version: nope\n";
        assert_eq!(pip_version(out), Some("22.2.0".to_string()));
    }

    #[test]
    fn pip_version_handles_crlf() {
        assert_eq!(pip_version("Version: 0.4.0\r\n"), Some("0.4.0".to_string()));
    }

    #[test]
    fn pip_version_with_empty_marker_is_rejected() {
        assert_eq!(pip_version("Version:\n"), None);
    }

    #[test]
    fn format_size_whole_gib() {
        assert_eq!(format_size(3221225472.0), "3.0 GB");
    }

    #[test]
    fn format_size_rounds_to_two_decimals() {
        // 12.3456 GiB
        assert_eq!(format_size(13_255_990_125.0), "12.35 GB");
        assert_eq!(format_size(1024.0 * 1024.0 * 1024.0 * 1.5), "1.5 GB");
    }

    #[test]
    fn format_size_rounds_halves_to_even() {
        // 0.125 GiB and 0.375 GiB are exact ties.
        assert_eq!(format_size(134_217_728.0), "0.12 GB");
        assert_eq!(format_size(402_653_184.0), "0.38 GB");
    }

    #[test]
    fn format_size_zero() {
        assert_eq!(format_size(0.0), "0.0 GB");
    }

    #[test]
    fn join_list_collapses_whitespace() {
        assert_eq!(join_list("60\n70\n75\n80\n"), "60, 70, 75, 80");
        assert_eq!(join_list(""), "");
    }
}
