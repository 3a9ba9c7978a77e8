//! Utility functions for the harness.

/// Writes a colored line diff between two strings to a writer.
pub fn write_diff(
    writer: &mut impl std::io::Write,
    indent: usize,
    left: &str,
    right: &str,
) -> std::io::Result<()> {
    use colored::Colorize;

    let indent_str = " ".repeat(indent);

    let diff = diff::lines(left, right);
    for d in diff {
        let formatted = match d {
            diff::Result::Left(l) => std::format!("{indent_str}- {l}").red(),
            diff::Result::Both(l, _) => std::format!("{indent_str}  {l}").bright_black(),
            diff::Result::Right(r) => std::format!("{indent_str}+ {r}").green(),
        };

        writeln!(writer, "{formatted}")?;
    }

    Ok(())
}

/// Renders a unified diff of two stdout captures, reference first.
///
/// Returns an empty string when the inputs are equal.
pub fn unified_stdout_diff(reference: &str, under_test: &str) -> String {
    if reference == under_test {
        return String::new();
    }

    let diff = similar::TextDiff::from_lines(reference, under_test);
    diff.unified_diff()
        .context_radius(3)
        .missing_newline_hint(true)
        .header("reference stdout", "under-test stdout")
        .to_string()
}

/// Gets the bash version string from the given bash path, if it is bash.
pub fn get_bash_version_str(bash_path: &std::path::Path) -> Option<String> {
    let output = std::process::Command::new(bash_path)
        .arg("--norc")
        .arg("--noprofile")
        .arg("-c")
        .arg("echo -n ${BASH_VERSINFO[0]}.${BASH_VERSINFO[1]}.${BASH_VERSINFO[2]}")
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let version = String::from_utf8(output.stdout).ok()?;
    let version = version.trim();
    if version.is_empty() || version == ".." {
        None
    } else {
        Some(version.to_owned())
    }
}
