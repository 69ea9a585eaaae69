/// Rewrites a client-supplied filename into something safe to use on a local
/// filesystem.
///
/// Runs of control or non-ASCII characters collapse to a single space,
/// characters that are special on common filesystems become `_`, trailing
/// dots and spaces are trimmed, the result is truncated to `max_len` bytes,
/// and reserved Windows device names get a `_` appended. The degenerate
/// inputs `""`, `"."` and `".."` map to `"_"`, `"dot"` and `"dotdot"`.
pub(crate) fn sanitize(name: &str, max_len: usize) -> String {
    match name {
        "" => return "_".to_owned(),
        "." => return "dot".to_owned(),
        ".." => return "dotdot".to_owned(),
        _ => {}
    }

    let mut out = String::with_capacity(name.len());
    let mut in_stripped_run = false;

    for ch in name.chars() {
        if ch.is_control() || !ch.is_ascii() {
            if !in_stripped_run {
                out.push(' ');
                in_stripped_run = true;
            }
            continue;
        }
        in_stripped_run = false;

        match ch {
            '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"' => out.push('_'),
            _ => out.push(ch),
        }
    }

    while out.ends_with('.') || out.ends_with(' ') {
        out.pop();
    }

    // Everything left is ASCII, so byte truncation is char-safe.
    out.truncate(max_len);

    if out.is_empty() {
        return "_".to_owned();
    }

    if is_reserved_device_name(&out) {
        out.push('_');
    }

    out
}

fn is_reserved_device_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();

    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ if upper.len() == 4 => {
            let (device, digit) = upper.split_at(3);
            (device == "COM" || device == "LPT")
                && matches!(digit.as_bytes()[0], b'1'..=b'9')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_names() {
        assert_eq!(sanitize("", 128), "_");
        assert_eq!(sanitize(".", 128), "dot");
        assert_eq!(sanitize("..", 128), "dotdot");
    }

    #[test]
    fn reserved_device_names() {
        assert_eq!(sanitize("CON", 128), "CON_");
        assert_eq!(sanitize("prn", 128), "prn_");
        assert_eq!(sanitize("COM1", 128), "COM1_");
        assert_eq!(sanitize("lpt9", 128), "lpt9_");
        assert_eq!(sanitize("CONSOLE", 128), "CONSOLE");
        assert_eq!(sanitize("COM0", 128), "COM0");
    }

    #[test]
    fn special_characters_become_underscores() {
        assert_eq!(sanitize("a/b\\c?d", 128), "a_b_c_d");
        assert_eq!(sanitize("<x>:*|\"", 128), "_x_____");
    }

    #[test]
    fn non_ascii_runs_collapse_to_one_space() {
        assert_eq!(sanitize("Iğdır", 128), "I d r");
        assert_eq!(sanitize("file😊😊name", 128), "file name");
        assert_eq!(sanitize("tab\there", 128), "tab here");
    }

    #[test]
    fn trailing_dots_and_spaces_are_trimmed() {
        assert_eq!(sanitize("report.txt...", 128), "report.txt");
        assert_eq!(sanitize("report   ", 128), "report");
        assert_eq!(sanitize("  . .", 128), "_");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(300);
        let sanitized = sanitize(&long, 128);
        assert_eq!(sanitized.len(), 128);
        assert_eq!(sanitized, "x".repeat(128));
    }
}
