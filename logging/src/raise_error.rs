use colored::*;

/// level 1: completion
/// level 2: info
/// level 3: warning
/// level 4: error
/// level 5: fatal error
pub fn format_error(string: &str, level: i8) -> ColoredString {
    match level {
        1 => ("completion: ".to_owned() + string).bright_green(),
        2 => ("info: ".to_owned() + string).bright_cyan(),
        3 => ("warning: ".to_owned() + string).bright_yellow(),
        4 => ("error: ".to_owned() + string).bright_red(),
        5 => ("fatal error: ".to_owned() + string).red().bold(),
        _ => string.red().bold().italic(),
    }
}

/// Reports a problem on stderr regardless of the log filter. The caller
/// decides whether to go on.
///
/// # Arguments
///
/// * `error` - A string slice that holds the error message
/// * `level` - The error level, higher means more severe
pub fn raise_error(error: &str, level: i8) {
    eprintln!("{}", format_error(error, level));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        assert!(format_error("bad.dot", 4).to_string().contains("error: bad.dot"));
        assert!(format_error("done", 1).to_string().contains("completion: done"));
    }
}
