//! Text formatting helpers for the fixed-column dashboard layout.

/// Render a lifetime in seconds as a compact human string.
pub fn format_lifetime(seconds: Option<u64>) -> String {
    let Some(s) = seconds else {
        return "-".to_string();
    };
    if s < 60 {
        format!("{}s", s)
    } else if s < 3_600 {
        format!("{}m {}s", s / 60, s % 60)
    } else if s < 86_400 {
        format!("{}h {}m", s / 3_600, (s % 3_600) / 60)
    } else {
        format!("{}d {}h", s / 86_400, (s % 86_400) / 3_600)
    }
}

/// Truncate to a display budget, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Left-align into a fixed-width cell, truncating when needed.
pub fn cell_left(s: &str, width: usize) -> String {
    format!("{:<width$}", truncate(s, width), width = width)
}

/// Right-align into a fixed-width cell, truncating when needed.
pub fn cell_right(s: &str, width: usize) -> String {
    format!("{:>width$}", truncate(s, width), width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lifetime_brackets() {
        assert_eq!(format_lifetime(Some(5)), "5s");
        assert_eq!(format_lifetime(Some(59)), "59s");
        assert_eq!(format_lifetime(Some(306)), "5m 6s");
        assert_eq!(format_lifetime(Some(3_723)), "1h 2m");
        assert_eq!(format_lifetime(Some(183_845)), "2d 3h");
        assert_eq!(format_lifetime(None), "-");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactlyten", 10), "exactlyten");
        assert_eq!(truncate("much too long", 8), "much to…");
        assert_eq!(truncate("anything", 0), "");
    }

    #[test]
    fn test_cells() {
        assert_eq!(cell_left("ab", 4), "ab  ");
        assert_eq!(cell_right("ab", 4), "  ab");
        assert_eq!(cell_left("abcdef", 4), "abc…");
    }
}
