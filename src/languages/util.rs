//! Common utilities for the regex-based language parsers.

/// End line index (0-based) of the brace block starting at or after
/// `start_line_idx`. Naive brace counting; strings and comments are not
/// treated specially.
pub fn find_block_end(source: &str, start_line_idx: usize) -> usize {
    let mut depth = 0usize;
    let mut started = false;
    for (i, line) in source.lines().enumerate().skip(start_line_idx) {
        for ch in line.chars() {
            if ch == '{' {
                depth += 1;
                started = true;
            }
            if ch == '}' {
                depth = depth.saturating_sub(1);
            }
        }
        if started && depth == 0 {
            return i;
        }
        // A declaration with no opening brace within a few lines is
        // treated as ending where it began.
        if !started && i >= start_line_idx + 2 {
            return start_line_idx;
        }
    }
    source.lines().count().saturating_sub(1).max(start_line_idx)
}

/// End line index (0-based) of an indentation block opened by the header
/// at `start_idx` (e.g. a Python `def`/`class`). The block runs until the
/// first non-blank line indented at or below the header's level.
pub fn indent_block_end(lines: &[&str], start_idx: usize) -> usize {
    let header_indent = indent_of(lines[start_idx]);
    let mut end = start_idx;
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= header_indent {
            break;
        }
        end = i;
    }
    end
}

pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_end_brace() {
        let src = "fn f() {\n  body();\n}\nfn g() {}\n";
        assert_eq!(find_block_end(src, 0), 2);
        assert_eq!(find_block_end(src, 3), 3);
    }

    #[test]
    fn braceless_declaration_ends_where_it_began() {
        let src = "type A = B;\n\n\nfn f() {}\n";
        assert_eq!(find_block_end(src, 0), 0);
    }

    #[test]
    fn block_end_indent() {
        let lines: Vec<&str> = "def f():\n    a\n\n    b\nx = 1\n".lines().collect();
        assert_eq!(indent_block_end(&lines, 0), 3);
    }

    #[test]
    fn indentation_width() {
        assert_eq!(indent_of("    x"), 4);
        assert_eq!(indent_of("\tx"), 1);
        assert_eq!(indent_of("x"), 0);
    }
}
