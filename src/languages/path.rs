//! Path normalization for module specifiers.

/// Resolve a module specifier relative to the importing file. Relative
/// specifiers are joined against the importer's directory; bare or
/// aliased specifiers are returned as-is for the resolver to interpret.
pub fn resolve_relative(cur_file: &str, raw: &str) -> String {
    let spec = raw.trim().replace('\\', "/");
    if !(spec.starts_with("./") || spec.starts_with("../")) {
        return spec.trim_start_matches('/').to_string();
    }
    let cur = cur_file.replace('\\', "/");
    let base = match cur.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    normalize_segments(base, &spec)
}

/// Collapse `.` and `..` over forward-slash segments without touching
/// the filesystem. `..` at the root is dropped rather than preserved.
fn normalize_segments(base: &str, spec: &str) -> String {
    let mut stack: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in spec.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    stack.join("/")
}
