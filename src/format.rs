//! Terminal pretty-printing: the `Store » a » b » c` breadcrumb and
//! indented secret tree, and the aligned attribute listing with
//! eyes-only redaction. Purely cosmetic — no cryptographic awareness
//! beyond the boolean flags it is handed.

use std::path::Path;

use colored::Colorize;

use crate::metadata::AttributeMap;

fn breadcrumb(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    path.trim_matches('/').split('/').collect::<Vec<_>>().join(" » ")
}

/// Recursively print the secret tree rooted at `<vault>/<path>`.
pub fn print_tree(root: &Path, path: &str) {
    println!("Store » {}", breadcrumb(path).blue());
    print_tree_level(root, path, 0);
}

fn print_tree_level(root: &Path, path: &str, level: usize) {
    let dir_path = if path.is_empty() || path == "/" { root.to_path_buf() } else { root.join(path) };
    let mut entries: Vec<_> = match std::fs::read_dir(&dir_path) {
        Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };
    entries.sort_by_key(|e| e.file_name());

    let indent = "  ".repeat(level);
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == ".git" || name == "_vault.meta" || name == "_vault.meta.new" || name == "_vault.meta.lock" {
            continue;
        }
        let child_path = if path.is_empty() || path == "/" {
            name.clone()
        } else {
            format!("{path}/{name}")
        };

        if entry.path().is_dir() {
            println!("{indent}  » {}", name.blue());
            print_tree_level(root, &child_path, level + 1);
        } else {
            println!("{indent}  - {name}");
        }
    }
}

/// Print `path`'s attributes, redacting eyes-only values unless `reveal`
/// is set.
pub fn print_attributes(path: &str, attrs: &AttributeMap, reveal: bool) {
    println!("Store » {}", breadcrumb(path).blue());

    let max_len = attrs.keys().map(|k| k.len()).max().unwrap_or(0) + 2;
    for (name, attr) in attrs {
        let value = if attr.eyes_only && !reveal {
            "<redacted>".red().to_string()
        } else if attr.eyes_only {
            attr.value.red().to_string()
        } else if attr.file {
            "<binary content, use -w to write to disk>".to_string()
        } else {
            attr.value.clone()
        };
        println!(" {:>width$} {} {}", name.magenta(), "=".magenta(), value, width = max_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breadcrumb_joins_with_guillemets() {
        assert_eq!(breadcrumb("foo/bar/baz"), "foo » bar » baz");
        assert_eq!(breadcrumb(""), "/");
        assert_eq!(breadcrumb("/"), "/");
    }
}
