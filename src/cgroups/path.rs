//! Slice name to cgroup path mapping
//!
//! systemd nests slices by dash-separated prefix:
//! `a-b-c.slice` lives at `a.slice/a-b.slice/a-b-c.slice`, and `-.slice` is
//! the root of the hierarchy.

use std::path::PathBuf;

const SLICE_SUFFIX: &str = ".slice";
const ROOT_SLICE: &str = "-.slice";

/// Relative cgroup path of a slice unit
pub fn slice_path(slice: &str) -> PathBuf {
    let mut path = PathBuf::new();

    if slice.is_empty() || slice == ROOT_SLICE {
        return path;
    }

    let Some(stem) = slice.strip_suffix(SLICE_SUFFIX) else {
        // Not a slice name; use it verbatim
        path.push(slice);
        return path;
    };

    let mut prefix = String::new();
    for part in stem.split('-') {
        if !prefix.is_empty() {
            prefix.push('-');
        }
        prefix.push_str(part);
        path.push(format!("{}{}", prefix, SLICE_SUFFIX));
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_slice() {
        assert_eq!(slice_path("workload.slice"), PathBuf::from("workload.slice"));
        assert_eq!(slice_path("system.slice"), PathBuf::from("system.slice"));
    }

    #[test]
    fn test_nested_slice() {
        assert_eq!(
            slice_path("user-1000.slice"),
            PathBuf::from("user.slice/user-1000.slice")
        );
        assert_eq!(
            slice_path("a-b-c.slice"),
            PathBuf::from("a.slice/a-b.slice/a-b-c.slice")
        );
    }

    #[test]
    fn test_root_slice() {
        assert_eq!(slice_path("-.slice"), PathBuf::new());
        assert_eq!(slice_path(""), PathBuf::new());
    }
}
