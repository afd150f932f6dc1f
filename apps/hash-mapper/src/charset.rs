//! Charset loading: file contents or the built-in default, normalised into an
//! `Alphabet` (trimmed, deduplicated, sorted).

use std::path::Path;

use domain::Alphabet;
use tracing::{info, warn};

use crate::error::AppError;

/// Used when no charset file is given, the file is missing, or it is empty.
pub const DEFAULT_CHARSET: &str =
    "abcdefghijklmnopqrstuvwxyz1234567890`~-_=+[]{}\\/|;:'\",.<>?!@#$%^&*()";

/// Resolve the run's alphabet from an optional charset file.
pub fn load(path: Option<&Path>) -> Result<Alphabet, AppError> {
    let text = match path {
        None => {
            warn!("No charset file provided. Using default charset.");
            DEFAULT_CHARSET.to_string()
        }
        Some(p) if !p.exists() => {
            warn!(path = %p.display(), "charset file does not exist. Using default charset.");
            DEFAULT_CHARSET.to_string()
        }
        Some(p) => {
            info!(path = %p.display(), "reading charset");
            let raw = std::fs::read_to_string(p).map_err(|source| AppError::Charset {
                path: p.to_path_buf(),
                source,
            })?;
            if raw.trim().is_empty() {
                warn!(path = %p.display(), "charset file is empty. Using default charset.");
                DEFAULT_CHARSET.to_string()
            } else {
                raw
            }
        }
    };
    Ok(Alphabet::from_text(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_charset_has_no_duplicates() {
        let a = load(None).unwrap();
        assert_eq!(a.len(), DEFAULT_CHARSET.chars().count());
        let sorted: Vec<char> = {
            let mut v: Vec<char> = DEFAULT_CHARSET.chars().collect();
            v.sort_unstable();
            v
        };
        assert_eq!(a.symbols(), &sorted[..]);
    }

    #[test]
    fn file_is_trimmed_deduplicated_and_sorted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "  cbacab  ").unwrap();
        let a = load(Some(f.path())).unwrap();
        assert_eq!(a.as_string(), "abc");
    }

    #[test]
    fn missing_or_empty_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert_eq!(load(Some(missing.as_path())).unwrap(), load(None).unwrap());

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, " \n\t").unwrap();
        assert_eq!(load(Some(empty.as_path())).unwrap(), load(None).unwrap());
    }

    #[test]
    fn unreadable_path_is_an_error() {
        // a directory exists but cannot be read as a file
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(Some(dir.path())), Err(AppError::Charset { .. })));
    }
}
