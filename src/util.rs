use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;

/// Escapes the characters that are special in HTML and XML text and
/// attribute values.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Keeps the first `length` characters of `data`, appending `end` if anything
/// was cut off.
pub fn trunc(data: &str, length: usize, end: &str) -> String {
    match data.char_indices().nth(length) {
        Some((i, _)) => format!("{}{}", &data[..i], end),
        None => data.to_owned(),
    }
}

/// Formats a timestamp as `2023-05-01 10:00:00`, the form used on pages.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Removes a file or a directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match path.is_dir() {
        true => std::fs::remove_dir_all(path),
        false => std::fs::remove_file(path),
    };
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#x27;s&lt;/a&gt;",
            escape_html("<a href=\"x\">Tom & Jerry's</a>")
        );
    }

    #[test]
    fn test_trunc() {
        assert_eq!("hello", trunc("hello", 5, " ..."));
        assert_eq!("hel ...", trunc("hello", 3, " ..."));
        assert_eq!("çé", trunc("çéà", 2, ""));
    }

    #[test]
    fn test_remove_path() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested)?;
        std::fs::write(nested.join("f.txt"), "x")?;
        remove_path(&dir.path().join("a"))?;
        assert!(!dir.path().join("a").exists());
        remove_path(&dir.path().join("missing"))?;
        Ok(())
    }
}
