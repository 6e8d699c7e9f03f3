// THEORY:
// Frame lists arrive as file names, one per line, usually produced by a shell
// glob or an extraction tool. Frame indices are positions in this list, so the
// list must be in capture order: names are sorted naturally ("frame2" before
// "frame10"), and names that point at nothing usable are dropped up front so
// they never occupy an index.

use crate::error::Result;
use std::cmp::Ordering;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads frame names from `reader`, one per line, up to the first blank line
/// or end of input, then filters and sorts them.
pub fn read_frame_names<R: BufRead>(reader: R) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            break;
        }
        names.push(PathBuf::from(name));
    }
    Ok(prepare_frames(names))
}

/// Drops missing or empty files and sorts the rest in natural order.
pub fn prepare_frames(names: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut frames: Vec<PathBuf> = names.into_iter().filter(|p| is_usable(p)).collect();
    frames.sort_by(|a, b| {
        natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()).then_with(|| a.cmp(b))
    });
    debug!(count = frames.len(), "frame list prepared");
    frames
}

fn is_usable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => true,
        Ok(_) => {
            warn!(path = %path.display(), "skipping empty file");
            false
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable file");
            false
        }
    }
}

/// Compares strings with embedded digit runs by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (digits_a, rest_a) = split_digits(a);
                let (digits_b, rest_b) = split_digits(b);
                match compare_numbers(digits_a, digits_b) {
                    Ordering::Equal => (a, b) = (rest_a, rest_b),
                    unequal => return unequal,
                }
            }
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => (a, b) = (&a[1..], &b[1..]),
                unequal => return unequal,
            },
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let n = s.iter().take_while(|c| c.is_ascii_digit()).count();
    s.split_at(n)
}

// Numeric comparison of arbitrarily long digit runs.
fn compare_numbers(a: &[u8], b: &[u8]) -> Ordering {
    let trim = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
    let (a, b) = (&a[trim(a)..], &b[trim(b)..]);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    #[test]
    fn digit_runs_compare_numerically() {
        assert_eq!(natural_cmp("frame2", "frame10"), Ordering::Less);
        assert_eq!(natural_cmp("frame10", "frame9"), Ordering::Greater);
        assert_eq!(natural_cmp("frame007", "frame7"), Ordering::Equal);
        assert_eq!(natural_cmp("a1b2", "a1b10"), Ordering::Less);
    }

    #[test]
    fn text_compares_bytewise() {
        assert_eq!(natural_cmp("abc", "abd"), Ordering::Less);
        assert_eq!(natural_cmp("ab", "abc"), Ordering::Less);
        assert_eq!(natural_cmp("b1", "a9"), Ordering::Greater);
    }

    #[test]
    fn huge_numbers_do_not_overflow() {
        assert_eq!(
            natural_cmp("x99999999999999999999999", "x100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn names_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["img10.png", "img2.png", "img1.png"] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        fs::write(dir.path().join("img3.png"), b"").unwrap();

        let listing = ["img10.png", "img2.png", "img3.png", "img4.png", "img1.png"]
            .iter()
            .map(|n| dir.path().join(n).display().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let frames = read_frame_names(Cursor::new(listing)).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["img1.png", "img2.png", "img10.png"]);
    }

    #[test]
    fn reading_stops_at_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a1.png");
        let b = dir.path().join("a2.png");
        fs::write(&a, b"x").unwrap();
        fs::write(&b, b"x").unwrap();
        let listing = format!("{}\n\n{}\n", a.display(), b.display());
        let frames = read_frame_names(Cursor::new(listing)).unwrap();
        assert_eq!(frames, vec![a]);
    }
}
