//! Per-file extraction run inside the worker pools.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::protocol::{Extraction, FileResult};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File not found.")]
    NotFound,

    #[error("{0}")]
    Io(io::Error),
}

impl From<io::Error> for ExtractError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ExtractError::NotFound,
            _ => ExtractError::Io(err),
        }
    }
}

/// The work done on each file of a batch.
pub trait FileProcessor: Send + Sync {
    fn process(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// Finds e-mail addresses and numeric dates and counts words.
///
/// Words are whitespace separated. Candidates are looked for inside each
/// word, so `contact:ana@example.com` still yields the address.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn extract(&self, content: &str) -> Extraction {
        let mut emails = BTreeSet::new();
        let mut dates = BTreeSet::new();
        let mut word_count = 0;

        for word in content.split_whitespace() {
            word_count += 1;
            for candidate in word.split(|c: char| !is_candidate_char(c)) {
                let token = candidate.trim_matches(|c: char| !c.is_ascii_alphanumeric());
                if is_email(token) {
                    emails.insert(token.to_string());
                } else if is_date(token) {
                    dates.insert(token.to_string());
                }
            }
        }

        let mut extraction = Extraction {
            word_count,
            ..Default::default()
        };
        extraction.categories.insert("emails".into(), emails.into_iter().collect());
        extraction.categories.insert("dates".into(), dates.into_iter().collect());
        extraction
    }
}

impl FileProcessor for TextExtractor {
    fn process(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = fs::read(path)?;
        Ok(self.extract(&String::from_utf8_lossy(&bytes)))
    }
}

/// Runs `processor` on `path` and wraps the outcome for the wire.
///
/// `pid` is reported as `pid_server`.
pub fn process_path(processor: &dyn FileProcessor, path: &Path, pid: u32) -> FileResult {
    let filename = display_name(path);
    match processor.process(path) {
        Ok(data) => FileResult::success(pid, filename, data),
        Err(err) => FileResult::error(pid, filename, err.to_string()),
    }
}

/// The file name reported back to the client.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Characters an address or a date can contain.
fn is_candidate_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "._%+-@/".contains(c)
}

/// `local@domain.tld` with a 2 to 7 letter top-level domain.
fn is_email(token: &str) -> bool {
    let Some((local, domain)) = token.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = (2..=7).contains(&tld.len()) && tld.chars().all(|c| c.is_ascii_alphabetic());
    local_ok && host_ok && tld_ok
}

/// `dd/mm/yyyy` or `yyyy-mm-dd`.
fn is_date(token: &str) -> bool {
    let parts: Vec<&str> = token.split('/').collect();
    if let [day, month, year] = parts.as_slice() {
        return digits(day, 2) && digits(month, 2) && digits(year, 4);
    }
    let parts: Vec<&str> = token.split('-').collect();
    if let [year, month, day] = parts.as_slice() {
        return digits(year, 4) && digits(month, 2) && digits(day, 2);
    }
    false
}

fn digits(part: &str, len: usize) -> bool {
    part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
}
