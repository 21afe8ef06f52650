//! Line-oriented access to source files cached with a run

use std::collections::HashMap;

use super::database::{Db, StorageError};

const COMMENT_PREFIX: &str = "#";

/// Reads lines from the copies of source files stored for one run.
///
/// Bodies are fetched once per file and kept for the life of the cache.
/// Line numbers are 1-based; anything out of range reads as empty.
pub struct DbLineCache<'a> {
    db: &'a Db,
    run_id: String,
    files: HashMap<String, Vec<String>>,
}

impl<'a> DbLineCache<'a> {
    pub fn new(db: &'a Db, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: run_id.into(),
            files: HashMap::new(),
        }
    }

    fn lines(&mut self, filename: &str) -> Result<&[String], StorageError> {
        if !self.files.contains_key(filename) {
            let body = self.db.get_cached_file(&self.run_id, filename)?;
            let lines = body.lines().map(str::to_string).collect();
            self.files.insert(filename.to_string(), lines);
        }
        Ok(self.files.get(filename).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn getline(&mut self, filename: &str, line_no: usize) -> Result<String, StorageError> {
        let lines = self.lines(filename)?;
        Ok(line_no
            .checked_sub(1)
            .and_then(|idx| lines.get(idx))
            .cloned()
            .unwrap_or_default())
    }

    /// First line of the comment block directly above `start`.
    ///
    /// At most one blank line may separate the comments from `start`.
    /// Returns `start` itself when there is no such block.
    pub fn find_comment_block_start(&mut self, filename: &str, start: usize) -> Result<usize, StorageError> {
        let lines = self.lines(filename)?;
        let start_idx = start as isize - 1;
        let mut found_blank = false;
        let mut found_comments = false;
        let mut search = start_idx - 1;

        while search >= 0 {
            let Some(line) = lines.get(search as usize) else {
                break;
            };
            let line = line.trim_start();
            if line.is_empty() {
                if found_blank || found_comments {
                    search += 1;
                    break;
                }
                found_blank = true;
                search -= 1;
            } else if line.starts_with(COMMENT_PREFIX) {
                found_comments = true;
                search -= 1;
            } else {
                search += 1;
                break;
            }
        }

        let first = if found_comments { search.max(0) } else { start_idx };
        Ok((first + 1).max(1) as usize)
    }

    /// Lines `start..=end` joined with newlines, optionally extended upward
    /// to take in the comment block above.
    pub fn getlines(
        &mut self,
        filename: &str,
        start: usize,
        end: usize,
        include_comments: bool,
    ) -> Result<String, StorageError> {
        if start < 1 {
            return Ok(String::new());
        }
        let start = if include_comments {
            self.find_comment_block_start(filename, start)?
        } else {
            start
        };
        let lines = self.lines(filename)?;
        let end = end.min(lines.len());
        if start > end {
            return Ok(String::new());
        }
        Ok(lines[start - 1..end].join("\n"))
    }
}
