//! Log tail snapshot.
//!
//! Each log file is read once per validation run, bounded to its most recent
//! lines. Reads start at the end of the file and walk backward, so the cost
//! depends on the tail size and never on how long the log has grown. Reads
//! happen in parallel; the checks then look at the captured tails only, so
//! every check in one run sees the same evidence.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{error, warn};

use crate::cluster::NodeInfo;

/// Bytes read per backward step.
const BLOCK_SIZE: u64 = 64 * 1024;

/// Longest line kept; anything beyond is cut off.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Read the last `max_lines` lines of a file.
///
/// At most `(max_lines + 1) * MAX_LINE_BYTES` bytes are read from the end of
/// the file. A line that starts before that point is dropped, and kept lines
/// are cut to `MAX_LINE_BYTES`. Line endings are stripped. Invalid UTF-8 is
/// replaced rather than failing the whole read.
pub fn read_tail(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    let len = file.seek(SeekFrom::End(0))?;
    if max_lines == 0 || len == 0 {
        return Ok(Vec::new());
    }

    let budget = (max_lines as u64 + 1).saturating_mul(MAX_LINE_BYTES as u64);
    let floor = len.saturating_sub(budget);
    let mut start = len;
    let mut newlines = 0;
    let mut blocks = Vec::new();

    // One newline more than lines wanted proves the oldest kept line is whole.
    while start > floor && newlines <= max_lines {
        let step = (start - floor).min(BLOCK_SIZE);
        start -= step;
        let mut block = vec![0u8; step as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut block)?;
        newlines += block.iter().filter(|&&b| b == b'\n').count();
        blocks.push(block);
    }

    let mut buf = Vec::with_capacity((len - start) as usize);
    for block in blocks.iter().rev() {
        buf.extend_from_slice(block);
    }

    let mut body = &buf[..];
    if start > 0 {
        // Whatever precedes the first newline is the end of an older line.
        body = match body.iter().position(|&b| b == b'\n') {
            Some(at) => &body[at + 1..],
            None => &[],
        };
    }
    if let Some(stripped) = body.strip_suffix(b"\n") {
        body = stripped;
    }
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..]
        .iter()
        .map(|&line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let line = &line[..line.len().min(MAX_LINE_BYTES)];
            String::from_utf8_lossy(line).into_owned()
        })
        .collect())
}

/// What reading one log file produced.
#[derive(Debug, Clone)]
enum Tail {
    /// The log file does not exist.
    Missing,
    /// The file exists but could not be read.
    Unreadable,
    Lines(Vec<String>),
}

/// Tails of every node's log, captured at one point in time.
///
/// Keyed by log path: nodes sharing a file share one read.
#[derive(Debug, Default)]
pub struct LogSnapshot {
    tails: HashMap<PathBuf, Tail>,
}

impl LogSnapshot {
    /// Read up to `max_lines` from every node's log in parallel.
    pub fn capture(nodes: &[NodeInfo], max_lines: usize) -> Self {
        // First node per path names the file in log output.
        let mut files: BTreeMap<&Path, &NodeInfo> = BTreeMap::new();
        for node in nodes {
            files.entry(node.log_file.as_path()).or_insert(node);
        }

        let (tx, rx) = unbounded();
        thread::scope(|scope| {
            for (&path, &node) in &files {
                let tx = tx.clone();
                scope.spawn(move || {
                    let _ = tx.send((path.to_path_buf(), read_node(node, max_lines)));
                });
            }
        });
        drop(tx);

        LogSnapshot {
            tails: rx.iter().collect(),
        }
    }

    /// The last `lines` captured lines of `node`'s log.
    ///
    /// `None` when the log file is missing or the node was not captured. An
    /// unreadable log yields no lines.
    pub fn tail(&self, node: &NodeInfo, lines: usize) -> Option<&[String]> {
        match self.tails.get(&node.log_file)? {
            Tail::Missing => None,
            Tail::Unreadable => Some(&[][..]),
            Tail::Lines(all) => Some(&all[all.len().saturating_sub(lines)..]),
        }
    }
}

fn read_node(node: &NodeInfo, max_lines: usize) -> Tail {
    if !node.log_file.exists() {
        warn!(
            node_id = %node.node_id,
            log_file = %node.log_file.display(),
            "log file not found"
        );
        return Tail::Missing;
    }

    match read_tail(&node.log_file, max_lines) {
        Ok(lines) => Tail::Lines(lines),
        Err(e) => {
            error!(
                node_id = %node.node_id,
                log_file = %node.log_file.display(),
                error = %e,
                "error reading log file"
            );
            Tail::Unreadable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Role;
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn test_read_tail_keeps_last_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "line {}", i).unwrap();
        }
        let tail = read_tail(file.path(), 3).unwrap();
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);

        let all = read_tail(file.path(), 100).unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_read_tail_without_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first\r\nsecond").unwrap();
        assert_eq!(read_tail(file.path(), 5).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_read_tail_across_blocks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..20_000 {
            writeln!(file, "line {}", i).unwrap();
        }
        let tail = read_tail(file.path(), 10_000).unwrap();
        assert_eq!(tail.len(), 10_000);
        assert_eq!(tail[0], "line 10000");
        assert_eq!(tail[9_999], "line 19999");
    }

    #[test]
    fn test_read_tail_skips_huge_log_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // Sparse 64 MiB of zeros with no newline, then the real tail.
        file.as_file().set_len(64 << 20).unwrap();
        file.seek(SeekFrom::End(0)).unwrap();
        write!(file, "\nFailover election won\n").unwrap();

        let tail = read_tail(file.path(), 200).unwrap();
        assert_eq!(tail, vec!["Failover election won"]);
    }

    #[test]
    fn test_read_tail_caps_line_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let long = "x".repeat(MAX_LINE_BYTES + 100);
        write!(file, "short\n{}\nend\n", long).unwrap();

        let tail = read_tail(file.path(), 3).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0], "short");
        assert_eq!(tail[1].len(), MAX_LINE_BYTES);
        assert_eq!(tail[2], "end");
    }

    #[test]
    fn test_read_tail_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_tail(file.path(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.log");
        std::fs::write(&present, "a\nb\nc\n").unwrap();

        let make = |id: &str, path: std::path::PathBuf| NodeInfo {
            node_id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 7000,
            cluster_node_id: None,
            shard_id: 0,
            role: Role::Primary,
            log_file: path,
            pid: None,
        };
        let nodes = vec![
            make("present", present),
            make("missing", dir.path().join("missing.log")),
        ];

        let snapshot = LogSnapshot::capture(&nodes, 500);
        assert_eq!(snapshot.tail(&nodes[0], 2).unwrap(), &["b".to_string(), "c".to_string()]);
        assert!(snapshot.tail(&nodes[1], 2).is_none());
    }

    #[test]
    fn test_snapshot_keeps_duplicate_node_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let make = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            NodeInfo {
                node_id: "dup".to_string(),
                host: "127.0.0.1".to_string(),
                port: 7000,
                cluster_node_id: None,
                shard_id: 0,
                role: Role::Primary,
                log_file: path,
                pid: None,
            }
        };
        let nodes = vec![make("a.log", "from a\n"), make("b.log", "from b\n")];

        for _ in 0..10 {
            let snapshot = LogSnapshot::capture(&nodes, 10);
            assert_eq!(snapshot.tail(&nodes[0], 10).unwrap(), &["from a".to_string()]);
            assert_eq!(snapshot.tail(&nodes[1], 10).unwrap(), &["from b".to_string()]);
        }
    }
}
