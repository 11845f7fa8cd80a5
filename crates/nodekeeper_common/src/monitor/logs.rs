//! Incremental log tailing
//!
//! A [`LogSource`] hands out lines together with an opaque [`LogCursor`].
//! Fetching with the returned cursor yields only lines appended after it:
//! nothing is returned twice and nothing is skipped.

use crate::command::{describe, CommandRunner};
use crate::error::{KeeperError, KeeperResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Position in a log stream, meaningful only to the source that issued it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCursor(pub String);

/// Lines fetched in one call and the cursor to continue from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
    pub lines: Vec<String>,
    /// Unchanged from the request when nothing new was written
    pub cursor: Option<LogCursor>,
}

pub trait LogSource: Send {
    /// Lines after `cursor`. Without a cursor the source returns a short tail.
    fn fetch_since(&mut self, cursor: Option<&LogCursor>) -> KeeperResult<LogBatch>;
}

/// systemd journal of one unit
pub struct JournalLogSource {
    runner: Arc<dyn CommandRunner>,
    unit: String,
    initial_lines: usize,
    /// A cursorless fetch already took the tail; the journal was empty then,
    /// so everything in it now is new
    tailed: bool,
}

impl JournalLogSource {
    pub fn new(runner: Arc<dyn CommandRunner>, unit: impl Into<String>, initial_lines: usize) -> Self {
        Self {
            runner,
            unit: unit.into(),
            initial_lines,
            tailed: false,
        }
    }

    fn args(&self, cursor: Option<&LogCursor>) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            self.unit.clone(),
            "-o".to_string(),
            "json".to_string(),
            "--no-pager".to_string(),
        ];
        match cursor {
            Some(LogCursor(c)) => {
                args.push("--after-cursor".to_string());
                args.push(c.clone());
            }
            None if self.tailed => {}
            None => {
                args.push("-n".to_string());
                args.push(self.initial_lines.to_string());
            }
        }
        args
    }
}

/// `MESSAGE` is a string, or an array of bytes when it is not valid UTF-8
fn journal_message(entry: &Value) -> Option<String> {
    match entry.get("MESSAGE")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(bytes) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            Some(String::from_utf8_lossy(&raw).to_string())
        }
        _ => None,
    }
}

/// Parse `journalctl -o json` output, one entry per line
pub fn parse_journal(output: &str, previous: Option<&LogCursor>) -> KeeperResult<LogBatch> {
    let mut batch = LogBatch {
        lines: Vec::new(),
        cursor: previous.cloned(),
    };

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let entry: Value = serde_json::from_str(line)
            .map_err(|e| KeeperError::Command {
                command: "journalctl".to_string(),
                reason: format!("bad journal entry: {}", e),
            })?;
        if let Some(Value::String(cursor)) = entry.get("__CURSOR") {
            batch.cursor = Some(LogCursor(cursor.clone()));
        }
        if let Some(message) = journal_message(&entry) {
            batch.lines.push(message);
        }
    }

    Ok(batch)
}

impl LogSource for JournalLogSource {
    fn fetch_since(&mut self, cursor: Option<&LogCursor>) -> KeeperResult<LogBatch> {
        let args = self.args(cursor);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self
            .runner
            .run("journalctl", &arg_refs)?
            .into_stdout(&describe("journalctl", &arg_refs))?;
        let batch = parse_journal(&stdout, cursor)?;
        if cursor.is_none() {
            self.tailed = true;
        }
        Ok(batch)
    }
}

/// In-process log, shared between a writer and the monitor
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    lines: Arc<Mutex<Vec<String>>>,
    initial_lines: usize,
}

impl MemoryLogSource {
    pub fn new(initial_lines: usize) -> Self {
        Self {
            lines: Arc::default(),
            initial_lines,
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.into());
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSource for MemoryLogSource {
    fn fetch_since(&mut self, cursor: Option<&LogCursor>) -> KeeperResult<LogBatch> {
        let lines = self
            .lines
            .lock()
            .map_err(|_| KeeperError::Action("log buffer poisoned".into()))?;

        let start = match cursor {
            Some(LogCursor(c)) => c
                .parse::<usize>()
                .map_err(|_| KeeperError::Action(format!("foreign log cursor '{}'", c)))?
                .min(lines.len()),
            None => lines.len().saturating_sub(self.initial_lines),
        };

        Ok(LogBatch {
            lines: lines[start..].to_vec(),
            cursor: Some(LogCursor(lines.len().to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_memory_tail_then_incremental() {
        let source = MemoryLogSource::new(2);
        for i in 0..5 {
            source.append(format!("line {}", i));
        }
        let mut reader = source.clone();
        let first = reader.fetch_since(None).unwrap();
        assert_eq!(first.lines, vec!["line 3", "line 4"]);

        let empty = reader.fetch_since(first.cursor.as_ref()).unwrap();
        assert!(empty.lines.is_empty());
        assert_eq!(empty.cursor, first.cursor);

        source.append("line 5");
        let next = reader.fetch_since(empty.cursor.as_ref()).unwrap();
        assert_eq!(next.lines, vec!["line 5"]);
    }

    #[test]
    fn test_parse_journal_lines() {
        let out = concat!(
            r#"{"__CURSOR":"s=1;i=10","MESSAGE":"Imported new chain segment","_PID":"812"}"#,
            "\n",
            r#"{"__CURSOR":"s=1;i=11","MESSAGE":[76,111,111,107,105,110,103]}"#,
            "\n"
        );
        let batch = parse_journal(out, None).unwrap();
        assert_eq!(batch.lines, vec!["Imported new chain segment", "Looking"]);
        assert_eq!(batch.cursor, Some(LogCursor("s=1;i=11".into())));
    }

    #[test]
    fn test_parse_empty_journal_keeps_cursor() {
        let prev = LogCursor("s=1;i=11".into());
        let batch = parse_journal("", Some(&prev)).unwrap();
        assert!(batch.lines.is_empty());
        assert_eq!(batch.cursor, Some(prev));
    }

    struct RecordingRunner {
        calls: StdMutex<Vec<Vec<String>>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> KeeperResult<CommandOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.lock().unwrap().push(call);
            Ok(CommandOutput::ok(
                r#"{"__CURSOR":"c2","MESSAGE":"Synced"}"#.to_string() + "\n",
            ))
        }
    }

    /// journalctl over an in-memory journal: honours `-n` and
    /// `--after-cursor`, cursors are entry indexes
    #[derive(Default)]
    struct FakeJournal {
        entries: StdMutex<Vec<String>>,
    }

    impl FakeJournal {
        fn write(&self, message: String) {
            self.entries.lock().unwrap().push(message);
        }
    }

    impl CommandRunner for FakeJournal {
        fn run(&self, _program: &str, args: &[&str]) -> KeeperResult<CommandOutput> {
            let entries = self.entries.lock().unwrap();
            let value = |flag: &str| {
                args.iter()
                    .position(|a| *a == flag)
                    .and_then(|i| args.get(i + 1))
                    .map(|v| v.to_string())
            };
            let start = if let Some(after) = value("--after-cursor") {
                after.parse::<usize>().unwrap() + 1
            } else if let Some(n) = value("-n") {
                entries.len().saturating_sub(n.parse().unwrap())
            } else {
                0
            };
            let out: String = entries
                .iter()
                .enumerate()
                .skip(start)
                .map(|(i, m)| format!("{}\n", serde_json::json!({"__CURSOR": i.to_string(), "MESSAGE": m})))
                .collect();
            Ok(CommandOutput::ok(out))
        }
    }

    #[test]
    fn test_journal_empty_at_start_loses_nothing() {
        let journal = Arc::new(FakeJournal::default());
        let mut source = JournalLogSource::new(journal.clone(), "geth.service", 5);

        let first = source.fetch_since(None).unwrap();
        assert!(first.lines.is_empty());
        assert_eq!(first.cursor, None);

        for i in 0..12 {
            journal.write(format!("line {}", i));
        }
        let second = source.fetch_since(first.cursor.as_ref()).unwrap();
        let expected: Vec<String> = (0..12).map(|i| format!("line {}", i)).collect();
        assert_eq!(second.lines, expected);

        journal.write("line 12".to_string());
        let third = source.fetch_since(second.cursor.as_ref()).unwrap();
        assert_eq!(third.lines, vec!["line 12"]);
    }

    #[test]
    fn test_journal_first_fetch_is_a_tail() {
        let journal = Arc::new(FakeJournal::default());
        for i in 0..10 {
            journal.write(format!("old {}", i));
        }
        let mut source = JournalLogSource::new(journal.clone(), "geth.service", 3);
        let batch = source.fetch_since(None).unwrap();
        assert_eq!(batch.lines, vec!["old 7", "old 8", "old 9"]);
        assert_eq!(batch.cursor, Some(LogCursor("9".into())));
    }

    #[test]
    fn test_journal_arguments() {
        let runner = Arc::new(RecordingRunner {
            calls: StdMutex::new(Vec::new()),
        });
        let mut source = JournalLogSource::new(runner.clone(), "geth.service", 20);
        let batch = source.fetch_since(None).unwrap();
        source.fetch_since(batch.cursor.as_ref()).unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].join(" "), "journalctl -u geth.service -o json --no-pager -n 20");
        assert_eq!(
            calls[1].join(" "),
            "journalctl -u geth.service -o json --no-pager --after-cursor c2"
        );
    }
}
