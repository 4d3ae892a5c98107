//! Day-rotating log sink
//!
//! Append-only text sink taking a severity tag and one message line.
//! In file mode the destination rotates when the UTC calendar day
//! changes; without a directory it writes to stdout.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Timelike, Utc};
use parking_lot::Mutex;

/// Message severity, printed as a line prefix after the time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Fault,
}

impl Severity {
    fn tag(self) -> &'static str {
        match self {
            Severity::Info => "",
            Severity::Warn => "WARN: ",
            Severity::Fault => "FAULT: ",
        }
    }
}

enum Sink {
    Stdout,
    File {
        dir: PathBuf,
        prefix: String,
        day: Option<NaiveDate>,
        file: Option<File>,
    },
}

/// Append-only log sink with UTC day rotation
pub struct DayLog {
    inner: Mutex<Sink>,
}

/// Log file name for one UTC day
fn file_name(prefix: &str, day: NaiveDate) -> String {
    format!("{}{}.log", prefix, day.format("%Y%m%d"))
}

impl DayLog {
    /// Sink writing to stdout, no rotation
    pub fn stdout() -> Self {
        Self {
            inner: Mutex::new(Sink::Stdout),
        }
    }

    /// Sink writing `<prefix>YYYYMMDD.log` files under `dir`
    pub fn to_dir(dir: &Path, prefix: &str) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            inner: Mutex::new(Sink::File {
                dir: dir.to_path_buf(),
                prefix: prefix.to_string(),
                day: None,
                file: None,
            }),
        })
    }

    /// Append one line, rotating first if the UTC day has changed.
    ///
    /// Best effort: a failing destination is reported on stderr rather
    /// than propagated, so logging never takes the driver down.
    pub fn write(&self, severity: Severity, message: &str) {
        let now = Utc::now();
        let line = format!(
            "{:02}:{:02}:{:02} >> {}{}",
            now.hour(),
            now.minute(),
            now.second(),
            severity.tag(),
            message
        );

        let mut sink = self.inner.lock();
        match &mut *sink {
            Sink::Stdout => println!("{}", line),
            Sink::File {
                dir,
                prefix,
                day,
                file,
            } => {
                let today = now.date_naive();
                if *day != Some(today) || file.is_none() {
                    let path = dir.join(file_name(prefix, today));
                    match OpenOptions::new().create(true).append(true).open(&path) {
                        Ok(opened) => {
                            *file = Some(opened);
                            *day = Some(today);
                        }
                        Err(err) => {
                            eprintln!("cannot open log file {}: {}", path.display(), err);
                            return;
                        }
                    }
                }
                if let Some(file) = file.as_mut() {
                    if writeln!(file, "{}", line).and_then(|_| file.flush()).is_err() {
                        eprintln!("log write failed, line was: {}", line);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_embed_the_day() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        assert_eq!(file_name("timelatch_", day), "timelatch_20240601.log");
    }

    #[test]
    fn lines_accumulate_in_one_file_per_day() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = DayLog::to_dir(dir.path(), "test_").expect("create sink");

        log.write(Severity::Info, "first");
        log.write(Severity::Fault, "second");

        let today = Utc::now().date_naive();
        let contents =
            fs::read_to_string(dir.path().join(file_name("test_", today))).expect("log file");
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(">> first"));
        assert!(lines[1].contains(">> FAULT: second"));
    }

    #[test]
    fn stdout_sink_never_fails() {
        let log = DayLog::stdout();
        log.write(Severity::Warn, "goes to stdout");
    }
}
