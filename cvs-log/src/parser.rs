use std::{collections::VecDeque, io::BufRead, mem};

use nom::{
    bytes::complete::{tag, take_till1, take_while1},
    character::complete::multispace1,
    combinator::rest,
    sequence::{preceded, separated_pair},
    IResult,
};

use crate::{
    date::DateParser,
    paths::strip_rcs_path,
    types::{Event, RevisionRecord},
    Error,
};

const LOG_BOUNDARY: &str = "----------------------------";
const FILE_BOUNDARY: &str =
    "=============================================================================";

/// Per-revision log bodies are capped; anything beyond this is truncated at a
/// line boundary with a warning.
const MAX_LOG_LEN: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedFile,
    NeedSyms,
    NeedEos,
    NeedStartLog,
    NeedRevision,
    NeedDateAuthorState,
    NeedEom,
}

/// The `cvs log` state machine.
///
/// Lines are consumed one at a time; [`Event`]s come out. The parser owns the
/// strip prefix so it can discard files that belong to a different Repository
/// path before anything downstream sees them.
pub struct Parser<R> {
    input: R,
    strip_prefix: String,
    dates: DateParser,
    state: State,
    pending: VecDeque<Event>,

    rev: String,
    date: i64,
    author: String,
    dead: bool,
    log: String,
    have_log: bool,
    log_full: bool,
}

impl<R: BufRead> Parser<R> {
    pub fn new(input: R, strip_prefix: &str) -> Self {
        Self {
            input,
            strip_prefix: strip_prefix.into(),
            dates: DateParser::new(),
            state: State::NeedFile,
            pending: VecDeque::new(),
            rev: String::new(),
            date: 0,
            author: String::new(),
            dead: false,
            log: String::new(),
            have_log: false,
            log_full: false,
        }
    }

    /// Returns the next event, or `None` at a clean end of input.
    ///
    /// The only states the log may legitimately end in are NEED_FILE (between
    /// files) and NEED_SYMS (a server that emits no symbol table at all, which
    /// gets its own diagnostic since `--norc` is the usual remedy).
    pub fn next_event(&mut self) -> Result<Option<Event>, Error> {
        let mut buf = Vec::new();

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            buf.clear();
            if self.input.read_until(b'\n', &mut buf)? == 0 {
                return match self.state {
                    State::NeedFile => Ok(None),
                    State::NeedSyms => Err(Error::NoSymbolicNames),
                    _ => Err(Error::UnexpectedEof),
                };
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            log::trace!("state {:?}: {}", self.state, line);
            self.handle_line(line);
        }
    }

    fn handle_line(&mut self, line: &str) {
        match self.state {
            State::NeedFile => {
                if let Ok((_, raw)) = rcs_file_line(line) {
                    let raw = raw.strip_suffix(",v").unwrap_or(raw);
                    match strip_rcs_path(raw, &self.strip_prefix) {
                        Some(path) => {
                            self.pending.push_back(Event::File { path });
                            self.state = State::NeedSyms;
                        }
                        None => {
                            log::warn!(
                                "file {} doesn't match strip path {}, ignoring",
                                raw,
                                self.strip_prefix
                            );
                        }
                    }
                }
            }
            State::NeedSyms => {
                if line.starts_with("symbolic names:") {
                    self.state = State::NeedEos;
                }
            }
            State::NeedEos => {
                if !line.is_empty() && !line.starts_with(char::is_whitespace) {
                    self.pending.push_back(Event::SymbolsEnd);
                    self.state = State::NeedStartLog;
                } else if let Ok((_, (tag, rev))) = symbol_line(line) {
                    self.pending.push_back(Event::Symbol {
                        tag: tag.into(),
                        rev: rev.trim().into(),
                    });
                }
            }
            State::NeedStartLog => {
                if line == LOG_BOUNDARY {
                    self.state = State::NeedRevision;
                }
            }
            State::NeedRevision => {
                // The revision line can carry "locked by" noise after the
                // number; the nom parser stops at the first byte that isn't
                // part of a dotted number.
                if let Ok((_, rev)) = revision_line(line) {
                    self.rev = rev.into();
                    self.date = 0;
                    self.author = String::from("unknown");
                    self.dead = false;
                    self.log.clear();
                    self.have_log = false;
                    self.log_full = false;
                    self.state = State::NeedDateAuthorState;
                }
            }
            State::NeedDateAuthorState => {
                if let Some(fields) = line.strip_prefix("date:") {
                    let date_str = fields.split(';').next().unwrap_or("").trim();
                    match self.dates.parse(date_str) {
                        Some(date) => self.date = date,
                        None => log::warn!("unparseable date {:?}, treating as epoch", date_str),
                    }

                    if let Some(author) = find_field(line, "author: ") {
                        self.author = author.into();
                    }
                    self.dead = find_field(line, "state: ") == Some("dead");

                    self.state = State::NeedEom;
                }
            }
            State::NeedEom => {
                if line == LOG_BOUNDARY {
                    self.finish_record();
                    self.state = State::NeedRevision;
                } else if line == FILE_BOUNDARY {
                    self.finish_record();
                    self.pending.push_back(Event::FileEnd);
                    self.state = State::NeedFile;
                } else if self.have_log || !is_revision_metadata(line) {
                    self.append_log(line);
                } else {
                    log::trace!("ignoring unhandled info {}", line);
                }
            }
        }
    }

    fn finish_record(&mut self) {
        self.pending.push_back(Event::Revision(RevisionRecord {
            rev: mem::take(&mut self.rev),
            date: self.date,
            author: mem::take(&mut self.author),
            dead: self.dead,
            log: mem::take(&mut self.log),
        }));
    }

    fn append_log(&mut self, line: &str) {
        if self.log_full {
            return;
        }

        if self.log.len() + line.len() + 1 > MAX_LOG_LEN {
            log::warn!("maximum log length exceeded, truncating log");

            let mut cut = MAX_LOG_LEN.saturating_sub(self.log.len() + 1);
            while cut > 0 && !line.is_char_boundary(cut) {
                cut -= 1;
            }
            self.log.push_str(&line[..cut]);
            self.log.push('\n');
            self.log_full = true;
        } else {
            self.log.push_str(line);
            self.log.push('\n');
        }

        self.have_log = true;
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

fn rcs_file_line(line: &str) -> IResult<&str, &str> {
    preceded(tag("RCS file: "), rest)(line)
}

fn symbol_line(line: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        preceded(multispace1, take_till1(|c| c == ':')),
        tag(":"),
        rest,
    )(line)
}

fn revision_line(line: &str) -> IResult<&str, &str> {
    preceded(
        tag("revision "),
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
    )(line)
}

/// Extracts the value of a `key: value;` field from the date line. Fields
/// without the closing semicolon don't count, matching the original scanner.
fn find_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = &line[line.find(key)? + key.len()..];
    rest.find(';').map(|end| &rest[..end])
}

/// Auxiliary `key: value;` lines (`branches:`, lock information, ...) can
/// precede the log body. A line counts as metadata when a colon appears
/// before any space and the line is semicolon-terminated; once body text has
/// started, nothing is metadata.
fn is_revision_metadata(line: &str) -> bool {
    let colon = match line.find(':') {
        Some(i) => i,
        None => return false,
    };

    if let Some(space) = line.find(' ') {
        if space < colon {
            return false;
        }
    }

    line.ends_with(';')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_LOG: &str = "\
RCS file: /cvsroot/mod/dir/a.c,v
Working file: dir/a.c
head: 1.2
branch:
locks: strict
access list:
symbolic names:
\tRELEASE_1: 1.2
\tFEATURE: 1.1.0.2
keyword substitution: kv
total revisions: 2;\tselected revisions: 2
description:
----------------------------
revision 1.2\tlocked by: david;
date: 2003/03/13 00:18:20;  author: david;  state: Exp;  lines: +1 -1
fix the thing
----------------------------
revision 1.1
date: 2003/03/12 00:00:00;  author: david;  state: dead;
branches:  1.1.2;
initial
=============================================================================
";

    #[test]
    fn test_simple_log() {
        let events = parse(SIMPLE_LOG, "/cvsroot/mod/").unwrap();

        assert_eq!(
            events,
            vec![
                Event::File {
                    path: String::from("dir/a.c")
                },
                Event::Symbol {
                    tag: String::from("RELEASE_1"),
                    rev: String::from("1.2")
                },
                Event::Symbol {
                    tag: String::from("FEATURE"),
                    rev: String::from("1.1.0.2")
                },
                Event::SymbolsEnd,
                Event::Revision(RevisionRecord {
                    rev: String::from("1.2"),
                    date: 1047514700,
                    author: String::from("david"),
                    dead: false,
                    log: String::from("fix the thing\n"),
                }),
                Event::Revision(RevisionRecord {
                    rev: String::from("1.1"),
                    date: 1047427200,
                    author: String::from("david"),
                    dead: true,
                    log: String::from("initial\n"),
                }),
                Event::FileEnd,
            ]
        );
    }

    #[test]
    fn test_metadata_before_body() {
        // The branches: line is metadata only while no body has accumulated;
        // the same shape inside the body is kept verbatim.
        let log = log_with_body("branches:  1.1.2;\nreal body\nbranches:  9.9.9;\n");
        let events = parse(&log, "/r/").unwrap();

        assert_eq!(
            record(&events).log,
            "real body\nbranches:  9.9.9;\n"
        );
    }

    #[test]
    fn test_missing_author_defaults_to_unknown() {
        let log = "\
RCS file: /r/a,v
symbolic names:
description:
----------------------------
revision 1.1
date: 2003/03/12 00:00:00;  state: Exp;
body
=============================================================================
";
        let events = parse(log, "/r/").unwrap();
        assert_eq!(record(&events).author, "unknown");
    }

    #[test]
    fn test_log_truncation() {
        let long_line = "x".repeat(2 * MAX_LOG_LEN);
        let log = log_with_body(&format!("{}\nafterwards\n", long_line));

        let events = parse(&log, "/r/").unwrap();
        let body = &record(&events).log;

        assert!(body.len() <= MAX_LOG_LEN);
        assert!(body.ends_with('\n'));
        assert!(!body.contains("afterwards"));
    }

    #[test]
    fn test_prefix_mismatch_skips_file() {
        let mut log = String::from(
            "RCS file: /elsewhere/b.c,v\nsymbolic names:\ndescription:\n",
        );
        // Without a matching prefix the parser never leaves NEED_FILE, so the
        // whole entry is skipped and the next file parses normally.
        log.push_str(SIMPLE_LOG);

        let events = parse(&log, "/cvsroot/mod/").unwrap();
        assert_eq!(
            events[0],
            Event::File {
                path: String::from("dir/a.c")
            }
        );
    }

    #[test]
    fn test_terminal_states() {
        // Mid-entry EOF is a structural error.
        assert!(matches!(
            parse("RCS file: /r/a,v\nsymbolic names:\n\tT: 1.1\n", "/r/"),
            Err(Error::UnexpectedEof)
        ));

        // A log that never shows a symbol table gets the --norc hint.
        assert!(matches!(
            parse("RCS file: /r/a,v\nhead: 1.1\n", "/r/"),
            Err(Error::NoSymbolicNames)
        ));

        // Empty input is fine.
        assert_eq!(parse("", "/r/").unwrap(), vec![]);
    }

    fn parse(input: &str, prefix: &str) -> Result<Vec<Event>, Error> {
        Parser::new(input.as_bytes(), prefix).collect()
    }

    fn record(events: &[Event]) -> &RevisionRecord {
        events
            .iter()
            .find_map(|event| match event {
                Event::Revision(record) => Some(record),
                _ => None,
            })
            .unwrap()
    }

    fn log_with_body(body: &str) -> String {
        format!(
            "RCS file: /r/a,v\n\
             symbolic names:\n\
             description:\n\
             ----------------------------\n\
             revision 1.1\n\
             date: 2003/03/12 00:00:00;  author: alice;  state: Exp;\n\
             {}=============================================================================\n",
            body
        )
    }
}
