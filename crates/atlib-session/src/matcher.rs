//! Event table: a prefix tree of unsolicited-line patterns.
//!
//! Firmware announces asynchronous happenings with lines such as
//! `+CREG: 1,2`, `+EVT:RX_1:-70:8:UNICAST:1:4865` or `%CONNECT,0011...`. A
//! chip family describes the lines it understands as an [`EventTable`]: an
//! ordered tree whose interior nodes are categories (`EVT`) and whose leaves
//! are event identifiers (`RX_1` -> `LoraEvent::Received`). Resolving a line
//! walks the tree one token at a time and returns the event plus the
//! unconsumed remainder of the line, which the family's decoder parses.
//!
//! # Matching rules
//!
//! - Tokens are matched exactly and case-sensitively.
//! - A token matches only if it is followed by one of the level's delimiters
//!   or by the end of the line. `CWJAP` therefore never matches `CWJAPX`.
//! - Siblings are tried in the order they were added; the first match wins.
//! - A level may carry an "otherwise" entry, taken when no sibling matches.
//!   It consumes nothing, so the event receives the whole remaining text.
//! - Spaces directly after a consumed delimiter are skipped (`+CREG: 1`
//!   yields the arguments `1`).
//!
//! Lines without a sentinel are matched against a separate flat list of
//! "bare" entries (`ready`, `WIFI CONNECTED`, `RING`) using the same rules.
//!
//! # Example
//!
//! ```
//! use atlib_session::matcher::EventTable;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Ev { Joined, Received, Registration }
//!
//! let table = EventTable::builder()
//!     .category("EVT", |evt| evt.event("JOINED", Ev::Joined).event("RX_1", Ev::Received))
//!     .event("CREG", Ev::Registration)
//!     .build()
//!     .unwrap();
//!
//! let m = table.resolve("EVT:RX_1:-70:8").unwrap();
//! assert_eq!(m.event, Ev::Received);
//! assert_eq!(m.args, "-70:8");
//! ```

use atlib_core::error::{Error, Result};

/// Delimiters accepted by a level unless it is given its own set.
pub const DEFAULT_DELIMITERS: &[char] = &[':', ',', '=', ' '];

/// What a matched entry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec<E> {
    /// The event identifier.
    pub event: E,
    /// Number of following lines that belong to this event verbatim and
    /// must not be classified.
    pub trailing_lines: usize,
}

/// A successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMatch<'a, E> {
    pub event: E,
    /// Unconsumed remainder of the line.
    pub args: &'a str,
    /// Copied from the matching [`EventSpec`].
    pub trailing_lines: usize,
}

#[derive(Debug, Clone)]
enum Node<E> {
    Event(EventSpec<E>),
    Table(Level<E>),
}

#[derive(Debug, Clone)]
struct Entry<E> {
    token: String,
    node: Node<E>,
}

#[derive(Debug, Clone)]
struct Level<E> {
    /// Empty means [`DEFAULT_DELIMITERS`].
    delimiters: Vec<char>,
    entries: Vec<Entry<E>>,
    otherwise: Option<EventSpec<E>>,
}

impl<E> Level<E> {
    fn new() -> Self {
        Level {
            delimiters: Vec::new(),
            entries: Vec::new(),
            otherwise: None,
        }
    }

    fn is_delimiter(&self, c: char) -> bool {
        if self.delimiters.is_empty() {
            DEFAULT_DELIMITERS.contains(&c)
        } else {
            self.delimiters.contains(&c)
        }
    }

    /// First entry whose token heads `text`, with the text after it.
    fn find<'t>(&self, text: &'t str) -> Option<(&Entry<E>, &'t str)> {
        self.entries.iter().find_map(|entry| {
            debug_assert!(!entry.token.is_empty(), "event table holds an empty token");
            let after = text.strip_prefix(entry.token.as_str())?;
            let mut chars = after.chars();
            match chars.next() {
                None => Some((entry, after)),
                Some(c) if self.is_delimiter(c) => {
                    Some((entry, chars.as_str().trim_start_matches(' ')))
                }
                Some(_) => None,
            }
        })
    }

    fn position(&self, token: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.token == token)
    }

    fn collect(&self, prefix: &str, out: &mut Vec<(String, E, usize)>)
    where
        E: Copy,
    {
        for entry in &self.entries {
            let path = if prefix.is_empty() {
                entry.token.clone()
            } else {
                format!("{prefix}:{}", entry.token)
            };
            match &entry.node {
                Node::Event(spec) => out.push((path, spec.event, spec.trailing_lines)),
                Node::Table(child) => child.collect(&path, out),
            }
        }
        if let Some(spec) = &self.otherwise {
            let path = if prefix.is_empty() {
                "*".to_string()
            } else {
                format!("{prefix}:*")
            };
            out.push((path, spec.event, spec.trailing_lines));
        }
    }
}

/// A read-only event pattern tree, built once per chip family.
#[derive(Debug, Clone)]
pub struct EventTable<E> {
    root: Level<E>,
    bare: Level<E>,
}

impl<E: Copy> EventTable<E> {
    /// Start building a table.
    pub fn builder() -> EventTableBuilder<E> {
        EventTableBuilder {
            root: LevelBuilder::new(),
            bare: Level::new(),
            error: None,
        }
    }

    /// A table that resolves nothing.
    pub fn empty() -> Self {
        EventTable {
            root: Level::new(),
            bare: Level::new(),
        }
    }

    /// Resolve the text of a sentinel line (sentinel already removed).
    pub fn resolve<'a>(&self, text: &'a str) -> Result<EventMatch<'a, E>> {
        let mut level = &self.root;
        let mut rest = text;
        loop {
            match level.find(rest) {
                Some((entry, after)) => match &entry.node {
                    Node::Event(spec) => return Ok(matched(spec, after)),
                    Node::Table(child) => {
                        level = child;
                        rest = after;
                    }
                },
                None => {
                    return match &level.otherwise {
                        Some(spec) => Ok(matched(spec, rest)),
                        None => Err(Error::UnknownEvent(text.to_string())),
                    };
                }
            }
        }
    }

    /// Resolve a line that carries no sentinel.
    pub fn resolve_bare<'a>(&self, line: &'a str) -> Result<EventMatch<'a, E>> {
        match self.bare.find(line) {
            Some((entry, after)) => match &entry.node {
                Node::Event(spec) => Ok(matched(spec, after)),
                Node::Table(_) => Err(Error::UnknownEvent(line.to_string())),
            },
            None => Err(Error::UnknownEvent(line.to_string())),
        }
    }

    /// Every terminal entry as `(path, event, trailing_lines)`, in match
    /// order. Path tokens are joined with `:`; `*` marks an otherwise entry
    /// and bare entries are listed last, unprefixed.
    pub fn entries(&self) -> Vec<(String, E, usize)> {
        let mut out = Vec::new();
        self.root.collect("", &mut out);
        self.bare.collect("", &mut out);
        out
    }

    /// Number of terminal entries, otherwise entries included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matched<'a, E: Copy>(spec: &EventSpec<E>, args: &'a str) -> EventMatch<'a, E> {
    EventMatch {
        event: spec.event,
        args,
        trailing_lines: spec.trailing_lines,
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Builder for one level of the tree. Obtained inside
/// [`EventTableBuilder::category`] and [`LevelBuilder::category`].
#[derive(Debug)]
pub struct LevelBuilder<E> {
    level: Level<E>,
    error: Option<Error>,
}

impl<E: Copy> LevelBuilder<E> {
    fn new() -> Self {
        LevelBuilder {
            level: Level::new(),
            error: None,
        }
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(Error::InvalidParameter(message));
        }
    }

    fn push(&mut self, token: &str, node: Node<E>) {
        if token.is_empty() {
            self.fail("event token must not be empty".into());
        } else if self.level.position(token).is_some() {
            self.fail(format!("duplicate event token {token:?}"));
        } else {
            self.level.entries.push(Entry {
                token: token.to_string(),
                node,
            });
        }
    }

    /// Restrict this level to the given delimiters.
    pub fn delimiters(mut self, delimiters: &[char]) -> Self {
        if delimiters.is_empty() {
            self.fail("delimiter set must not be empty".into());
        } else {
            self.level.delimiters = delimiters.to_vec();
        }
        self
    }

    /// Add a terminal entry.
    pub fn event(self, token: &str, event: E) -> Self {
        self.event_with_lines(token, event, 0)
    }

    /// Add a terminal entry whose next `trailing_lines` lines are payload.
    pub fn event_with_lines(mut self, token: &str, event: E, trailing_lines: usize) -> Self {
        self.push(
            token,
            Node::Event(EventSpec {
                event,
                trailing_lines,
            }),
        );
        self
    }

    /// Add a category entry whose children are built by `build`.
    pub fn category(mut self, token: &str, build: impl FnOnce(Self) -> Self) -> Self {
        let child = build(LevelBuilder::new());
        if let Some(err) = child.error {
            if self.error.is_none() {
                self.error = Some(err);
            }
            return self;
        }
        self.push(token, Node::Table(child.level));
        self
    }

    /// Catch-all for lines matching no entry at this level.
    pub fn otherwise(mut self, event: E) -> Self {
        if self.level.otherwise.is_some() {
            self.fail("otherwise entry set twice".into());
        } else {
            self.level.otherwise = Some(EventSpec {
                event,
                trailing_lines: 0,
            });
        }
        self
    }

    /// Insert a delimited path such as `+A,1` or `EVT:JOINED`.
    fn insert_path(&mut self, pattern: &str, spec: EventSpec<E>) {
        if let Err(message) = insert_path(&mut self.level, pattern, spec) {
            self.fail(message);
        }
    }
}

fn insert_path<E>(
    root: &mut Level<E>,
    pattern: &str,
    spec: EventSpec<E>,
) -> std::result::Result<(), String> {
    let tokens = split_pattern(pattern);
    let Some((last, parents)) = tokens.split_last() else {
        return Err(format!("pattern {pattern:?} has no tokens"));
    };

    let mut level = root;
    for token in parents {
        let index = match level.position(token) {
            Some(i) => i,
            None => {
                level.entries.push(Entry {
                    token: token.to_string(),
                    node: Node::Table(Level::new()),
                });
                level.entries.len() - 1
            }
        };
        level = match &mut level.entries[index].node {
            Node::Table(child) => child,
            Node::Event(_) => {
                return Err(format!("pattern {pattern:?} passes through event {token:?}"));
            }
        };
    }

    if level.position(last).is_some() {
        return Err(format!("duplicate event pattern {pattern:?}"));
    }
    level.entries.push(Entry {
        token: last.to_string(),
        node: Node::Event(spec),
    });
    Ok(())
}

/// Builder for an [`EventTable`].
///
/// Errors (empty or duplicate tokens, conflicting paths) are collected and
/// reported by [`build`](Self::build), so a table can be written as one
/// chained expression.
#[derive(Debug)]
pub struct EventTableBuilder<E> {
    root: LevelBuilder<E>,
    bare: Level<E>,
    error: Option<Error>,
}

impl<E: Copy> EventTableBuilder<E> {
    /// Restrict the top level to the given delimiters.
    pub fn delimiters(mut self, delimiters: &[char]) -> Self {
        self.root = self.root.delimiters(delimiters);
        self
    }

    /// Add a top-level terminal entry.
    pub fn event(mut self, token: &str, event: E) -> Self {
        self.root = self.root.event(token, event);
        self
    }

    /// Add a top-level terminal entry followed by `trailing_lines` payload
    /// lines.
    pub fn event_with_lines(mut self, token: &str, event: E, trailing_lines: usize) -> Self {
        self.root = self.root.event_with_lines(token, event, trailing_lines);
        self
    }

    /// Add a top-level category.
    pub fn category(mut self, token: &str, build: impl FnOnce(LevelBuilder<E>) -> LevelBuilder<E>) -> Self {
        self.root = self.root.category(token, build);
        self
    }

    /// Top-level catch-all.
    pub fn otherwise(mut self, event: E) -> Self {
        self.root = self.root.otherwise(event);
        self
    }

    /// Add an entry from a delimited path such as `+A,1`.
    ///
    /// The path is split on [`DEFAULT_DELIMITERS`]; a leading sentinel-like
    /// punctuation character is ignored. Intermediate tokens become
    /// categories, created on first use and shared afterwards.
    pub fn pattern(self, pattern: &str, event: E) -> Self {
        self.pattern_with_lines(pattern, event, 0)
    }

    /// [`pattern`](Self::pattern) with trailing payload lines.
    pub fn pattern_with_lines(mut self, pattern: &str, event: E, trailing_lines: usize) -> Self {
        self.root.insert_path(
            pattern,
            EventSpec {
                event,
                trailing_lines,
            },
        );
        self
    }

    /// Add an entry for a line that carries no sentinel. `text` is matched
    /// as a single token, spaces included.
    pub fn bare(self, text: &str, event: E) -> Self {
        self.bare_with_lines(text, event, 0)
    }

    /// [`bare`](Self::bare) with trailing payload lines.
    pub fn bare_with_lines(mut self, text: &str, event: E, trailing_lines: usize) -> Self {
        if text.is_empty() {
            self.fail("bare event text must not be empty".into());
        } else if self.bare.position(text).is_some() {
            self.fail(format!("duplicate bare event {text:?}"));
        } else {
            self.bare.entries.push(Entry {
                token: text.to_string(),
                node: Node::Event(EventSpec {
                    event,
                    trailing_lines,
                }),
            });
        }
        self
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(Error::InvalidParameter(message));
        }
    }

    /// Finish the table, reporting the first construction error.
    pub fn build(self) -> Result<EventTable<E>> {
        if let Some(err) = self.error.or(self.root.error) {
            return Err(err);
        }
        Ok(EventTable {
            root: self.root.level,
            bare: self.bare,
        })
    }
}

/// Split `+A,1` into `["A", "1"]`.
fn split_pattern(pattern: &str) -> Vec<&str> {
    let body = pattern
        .strip_prefix(|c: char| c.is_ascii_punctuation() && !DEFAULT_DELIMITERS.contains(&c))
        .unwrap_or(pattern);
    body.split(DEFAULT_DELIMITERS)
        .filter(|token| !token.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ev {
        A,
        B,
        Joined,
        Received,
        OtherEvt,
        Registration,
        Sms,
        Ready,
        WifiConnected,
        Anything,
    }

    fn lora_table() -> EventTable<Ev> {
        EventTable::builder()
            .category("EVT", |evt| {
                evt.delimiters(&[':'])
                    .event("JOINED", Ev::Joined)
                    .event("RX_1", Ev::Received)
                    .otherwise(Ev::OtherEvt)
            })
            .event("CREG", Ev::Registration)
            .event_with_lines("CMT", Ev::Sms, 1)
            .bare("ready", Ev::Ready)
            .bare("WIFI CONNECTED", Ev::WifiConnected)
            .build()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Patterns
    // -----------------------------------------------------------------------

    #[test]
    fn sibling_patterns_resolve_with_remainder() {
        let table = EventTable::builder()
            .pattern("+A,1", Ev::A)
            .pattern("+A,2", Ev::B)
            .build()
            .unwrap();

        let a = table.resolve("A,1,x").unwrap();
        assert_eq!((a.event, a.args), (Ev::A, "x"));

        let b = table.resolve("A,2,y").unwrap();
        assert_eq!((b.event, b.args), (Ev::B, "y"));
    }

    #[test]
    fn patterns_share_category_nodes() {
        let table = EventTable::builder()
            .pattern("+A,1", Ev::A)
            .pattern("+A,2", Ev::B)
            .build()
            .unwrap();
        let entries = table.entries();
        assert_eq!(
            entries,
            vec![("A:1".to_string(), Ev::A, 0), ("A:2".to_string(), Ev::B, 0)]
        );
    }

    #[test]
    fn duplicate_pattern_rejected() {
        let result = EventTable::builder()
            .pattern("+A,1", Ev::A)
            .pattern("+A,1", Ev::B)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn pattern_through_event_rejected() {
        let result = EventTable::builder()
            .pattern("+A", Ev::A)
            .pattern("+A,1", Ev::B)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn empty_pattern_rejected() {
        let result = EventTable::builder().pattern("+", Ev::A).build();
        assert!(result.is_err());
    }

    #[test]
    fn split_pattern_strips_sentinel() {
        assert_eq!(split_pattern("+A,1"), vec!["A", "1"]);
        assert_eq!(split_pattern("%CONNECT"), vec!["CONNECT"]);
        assert_eq!(split_pattern("EVT:RX_1"), vec!["EVT", "RX_1"]);
    }

    // -----------------------------------------------------------------------
    // Nested categories
    // -----------------------------------------------------------------------

    #[test]
    fn two_level_category_subtype() {
        let table = lora_table();
        let m = table.resolve("EVT:RX_1:-70:8:UNICAST").unwrap();
        assert_eq!(m.event, Ev::Received);
        assert_eq!(m.args, "-70:8:UNICAST");
    }

    #[test]
    fn terminal_at_end_of_line_has_empty_args() {
        let m = lora_table().resolve("EVT:JOINED").unwrap();
        assert_eq!((m.event, m.args), (Ev::Joined, ""));
    }

    #[test]
    fn otherwise_catches_unknown_subtype() {
        let m = lora_table().resolve("EVT:TX_DONE").unwrap();
        assert_eq!((m.event, m.args), (Ev::OtherEvt, "TX_DONE"));
    }

    #[test]
    fn level_delimiter_is_respected() {
        // The EVT level accepts only ':'.
        let m = lora_table().resolve("EVT:JOINED,1").unwrap();
        assert_eq!((m.event, m.args), (Ev::OtherEvt, "JOINED,1"));
    }

    #[test]
    fn spaces_after_delimiter_are_skipped() {
        let m = lora_table().resolve("CREG: 1,2").unwrap();
        assert_eq!((m.event, m.args), (Ev::Registration, "1,2"));
    }

    #[test]
    fn unknown_top_level_token() {
        let err = lora_table().resolve("CGREG: 1").unwrap_err();
        assert!(matches!(err, Error::UnknownEvent(ref s) if s == "CGREG: 1"));
    }

    #[test]
    fn token_must_be_followed_by_delimiter() {
        assert!(lora_table().resolve("CREGX: 1").is_err());
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(lora_table().resolve("creg: 1").is_err());
    }

    #[test]
    fn first_listed_sibling_wins() {
        let specific_first = EventTable::builder()
            .event("A:1", Ev::B)
            .event("A", Ev::A)
            .build()
            .unwrap();
        assert_eq!(specific_first.resolve("A:1:x").unwrap().event, Ev::B);
        assert_eq!(specific_first.resolve("A:2").unwrap().event, Ev::A);

        let general_first = EventTable::builder()
            .event("A", Ev::A)
            .event("A:1", Ev::B)
            .build()
            .unwrap();
        assert_eq!(general_first.resolve("A:1:x").unwrap().event, Ev::A);
    }

    #[test]
    fn otherwise_at_each_level() {
        let table = EventTable::builder()
            .event("A", Ev::A)
            .otherwise(Ev::Anything)
            .category("B", |b| b.otherwise(Ev::B))
            .build()
            .unwrap();
        assert_eq!(table.resolve("A:1").unwrap().event, Ev::A);
        let b = table.resolve("B:1").unwrap();
        assert_eq!((b.event, b.args), (Ev::B, "1"));
        let z = table.resolve("Z,9").unwrap();
        assert_eq!((z.event, z.args), (Ev::Anything, "Z,9"));
    }

    #[test]
    fn trailing_lines_reported() {
        let m = lora_table().resolve("CMT: \"+15551234\",,\"24/01/01\"").unwrap();
        assert_eq!(m.event, Ev::Sms);
        assert_eq!(m.trailing_lines, 1);
    }

    // -----------------------------------------------------------------------
    // Bare entries
    // -----------------------------------------------------------------------

    #[test]
    fn bare_entries_match_whole_phrase() {
        let table = lora_table();
        assert_eq!(table.resolve_bare("ready").unwrap().event, Ev::Ready);
        assert_eq!(
            table.resolve_bare("WIFI CONNECTED").unwrap().event,
            Ev::WifiConnected
        );
        assert!(table.resolve_bare("WIFI").is_err());
        assert!(table.resolve_bare("AT+GMR").is_err());
    }

    #[test]
    fn bare_and_sentinel_namespaces_are_separate() {
        let table = lora_table();
        assert!(table.resolve("ready").is_err());
        assert!(table.resolve_bare("CREG: 1").is_err());
    }

    // -----------------------------------------------------------------------
    // Builder errors and introspection
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_token_in_level_rejected() {
        let result = EventTable::builder()
            .event("A", Ev::A)
            .event("A", Ev::B)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn error_inside_category_surfaces() {
        let result = EventTable::builder()
            .category("EVT", |evt| evt.event("", Ev::A))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_bare_rejected() {
        let result = EventTable::builder()
            .bare("ready", Ev::Ready)
            .bare("ready", Ev::A)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn entries_list_paths_in_order() {
        let entries = lora_table().entries();
        let paths: Vec<&str> = entries.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["EVT:JOINED", "EVT:RX_1", "EVT:*", "CREG", "CMT", "ready", "WIFI CONNECTED"]
        );
        assert_eq!(lora_table().len(), 7);
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let table: EventTable<Ev> = EventTable::empty();
        assert!(table.is_empty());
        assert!(table.resolve("A").is_err());
        assert!(table.resolve_bare("ready").is_err());
    }
}
