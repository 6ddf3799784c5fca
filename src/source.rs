//! Rule-source text parser.
//!
//! Turns rule text into a [`RuleSource`]: plain declarations with their line
//! numbers, nothing compiled yet. Compilation needs every source's arrays and
//! substitutions at once, so it happens later when the snapshot is built.
//!
//! ```text
//! ! sub who's = who is          definitions
//! > topic dragons inherits random
//!   + *                         trigger
//!   % who is there              previous-reply constraint
//!   * <get seen> == yes => ...  condition
//!   - <sentence> who?           reply
//!   ^ \sand more                continuation of the line above
//! < topic
//! > object reverse rust ... < object
//! ```
//!
//! Lines are first folded into logical lines (`^` continuations appended
//! with the current `! local concat` separator), then dispatched on their
//! command character. `//` starts a comment line, `/* ... */` a block comment.
//! `> begin` blocks are accepted but skipped.

use crate::error::LoadError;
use crate::session::DEFAULT_TOPIC;

/// `(text, line)` of one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub line: usize,
}

impl Line {
    fn new(text: impl Into<String>, line: usize) -> Self {
        Line { text: text.into(), line }
    }
}

/// `! ...` definitions in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definitions {
    pub version: Option<String>,
    pub globals: Vec<(String, String)>,
    pub vars: Vec<(String, String)>,
    pub subs: Vec<(String, String)>,
    pub arrays: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDecl {
    pub pattern: Line,
    pub previous: Option<Line>,
    pub replies: Vec<Line>,
    pub conditions: Vec<Line>,
    pub redirect: Option<Line>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDecl {
    pub name: String,
    pub includes: Vec<String>,
    pub inherits: Vec<String>,
    pub triggers: Vec<TriggerDecl>,
    pub line: usize,
}

impl TopicDecl {
    fn new(name: &str, line: usize) -> Self {
        TopicDecl { name: name.to_string(), includes: Vec::new(), inherits: Vec::new(), triggers: Vec::new(), line }
    }
}

/// `> object NAME LANGUAGE` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDecl {
    pub name: String,
    pub language: String,
    pub code: String,
    pub line: usize,
}

/// Everything declared by one piece of rule text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    /// File path or caller-chosen name, used in error messages.
    pub origin: String,
    pub definitions: Definitions,
    pub topics: Vec<TopicDecl>,
    pub objects: Vec<ObjectDecl>,
}

impl RuleSource {
    /// Total triggers declared across all topics.
    pub fn trigger_count(&self) -> usize {
        self.topics.iter().map(|t| t.triggers.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Concat {
    None,
    Space,
    Newline,
}

impl Concat {
    fn separator(self) -> &'static str {
        match self {
            Concat::None => "",
            Concat::Space => " ",
            Concat::Newline => "\n",
        }
    }
}

/// Parser for rule text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceParser {
    /// Treat unknown commands and definitions as errors instead of warnings.
    pub strict: bool,
}

struct ParseState<'o> {
    origin: &'o str,
    strict: bool,
    concat: Concat,
    source: RuleSource,
    /// Index into `source.topics` of the open topic.
    topic: usize,
    in_begin: bool,
    object: Option<ObjectDecl>,
}

impl SourceParser {
    pub fn new(strict: bool) -> Self {
        SourceParser { strict }
    }

    /// Parse `text`; `origin` names it in errors.
    pub fn parse(&self, origin: &str, text: &str) -> Result<RuleSource, LoadError> {
        let mut state = ParseState {
            origin,
            strict: self.strict,
            concat: Concat::None,
            source: RuleSource {
                origin: origin.to_string(),
                definitions: Definitions::default(),
                topics: vec![TopicDecl::new(DEFAULT_TOPIC, 0)],
                objects: Vec::new(),
            },
            topic: 0,
            in_begin: false,
            object: None,
        };

        let mut pending: Option<(char, String, usize)> = None;
        let mut in_comment = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;

            if state.object.is_some() {
                if raw.trim_start().starts_with("< object") {
                    if let Some(object) = state.object.take() {
                        state.source.objects.push(object);
                    }
                } else if let Some(object) = state.object.as_mut() {
                    object.code.push_str(raw);
                    object.code.push('\n');
                }
                continue;
            }

            let line = raw.trim();
            if in_comment {
                if line.contains("*/") {
                    in_comment = false;
                }
                continue;
            }
            if line.starts_with("/*") {
                in_comment = !line.contains("*/");
                continue;
            }
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            let mut chars = line.chars();
            let Some(cmd) = chars.next() else {
                continue;
            };
            let body = chars.as_str().trim();

            if cmd == '^' {
                match pending.as_mut() {
                    Some((prev_cmd, text, _)) => {
                        let sep = match *prev_cmd {
                            '!' if text.contains('|') => "|",
                            '!' => " ",
                            _ => state.concat.separator(),
                        };
                        text.push_str(sep);
                        text.push_str(body);
                    }
                    None => state.syntax(line_no, "continuation '^' with nothing to continue")?,
                }
                continue;
            }

            if let Some((prev, text, at)) = pending.take() {
                state.dispatch(prev, &text, at)?;
            }
            // Block markers take effect at once: object bodies are not commands.
            if matches!(cmd, '>' | '<') {
                state.dispatch(cmd, body, line_no)?;
            } else {
                pending = Some((cmd, body.to_string(), line_no));
            }
        }

        if let Some((cmd, text, at)) = pending {
            state.dispatch(cmd, &text, at)?;
        }
        if let Some(object) = state.object.take() {
            return Err(LoadError::Syntax {
                origin: origin.to_string(),
                line: object.line,
                message: format!("object '{}' is never closed", object.name),
            });
        }

        tracing::debug!(
            origin,
            topics = state.source.topics.len(),
            triggers = state.source.trigger_count(),
            objects = state.source.objects.len(),
            "parsed rule source"
        );
        Ok(state.source)
    }
}

impl ParseState<'_> {
    /// Report a problem: an error in strict mode, a warning otherwise.
    fn syntax(&self, line: usize, message: &str) -> Result<(), LoadError> {
        if self.strict {
            return Err(self.error(line, message));
        }
        tracing::warn!(origin = self.origin, line, "{message}");
        Ok(())
    }

    fn error(&self, line: usize, message: &str) -> LoadError {
        LoadError::Syntax { origin: self.origin.to_string(), line, message: message.to_string() }
    }

    fn dispatch(&mut self, cmd: char, body: &str, line: usize) -> Result<(), LoadError> {
        if self.in_begin && cmd != '<' && cmd != '>' {
            return Ok(());
        }
        match cmd {
            '!' => self.definition(body, line),
            '>' => self.open_block(body, line),
            '<' => self.close_block(body, line),
            '+' => {
                if body.is_empty() {
                    return Err(self.error(line, "empty trigger"));
                }
                self.source.topics[self.topic].triggers.push(TriggerDecl {
                    pattern: Line::new(body, line),
                    previous: None,
                    replies: Vec::new(),
                    conditions: Vec::new(),
                    redirect: None,
                });
                Ok(())
            }
            '-' | '*' | '%' | '@' => {
                let Some(trigger) = self.source.topics[self.topic].triggers.last_mut() else {
                    return Err(self.error(line, &format!("'{cmd}' line outside of a trigger")));
                };
                let value = Line::new(body, line);
                match cmd {
                    '-' => trigger.replies.push(value),
                    '*' => trigger.conditions.push(value),
                    '%' => trigger.previous = Some(value),
                    _ => trigger.redirect = Some(value),
                }
                Ok(())
            }
            other => self.syntax(line, &format!("unknown command '{other}'")),
        }
    }

    fn definition(&mut self, body: &str, line: usize) -> Result<(), LoadError> {
        let (kind, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let (name, value) = match rest.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (rest.trim(), ""),
        };

        let defs = &mut self.source.definitions;
        match kind {
            "version" => {
                defs.version = Some(value.to_string());
            }
            "local" => match (name, value) {
                ("concat", "none") => self.concat = Concat::None,
                ("concat", "space") => self.concat = Concat::Space,
                ("concat", "newline") => self.concat = Concat::Newline,
                _ => return self.syntax(line, &format!("unknown local option '{name} = {value}'")),
            },
            "global" => defs.globals.push((name.to_string(), value.to_string())),
            "var" => defs.vars.push((name.to_string(), value.to_string())),
            "sub" => defs.subs.push((name.to_lowercase(), value.to_string())),
            "array" => {
                let items = if value.contains('|') {
                    value.split('|').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect()
                } else {
                    value.split_whitespace().map(str::to_string).collect()
                };
                defs.arrays.push((name.to_string(), items));
            }
            _ => return self.syntax(line, &format!("unknown definition type '{kind}'")),
        }
        Ok(())
    }

    fn open_block(&mut self, body: &str, line: usize) -> Result<(), LoadError> {
        let mut words = body.split_whitespace();
        match words.next() {
            Some("topic") => {
                let Some(name) = words.next() else {
                    return Err(self.error(line, "topic without a name"));
                };
                let name = name.to_lowercase();
                let index = match self.source.topics.iter().position(|t| t.name == name) {
                    Some(i) => i,
                    None => {
                        self.source.topics.push(TopicDecl::new(&name, line));
                        self.source.topics.len() - 1
                    }
                };

                let mut mode = None;
                for word in words {
                    match word {
                        "includes" | "inherits" => mode = Some(word),
                        other => {
                            let other = other.to_lowercase();
                            let topic = &mut self.source.topics[index];
                            match mode {
                                Some("includes") => push_unique(&mut topic.includes, other),
                                Some(_) => push_unique(&mut topic.inherits, other),
                                None => {
                                    return self.syntax(line, &format!("unexpected word '{other}' in topic header"));
                                }
                            }
                        }
                    }
                }
                self.topic = index;
                Ok(())
            }
            Some("object") => {
                let (Some(name), Some(language)) = (words.next(), words.next()) else {
                    return Err(self.error(line, "object needs a name and a language"));
                };
                self.object = Some(ObjectDecl {
                    name: name.to_string(),
                    language: language.to_lowercase(),
                    code: String::new(),
                    line,
                });
                Ok(())
            }
            Some("begin") => {
                tracing::warn!(origin = self.origin, line, "begin blocks are not supported; skipping");
                self.in_begin = true;
                Ok(())
            }
            other => self.syntax(line, &format!("unknown block type '{}'", other.unwrap_or(""))),
        }
    }

    fn close_block(&mut self, body: &str, line: usize) -> Result<(), LoadError> {
        match body.split_whitespace().next() {
            Some("topic") => {
                self.topic = 0;
                Ok(())
            }
            Some("begin") => {
                self.in_begin = false;
                Ok(())
            }
            other => self.syntax(line, &format!("unexpected close '< {}'", other.unwrap_or(""))),
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> RuleSource {
        SourceParser::default().parse("test", text).unwrap()
    }

    #[test]
    fn triggers_replies_and_definitions() {
        let src = parse(&crate::rive![
            "! version = 2.0",
            "! sub who's = who is",
            "! var name = Parley",
            "! global debug = false",
            "! array colors = red blue|light green",
            "! array numbers = one two three",
            "",
            "// a comment",
            "+ hello bot",
            "- Hello, human!",
            "- Hi there!",
            "",
            "+ *",
            "% who is there",
            "- <sentence> who?",
        ]);

        assert_eq!(src.definitions.version.as_deref(), Some("2.0"));
        assert_eq!(src.definitions.subs, vec![("who's".into(), "who is".into())]);
        assert_eq!(src.definitions.vars, vec![("name".into(), "Parley".into())]);
        assert_eq!(src.definitions.arrays[0].1, vec!["red blue".to_string(), "light green".to_string()]);
        assert_eq!(src.definitions.arrays[1].1.len(), 3);

        let random = &src.topics[0];
        assert_eq!(random.name, "random");
        assert_eq!(random.triggers.len(), 2);
        assert_eq!(random.triggers[0].replies.len(), 2);
        assert_eq!(random.triggers[0].pattern, Line::new("hello bot", 9));
        assert_eq!(random.triggers[1].previous.as_ref().map(|l| l.text.as_str()), Some("who is there"));
    }

    #[test]
    fn continuations_follow_local_concat() {
        let src = parse(&crate::rive![
            "+ tell me a poem",
            "- There once was a man named Tim,",
            "^ \\swho never quite learned how to swim.",
            "! local concat = newline",
            "+ tell me another",
            "- Line one",
            "^ Line two",
        ]);
        let triggers = &src.topics[0].triggers;
        assert_eq!(
            triggers[0].replies[0].text,
            "There once was a man named Tim,\\swho never quite learned how to swim."
        );
        assert_eq!(triggers[1].replies[0].text, "Line one\nLine two");
    }

    #[test]
    fn topics_objects_and_begin() {
        let src = parse(&crate::rive![
            "> begin",
            "+ request",
            "- {ok}",
            "< begin",
            "",
            "> topic Sports includes games inherits random",
            "  + who won",
            "  - Nobody.",
            "  * <get team> == red => Red did.",
            "< topic",
            "",
            "+ hello",
            "@ hi",
            "",
            "/* block",
            "+ hidden",
            "*/",
            "> object reverse rust",
            "  return args.reverse();",
            "< object",
        ]);

        assert_eq!(src.topics.len(), 2);
        let sports = &src.topics[1];
        assert_eq!(sports.name, "sports");
        assert_eq!(sports.includes, vec!["games".to_string()]);
        assert_eq!(sports.inherits, vec!["random".to_string()]);
        assert_eq!(sports.triggers[0].conditions.len(), 1);

        let random = &src.topics[0];
        assert_eq!(random.triggers.len(), 1);
        assert_eq!(random.triggers[0].redirect.as_ref().map(|l| l.text.as_str()), Some("hi"));

        assert_eq!(src.objects.len(), 1);
        assert_eq!(src.objects[0].language, "rust");
        assert_eq!(src.objects[0].code, "  return args.reverse();\n");
    }

    #[test]
    fn errors_carry_origin_and_line() {
        let err = SourceParser::default().parse("bad.rive", "- orphan reply").unwrap_err();
        assert!(matches!(err, LoadError::Syntax { ref origin, line: 1, .. } if origin == "bad.rive"));

        let unclosed = SourceParser::default().parse("x", "> object foo rust\ncode").unwrap_err();
        assert!(matches!(unclosed, LoadError::Syntax { line: 1, .. }));

        assert!(SourceParser::default().parse("x", "? what").is_ok());
        assert!(SourceParser::new(true).parse("x", "? what").is_err());
        assert!(SourceParser::new(true).parse("x", "! bogus x = y").is_err());
    }
}
