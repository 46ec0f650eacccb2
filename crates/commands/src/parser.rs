//! Command parsing.
//!
//! Incoming text is matched against a fixed, ordered table of
//! (pattern, constructor) pairs — first match wins, and the patterns are
//! data rather than code so the table is easy to test and extend.
//!
//! Grammar (all forms accept `/expr`, `/express`, or `/表达` as the leading
//! token, case-insensitively):
//!
//! ```text
//! /expr add <situation> <style> [in <chat>] [w=<float>]
//! /expr list [in <chat>] [page=<n>] [size=<n>]
//! /expr del <id> [in <chat>]
//! /expr <id> <±delta> [in <chat>]
//! /expr review
//! /expr learn [<guidance>]
//! /expr msg <message id>
//! ```
//!
//! The adjust form requires an explicit `+`/`-` sign on the delta; an
//! unsigned number never matches, which keeps it syntactically distinct
//! from `add`'s unsigned weight.

use parlance_core::weight;
use regex_lite::{Captures, Regex};

/// The leading command token, shared by every pattern.
const HEAD: &str = r"(?i)^/(?:expr|express|表达)";

/// A parsed command intent with validated arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        situation: String,
        style: String,
        chat_ref: Option<String>,
        weight: f64,
    },
    List {
        chat_ref: Option<String>,
        page: u64,
        size: u64,
    },
    Delete {
        id: i64,
        chat_ref: Option<String>,
    },
    Adjust {
        id: i64,
        delta: f64,
        chat_ref: Option<String>,
    },
    Review,
    Learn {
        guidance: Option<String>,
    },
    Analyze {
        message_id: String,
    },
}

/// Default page size for `list`.
pub const DEFAULT_PAGE_SIZE: u64 = 10;
/// Upper bound on `list` page size.
pub const MAX_PAGE_SIZE: u64 = 50;

type Builder = fn(&Captures<'_>) -> Option<Command>;

/// The ordered intent table.
pub struct CommandParser {
    rules: Vec<(Regex, Builder)>,
}

impl CommandParser {
    pub fn new() -> Self {
        let table: [(&str, Builder); 7] = [
            (
                r"\s+add\s+(.+?)\s+(.+?)(?:\s+in\s+(\S+))?(?:\s+w=([0-9]+(?:\.[0-9]+)?))?\s*$",
                build_add,
            ),
            (
                r"\s+list(?:\s+in\s+(\S+))?(?:\s+page=(\d+))?(?:\s+size=(\d+))?\s*$",
                build_list,
            ),
            (r"\s+del\s+(\d+)(?:\s+in\s+(\S+))?\s*$", build_delete),
            (r"\s+review\s*$", build_review),
            (r"\s+learn(?:\s+(.+))?\s*$", build_learn),
            (r"\s+msg\s+(\S+)\s*$", build_analyze),
            (
                r"\s+(\d+)\s+([+-][0-9]+(?:\.[0-9]+)?)(?:\s+in\s+(\S+))?\s*$",
                build_adjust,
            ),
        ];

        let rules = table
            .into_iter()
            .map(|(pattern, builder)| {
                let full = format!("{HEAD}{pattern}");
                (
                    Regex::new(&full).expect("command pattern must compile"),
                    builder,
                )
            })
            .collect();

        Self { rules }
    }

    /// Match text against the table; first matching rule wins.
    /// Returns `None` when nothing matches.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let text = text.trim();
        for (pattern, builder) in &self.rules {
            if let Some(captures) = pattern.captures(text) {
                return builder(&captures);
            }
        }
        None
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

fn build_add(captures: &Captures<'_>) -> Option<Command> {
    let situation = captures.get(1)?.as_str().trim().to_string();
    let style = captures.get(2)?.as_str().trim().to_string();
    let chat_ref = captures.get(3).map(|m| m.as_str().to_string());
    let weight = captures
        .get(4)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(weight::clamp)
        .unwrap_or(1.0);
    Some(Command::Add {
        situation,
        style,
        chat_ref,
        weight,
    })
}

fn build_list(captures: &Captures<'_>) -> Option<Command> {
    let chat_ref = captures.get(1).map(|m| m.as_str().to_string());
    let page = captures
        .get(2)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(1)
        .max(1);
    let size = captures
        .get(3)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    Some(Command::List {
        chat_ref,
        page,
        size,
    })
}

fn build_delete(captures: &Captures<'_>) -> Option<Command> {
    let id = captures.get(1)?.as_str().parse().ok()?;
    let chat_ref = captures.get(2).map(|m| m.as_str().to_string());
    Some(Command::Delete { id, chat_ref })
}

fn build_review(_captures: &Captures<'_>) -> Option<Command> {
    Some(Command::Review)
}

fn build_learn(captures: &Captures<'_>) -> Option<Command> {
    let guidance = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|g| !g.is_empty());
    Some(Command::Learn { guidance })
}

fn build_analyze(captures: &Captures<'_>) -> Option<Command> {
    Some(Command::Analyze {
        message_id: captures.get(1)?.as_str().trim().to_string(),
    })
}

fn build_adjust(captures: &Captures<'_>) -> Option<Command> {
    let id = captures.get(1)?.as_str().parse().ok()?;
    let delta = captures.get(2)?.as_str().parse().ok()?;
    let chat_ref = captures.get(3).map(|m| m.as_str().to_string());
    Some(Command::Adjust {
        id,
        delta,
        chat_ref,
    })
}

// --- Usage hints ---

const USAGE_ADD: &str = "usage: /expr add <situation> <style> [in <chat>] [w=<float>]\n\
e.g. /expr add 对惊叹 我嘞个 w=1.5";
const USAGE_LIST: &str = "usage: /expr list [in <chat>] [page=<n>] [size=<n>]";
const USAGE_DELETE: &str = "usage: /expr del <id> [in <chat>]\n\
e.g. /expr del 123 or /expr del 123 in qq:123:group";
const USAGE_ADJUST: &str = "usage: /expr <id> <+/-delta> [in <chat>]\n\
e.g. /expr 123 +0.5 or /expr 123 -1.2";
const USAGE_LEARN: &str = "usage: /expr learn [<guidance>]\n\
e.g. /expr learn make the expressions feel more natural\n\
(without guidance, the chat context is analyzed automatically)";
const USAGE_ANALYZE: &str = "usage: /expr msg <message id>\n\
e.g. /expr msg 12345";
const USAGE_GENERAL: &str = "usage:\n\
/expr add <situation> <style> [in <chat>] [w=<float>]\n\
/expr list [in <chat>] [page=<n>] [size=<n>]\n\
/expr del <id> [in <chat>]\n\
/expr <id> <+/-delta> [in <chat>]\n\
/expr review\n\
/expr learn [<guidance>]\n\
/expr msg <message id>";

/// The usage hint for whichever command family the text was attempting,
/// judged by the token after the leading command token.
pub fn usage_for(text: &str) -> &'static str {
    let head = Regex::new(&format!(r"{HEAD}\s+(\S+)")).expect("usage pattern must compile");
    let Some(captures) = head.captures(text.trim()) else {
        return USAGE_GENERAL;
    };
    let token = captures[1].to_lowercase();
    match token.as_str() {
        "add" => USAGE_ADD,
        "list" => USAGE_LIST,
        "del" => USAGE_DELETE,
        "review" => USAGE_GENERAL,
        "learn" => USAGE_LEARN,
        "msg" => USAGE_ANALYZE,
        t if t.bytes().all(|b| b.is_ascii_digit()) => USAGE_ADJUST,
        _ => USAGE_GENERAL,
    }
}
