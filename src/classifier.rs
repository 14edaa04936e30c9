//! Voice command classification
//!
//! Stateless text classification for final transcript fragments: decides
//! whether an utterance is a task or project command and pulls best-effort
//! details (priority, due date, residual title) out of the raw text. The
//! heavy lifting of turning an utterance into structured data belongs to the
//! intent extractor; this module only gates which fragments are worth sending
//! there and provides regex fallbacks.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use regex::Regex;

use crate::tasks::Priority;

/// Phrases that mark an utterance as a task-creation command
const TASK_TRIGGERS: &[&str] = &[
    "create task",
    "create a task",
    "add task",
    "add a task",
    "new task",
    "make a task",
    "remind me",
    "schedule",
    "don't forget",
    "i need to",
];

/// Phrases that mark an utterance as a project-creation command
const PROJECT_TRIGGERS: &[&str] = &[
    "create project",
    "create a project",
    "new project",
    "start a project",
    "make a project",
];

/// High-priority keywords
static HIGH_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:urgent(?:ly)?|asap|high priority|critical)\b").expect("valid regex")
});

/// Low-priority keywords
static LOW_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:low priority|minor|whenever|no rush)\b").expect("valid regex")
});

/// Relative day references ("due tomorrow", "today")
static DUE_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:due\s+|by\s+)?(today|tomorrow)\b").expect("valid regex")
});

/// "in N days" references
static DUE_IN_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:due\s+)?in\s+(\d{1,3})\s+days?\b").expect("valid regex")
});

/// Weekday references ("due friday", "by monday", "on tuesday")
static DUE_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:due|by|on)\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    )
    .expect("valid regex")
});

/// Leading command verb phrase, stripped when computing the title
static LEADING_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:(?:create|add|make)\s+(?:a\s+)?(?:new\s+)?task(?:\s+(?:to|called|named|for))?|new\s+task(?:\s+(?:to|called|named|for))?|remind\s+me(?:\s+to)?|schedule(?:\s+a)?|don't\s+forget(?:\s+to)?|i\s+need\s+to)\s*[:,]?\s*",
    )
    .expect("valid regex")
});

/// Best-effort details extracted from a command fragment
///
/// Absent facts are `None`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

/// True iff the text contains a task-creation trigger phrase
#[must_use]
pub fn is_task_command(text: &str) -> bool {
    let lower = text.to_lowercase();
    TASK_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// True iff the text contains a project-creation trigger phrase
#[must_use]
pub fn is_project_command(text: &str) -> bool {
    let lower = text.to_lowercase();
    PROJECT_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Extract task details using the current date for relative references
#[must_use]
pub fn extract_task_details(text: &str) -> TaskDetails {
    extract_task_details_at(text, Utc::now().date_naive())
}

/// Extract task details, resolving relative dates against `today`
#[must_use]
pub fn extract_task_details_at(text: &str, today: NaiveDate) -> TaskDetails {
    let priority = if HIGH_PRIORITY.is_match(text) {
        Some(Priority::High)
    } else if LOW_PRIORITY.is_match(text) {
        Some(Priority::Low)
    } else {
        None
    };

    let (due_date, date_span) = extract_due_date(text, today);

    // Title: strip the date phrase, priority keywords, and the leading
    // command phrase from the original text
    let mut residual = text.to_string();
    if let Some((start, end)) = date_span {
        residual.replace_range(start..end, " ");
    }
    residual = HIGH_PRIORITY.replace_all(&residual, " ").into_owned();
    residual = LOW_PRIORITY.replace_all(&residual, " ").into_owned();
    residual = LEADING_COMMAND.replace(&residual, "").into_owned();
    let mut title = tidy(&residual);

    // Residual too short: fall back to stripping only the verb phrase
    if title.chars().count() < 3 {
        title = tidy(&LEADING_COMMAND.replace(text, ""));
    }

    // First sentence is the title; anything after a period is description
    let (title, description) = match title.split_once('.') {
        Some((head, tail)) if !tail.trim().is_empty() => {
            (tidy(head), Some(tidy(tail)))
        }
        _ => (tidy(&title), None),
    };

    TaskDetails {
        title: (!title.is_empty()).then_some(title),
        description,
        priority,
        due_date,
    }
}

/// Grammar hint for the recognizer, in JSGF form
///
/// Used only to bias recognition toward command shapes; it is not a parser.
#[must_use]
pub fn command_grammar() -> String {
    let task = TASK_TRIGGERS.join(" | ");
    let project = PROJECT_TRIGGERS.join(" | ");
    format!(
        "#JSGF V1.0;\n\
         grammar flowvoice.commands;\n\
         public <command> = <task> | <project>;\n\
         <task> = ( {task} );\n\
         <project> = ( {project} );\n"
    )
}

/// Find the first due-date phrase and resolve it
///
/// Returns the resolved date and the byte span of the matched phrase.
fn extract_due_date(text: &str, today: NaiveDate) -> (Option<NaiveDate>, Option<(usize, usize)>) {
    if let Some(caps) = DUE_IN_DAYS.captures(text) {
        let m = caps.get(0).expect("full match");
        let days: u64 = caps[1].parse().unwrap_or(0);
        let date = today.checked_add_days(Days::new(days));
        return (date, Some((m.start(), m.end())));
    }

    if let Some(caps) = DUE_RELATIVE.captures(text) {
        let m = caps.get(0).expect("full match");
        let date = if caps[1].eq_ignore_ascii_case("today") {
            Some(today)
        } else {
            today.checked_add_days(Days::new(1))
        };
        return (date, Some((m.start(), m.end())));
    }

    if let Some(caps) = DUE_WEEKDAY.captures(text) {
        let m = caps.get(0).expect("full match");
        let date = parse_weekday(&caps[1]).map(|wd| next_weekday(today, wd));
        return (date, Some((m.start(), m.end())));
    }

    (None, None)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence of `target` strictly after `today`
fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_n = i64::from(today.weekday().num_days_from_monday());
    let target_n = i64::from(target.num_days_from_monday());
    let mut ahead = (target_n - today_n).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    #[allow(clippy::cast_sign_loss)]
    today.checked_add_days(Days::new(ahead as u64)).unwrap_or(today)
}

/// Collapse whitespace and trim stray punctuation
fn tidy(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ':'))
        .to_string()
}
