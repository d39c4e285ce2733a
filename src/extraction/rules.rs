//! Rule-based concept extraction
//!
//! Deterministic, script-aware token heuristics used whenever the
//! collaborator is unavailable. Text is split into runs of one script
//! (Latin, Katakana, Han, Hiragana); Latin runs keep internal `.`, `-`, `/`
//! and friends so `Node.js`, `GPT-4` and `CI/CD` stay whole.
//!
//! Persons are claimed first, then projects, then keywords, so a token
//! never lands in two categories.

use super::{finish, Extraction, ExtractionLimits, ExtractionOrigin, ExtractedItem};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Katakana,
    Han,
    Hiragana,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    script: Script,
    start: usize,
    end: usize,
    /// First token after a sentence terminator (or of the text)
    sentence_start: bool,
}

/// Capitalized words that are never names
const COMMON_WORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "When", "Where", "What", "Which", "While", "With",
    "From", "Into", "Upon", "About", "After", "Before", "During", "Between", "Through", "Here",
    "There", "Then", "Thus", "Also", "Even", "Just", "Only", "Some", "Many", "Much", "Most",
    "Other", "Such", "Each", "Every", "Both", "All", "Any", "But", "And", "For", "Not", "Yet",
    "His", "Her", "Its", "Our", "Your", "Their", "Who", "How", "Why", "Can", "May", "Will",
    "Should", "Would", "Could", "Must", "Has", "Have", "Had", "Was", "Were", "Are", "Now", "New",
    "Please", "Thanks", "Thank", "Hi", "Hello", "Dear", "Regards", "Sent", "Sorry", "Yes", "No",
    "Team", "Everyone", "Today", "Tomorrow", "Yesterday", "Monday", "Tuesday", "Wednesday",
    "Thursday", "Friday", "Saturday", "Sunday", "January", "February", "March", "April", "June",
    "July", "August", "September", "October", "November", "December", "Project", "Me", "Him",
    "Them", "Us", "It", "We", "They", "He", "She", "You",
];

/// Uppercase tokens that are chat noise rather than concepts
const ACRONYM_STOPWORDS: &[&str] = &["OK", "AM", "PM", "FYI", "ASAP", "TBD", "RE", "FW", "CC", "PS"];

const TITLES: &[&str] = &["Mr", "Mrs", "Ms", "Dr", "Prof"];

/// Lowercased words after which a capitalized word is a person
const SLOT_BEFORE: &[&str] = &[
    "to", "from", "with", "cc", "ask", "asked", "tell", "told", "thank", "thanks", "ping", "call",
    "meet", "met", "email", "emailed",
];

/// Lowercased nouns that turn the capitalized word before them into a
/// place or organisation: "with Tokyo office", "to Acme support"
const ORG_NOUNS: &[&str] = &[
    "office", "offices", "team", "branch", "headquarters", "hq", "department", "dept", "division",
    "group", "site", "campus", "store", "factory", "plant", "lab", "support", "inc", "corp",
    "ltd", "university",
];

/// Lowercased words before which a capitalized word is a person
const SLOT_AFTER: &[&str] = &[
    "replied", "said", "wrote", "asked", "says", "writes", "replies", "mentioned", "suggested",
    "confirmed", "agreed", "thinks", "noted", "proposed",
];

const LATIN_HONORIFICS: &[&str] = &["-san", "-sama", "-kun", "-chan", "-sensei"];
const KANA_HONORIFICS: &[&str] = &["さん", "さま", "くん", "ちゃん"];
const HAN_HONORIFICS: &[&str] = &["先生", "様", "氏"];
const PROJECT_KATAKANA: &str = "プロジェクト";

fn script_of(c: char) -> Option<Script> {
    match c {
        '\u{30A0}'..='\u{30FA}' | '\u{30FC}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => {
            Some(Script::Katakana)
        }
        '\u{3040}'..='\u{309F}' => Some(Script::Hiragana),
        '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{3005}' => Some(Script::Han),
        c if c.is_alphanumeric() => Some(Script::Latin),
        _ => None,
    }
}

fn is_joiner(c: char) -> bool {
    matches!(c, '.' | '-' | '/' | '+' | '#' | '_' | '&')
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n' | '。' | '！' | '？')
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut sentence_start = true;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let Some(script) = script_of(c) else {
            // "Mr. Smith" does not end a sentence
            let after_title = c == '.'
                && tokens
                    .last()
                    .map_or(false, |t| t.end == pos && TITLES.contains(&t.text));
            if is_terminator(c) && !after_title {
                sentence_start = true;
            }
            i += 1;
            continue;
        };

        let mut j = i + 1;
        while j < chars.len() {
            let next = chars[j].1;
            if script_of(next) == Some(script) {
                j += 1;
                continue;
            }
            if script == Script::Latin && is_joiner(next) {
                let continues = chars
                    .get(j + 1)
                    .map_or(false, |&(_, c)| script_of(c) == Some(Script::Latin));
                // C++, C#
                if continues || matches!(next, '+' | '#') {
                    j += 1;
                    continue;
                }
            }
            break;
        }

        let end = chars.get(j).map_or(text.len(), |&(p, _)| p);
        tokens.push(Token {
            text: &text[pos..end],
            script,
            start: pos,
            end,
            sentence_start,
        });
        sentence_start = false;
        i = j;
    }

    tokens
}

fn is_capitalized_name(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase()
        && word.chars().count() >= 2
        && chars.all(|c| c.is_lowercase())
        && !COMMON_WORDS.contains(&word)
        && !TITLES.contains(&word)
}

fn is_org_noun(word: &str) -> bool {
    ORG_NOUNS.contains(&word.to_lowercase().as_str())
}

fn is_acronym(word: &str) -> bool {
    let upper = word.chars().filter(|c| c.is_ascii_uppercase()).count();
    upper >= 2
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || is_joiner(c))
        && !ACRONYM_STOPWORDS.contains(&word)
}

fn is_mixed_case(word: &str) -> bool {
    word.chars().all(|c| c.is_alphanumeric())
        && word.chars().any(|c| c.is_lowercase())
        && word.chars().skip(1).any(|c| c.is_uppercase())
}

fn is_technical_compound(word: &str) -> bool {
    let upper = word.chars().filter(|c| c.is_uppercase()).count();
    let has_digit = word.chars().any(|c| c.is_ascii_digit());
    let has_joiner = word.chars().any(is_joiner);
    let marked = word.contains(['.', '+', '#']);

    word.chars().any(|c| c.is_alphabetic())
        && (has_joiner || has_digit)
        && (upper >= 2 || (upper >= 1 && (has_digit || marked)))
}

/// True if only whitespace separates the two tokens
fn spaced(text: &str, a: &Token<'_>, b: &Token<'_>) -> bool {
    a.end <= b.start && text[a.end..b.start].chars().all(|c| c == ' ' || c == '\t')
}

fn adjacent(a: &Token<'_>, b: &Token<'_>) -> bool {
    a.end == b.start
}

fn strip_latin_honorific(word: &str) -> Option<&str> {
    LATIN_HONORIFICS.iter().find_map(|suffix| {
        let split = word.len().checked_sub(suffix.len())?;
        if !word.is_char_boundary(split) || !word[split..].eq_ignore_ascii_case(suffix) {
            return None;
        }
        Some(&word[..split]).filter(|name| is_capitalized_name(name))
    })
}

struct Candidates {
    persons: Vec<(usize, ExtractedItem)>,
    projects: Vec<(usize, ExtractedItem)>,
    keywords: Vec<(usize, ExtractedItem)>,
    claimed: HashSet<usize>,
}

impl Candidates {
    fn claim(&mut self, indices: &[usize]) -> bool {
        if indices.iter().any(|i| self.claimed.contains(i)) {
            return false;
        }
        self.claimed.extend(indices.iter().copied());
        true
    }
}

fn collect_persons(text: &str, tokens: &[Token<'_>], out: &mut Candidates) {
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);
        let after = tokens.get(i + 2);

        match token.script {
            Script::Latin => {
                // Tanaka-san
                if let Some(name) = strip_latin_honorific(token.text) {
                    if out.claim(&[i]) {
                        out.persons.push((i, ExtractedItem::new(name, 0.9)));
                    }
                    continue;
                }

                // Tanakaさん
                if is_capitalized_name(token.text) {
                    if let Some(n) = next {
                        if n.script == Script::Hiragana
                            && adjacent(token, n)
                            && KANA_HONORIFICS.iter().any(|h| n.text.starts_with(h))
                        {
                            if out.claim(&[i]) {
                                out.persons.push((i, ExtractedItem::new(token.text, 0.9)));
                            }
                            continue;
                        }
                    }
                }

                // Mr. Smith, Dr. Jane Doe
                if TITLES.contains(&token.text) {
                    if let Some(n) = next.filter(|n| is_capitalized_name(n.text)) {
                        let mut label = n.text.to_string();
                        let mut claimed = vec![i, i + 1];
                        if let Some(a) = after.filter(|a| is_capitalized_name(a.text) && spaced(text, n, a)) {
                            label = format!("{} {}", n.text, a.text);
                            claimed.push(i + 2);
                        }
                        if out.claim(&claimed) {
                            out.persons.push((i + 1, ExtractedItem::new(label, 0.85)));
                        }
                        continue;
                    }
                }

                // to Tanaka, cc Jane Doe
                if SLOT_BEFORE.contains(&token.text.to_lowercase().as_str()) {
                    if let Some(n) = next.filter(|n| {
                        n.script == Script::Latin
                            && !n.sentence_start
                            && spaced(text, token, n)
                            && is_capitalized_name(n.text)
                            && !after.map_or(false, |a| is_org_noun(a.text))
                    }) {
                        let mut label = n.text.to_string();
                        let mut claimed = vec![i + 1];
                        if let Some(a) = after.filter(|a| {
                            is_capitalized_name(a.text)
                                && spaced(text, n, a)
                                && !tokens
                                    .get(i + 3)
                                    .map_or(false, |t| SLOT_AFTER.contains(&t.text.to_lowercase().as_str()))
                        }) {
                            label = format!("{} {}", n.text, a.text);
                            claimed.push(i + 2);
                        }
                        if out.claim(&claimed) {
                            out.persons.push((i + 1, ExtractedItem::new(label, 0.7)));
                        }
                        continue;
                    }
                }

                // Tanaka replied, Jane Doe wrote
                if is_capitalized_name(token.text) {
                    if let Some(n) = next {
                        if spaced(text, token, n)
                            && SLOT_AFTER.contains(&n.text.to_lowercase().as_str())
                        {
                            let prev = i.checked_sub(1).and_then(|p| tokens.get(p).map(|t| (p, t)));
                            let full = prev.filter(|(_, p)| {
                                !token.sentence_start
                                    && is_capitalized_name(p.text)
                                    && spaced(text, p, token)
                            });
                            let (start, label, claimed) = match full {
                                Some((p, prev)) => {
                                    (p, format!("{} {}", prev.text, token.text), vec![p, i])
                                }
                                None => (i, token.text.to_string(), vec![i]),
                            };
                            if out.claim(&claimed) {
                                out.persons.push((start, ExtractedItem::new(label, 0.7)));
                            }
                        }
                    }
                }
            }
            Script::Han => {
                // 佐藤様, 山田先生
                if let Some(name) = HAN_HONORIFICS
                    .iter()
                    .find_map(|h| token.text.strip_suffix(h))
                    .filter(|name| !name.is_empty())
                {
                    if out.claim(&[i]) {
                        out.persons.push((i, ExtractedItem::new(name, 0.9)));
                    }
                    continue;
                }
                if kana_honorific_follows(token, next) && out.claim(&[i]) {
                    out.persons.push((i, ExtractedItem::new(token.text, 0.9)));
                }
            }
            Script::Katakana => {
                // スミスさん
                if kana_honorific_follows(token, next) && out.claim(&[i]) {
                    out.persons.push((i, ExtractedItem::new(token.text, 0.85)));
                }
            }
            Script::Hiragana => {}
        }
    }
}

fn kana_honorific_follows(token: &Token<'_>, next: Option<&Token<'_>>) -> bool {
    next.map_or(false, |n| {
        n.script == Script::Hiragana
            && adjacent(token, n)
            && KANA_HONORIFICS.iter().any(|h| n.text.starts_with(h))
    })
}

fn collect_projects(text: &str, tokens: &[Token<'_>], out: &mut Candidates) {
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);
        match token.script {
            Script::Latin => {
                // Project Phoenix
                if token.text.eq_ignore_ascii_case("project") {
                    if let Some(n) = next.filter(|n| {
                        n.script == Script::Latin
                            && spaced(text, token, n)
                            && n.text.chars().next().map_or(false, |c| c.is_uppercase())
                    }) {
                        if out.claim(&[i, i + 1]) {
                            out.projects.push((i + 1, ExtractedItem::new(n.text, 0.8)));
                        }
                        continue;
                    }
                }

                // Phoenix project
                let capitalized = token.text.chars().next().map_or(false, |c| c.is_uppercase())
                    && !COMMON_WORDS.contains(&token.text);
                if capitalized {
                    if let Some(n) = next {
                        if spaced(text, token, n)
                            && n.text.eq_ignore_ascii_case("project")
                            && out.claim(&[i, i + 1])
                        {
                            out.projects.push((i, ExtractedItem::new(token.text, 0.8)));
                        }
                    }
                }
            }
            Script::Katakana => {
                // フェニックスプロジェクト
                if let Some(name) = token
                    .text
                    .strip_suffix(PROJECT_KATAKANA)
                    .filter(|name| !name.is_empty())
                {
                    if out.claim(&[i]) {
                        out.projects.push((i, ExtractedItem::new(name, 0.8)));
                    }
                    continue;
                }
                // 新規事業プロジェクト, Apolloプロジェクト
                if token.text == PROJECT_KATAKANA && i > 0 {
                    let prev = &tokens[i - 1];
                    if adjacent(prev, token)
                        && prev.script != Script::Hiragana
                        && out.claim(&[i - 1, i])
                    {
                        out.projects.push((i - 1, ExtractedItem::new(prev.text, 0.8)));
                    }
                }
            }
            Script::Han | Script::Hiragana => {}
        }
    }
}

fn collect_keywords(tokens: &[Token<'_>], out: &mut Candidates) {
    for (i, token) in tokens.iter().enumerate() {
        if out.claimed.contains(&i) {
            continue;
        }
        let confidence = match token.script {
            Script::Latin if is_acronym(token.text) => Some(0.8),
            Script::Latin if is_mixed_case(token.text) => Some(0.75),
            Script::Latin if is_technical_compound(token.text) => Some(0.7),
            Script::Katakana => {
                let len = token.text.chars().filter(|&c| c != 'ー').count();
                (len >= 2).then_some(0.65)
            }
            Script::Han => {
                let len = token.text.chars().count();
                (2..=8).contains(&len).then_some(0.5)
            }
            _ => None,
        };
        if let Some(confidence) = confidence {
            out.claimed.insert(i);
            out.keywords.push((i, ExtractedItem::new(token.text, confidence)));
        }
    }
}

fn ordered(mut found: Vec<(usize, ExtractedItem)>, cap: usize) -> Vec<ExtractedItem> {
    found.sort_by_key(|(pos, _)| *pos);
    finish(found.into_iter().map(|(_, item)| item), cap)
}

/// Extract keywords, persons and projects from `text` without the collaborator.
pub fn extract(text: &str, limits: &ExtractionLimits) -> Extraction {
    let tokens = tokenize(text);
    let mut found = Candidates {
        persons: Vec::new(),
        projects: Vec::new(),
        keywords: Vec::new(),
        claimed: HashSet::new(),
    };

    collect_persons(text, &tokens, &mut found);
    collect_projects(text, &tokens, &mut found);
    collect_keywords(&tokens, &mut found);

    Extraction {
        keywords: ordered(found.keywords, limits.max_keywords),
        persons: ordered(found.persons, limits.max_persons),
        projects: ordered(found.projects, limits.max_projects),
        origin: ExtractionOrigin::RuleBased,
    }
}
