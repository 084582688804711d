//! Helpers shared across the SDK and its callers: string shaping for logs,
//! duration parsing, and the keyword heuristics used by local stand-ins.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

/// Truncate to at most `max_chars` characters, adding an ellipsis when cut
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let mut out: String = s.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer [A-Za-z0-9\-_.]+", "Bearer [REDACTED]"),
        (r"(?i)api[_-]?key[=:]\s*[A-Za-z0-9\-_]+", "api_key=[REDACTED]"),
        (r"(?i)token[=:]\s*[^\s&]+", "token=[REDACTED]"),
        (r"(?i)secret[=:]\s*[^\s&]+", "secret=[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Redact credentials that may have leaked into an error message
pub fn sanitize_for_logging(s: &str) -> String {
    SENSITIVE_PATTERNS
        .iter()
        .fold(s.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Unique id for one capability call
pub fn generate_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse `250ms`, `30s`, `5m`, `1h` or bare seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "will", "would", "there",
    "their", "what", "about", "which", "when", "make", "like", "into", "than", "then", "them",
    "these", "some", "could", "other", "more", "also", "its", "his", "she", "how", "who", "get",
    "find", "show", "give", "tell", "latest", "please", "any", "most", "over", "such", "been",
];

static WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").ok());

/// Lower-cased content words of `text` in order of appearance.
///
/// Words of two characters or fewer and common stop words are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let Some(word) = WORD.as_ref() else {
        return Vec::new();
    };
    word.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// First `limit` distinct content words of `text`
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(text)
        .into_iter()
        .filter(|w| seen.insert(w.clone()))
        .take(limit)
        .collect()
}

pub fn keyword_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Every lower-cased word of `text`, short and stop words included
pub fn word_set(text: &str) -> BTreeSet<String> {
    let Some(word) = WORD.as_ref() else {
        return BTreeSet::new();
    };
    word.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Jaccard similarity of two keyword sets; 0 when both are empty
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Word frequencies across `texts`, highest first, ties alphabetical
pub fn keyword_frequencies<'a, I>(texts: I, limit: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in tokenize(text) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Lower-case, dash-separated form of `text` suitable for refs
pub fn slugify(text: &str, max_words: usize) -> String {
    let slug = tokenize(text)
        .into_iter()
        .take(max_words)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("héllo wörld", 6), "hél...");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_sanitize_for_logging() {
        let output = sanitize_for_logging("Authorization: Bearer abc123xyz token=s3cr3t");
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("abc123xyz"));
        assert!(!output.contains("s3cr3t"));
    }

    #[test]
    fn test_keywords_skip_short_and_stop_words() {
        assert_eq!(
            extract_keywords("What is the latest AI policy news about AI?", 5),
            vec!["policy", "news"]
        );
        assert_eq!(extract_keywords("Artificial intelligence regulation in the EU", 2).len(), 2);
    }

    #[test]
    fn test_word_set_keeps_short_words() {
        let words = word_set("What is 5G? AI, ai");
        assert_eq!(
            words.into_iter().collect::<Vec<_>>(),
            vec!["5g", "ai", "is", "what"]
        );
        assert!(keyword_set("What is 5G?").is_empty());
    }

    #[test]
    fn test_jaccard() {
        let a = keyword_set("policy news regulation");
        let b = keyword_set("policy regulation markets");
        assert_eq!(jaccard(&a, &b), 0.5);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_keyword_frequencies_ranked() {
        let ranked = keyword_frequencies(["policy news", "policy rules", "news policy"], 2);
        assert_eq!(ranked, vec![("policy".to_string(), 3), ("news".to_string(), 2)]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("AI Policy News!", 3), "policy-news");
        assert_eq!(slugify("a b", 3), "untitled");
    }
}
