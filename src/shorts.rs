// Shorts-specific shaping of titles, descriptions and tags before upload

use crate::error::UploaderError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// YouTube caps the combined length of all tags.
pub const MAX_TAGS_TOTAL_CHARS: usize = 500;
/// Hashtags appended to descriptions.
pub const MAX_DESCRIPTION_HASHTAGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
    #[default]
    Unlisted,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = UploaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "private" => Ok(Privacy::Private),
            "unlisted" => Ok(Privacy::Unlisted),
            other => Err(UploaderError::Config(format!(
                "Invalid privacy status '{}'. Must be 'public', 'private', or 'unlisted'",
                other
            ))),
        }
    }
}

/// Optimize title for YouTube Shorts (max `max_len` chars)
pub fn optimize_title(title: &str, max_len: usize) -> String {
    let mut optimized = title.trim().to_string();

    if !optimized.to_lowercase().contains("#shorts") {
        optimized.push_str(" #Shorts");
    }

    if optimized.chars().count() > max_len {
        // no room for an ellipsis below three characters
        if max_len < 3 {
            return optimized.chars().take(max_len).collect();
        }
        optimized = optimized.chars().take(max_len - 3).collect::<String>().trim_end().to_string();
        optimized.push_str("...");
    }

    optimized
}

/// Format description with hashtags
pub fn format_description(description: &str, tags: &[String]) -> String {
    let mut formatted = description.trim().to_string();
    let already_tagged = formatted.to_lowercase().contains("#shorts");

    let mut hashtags: Vec<String> = Vec::new();
    if !already_tagged {
        hashtags.push("#Shorts".to_string());
    }
    for tag in tags.iter().take(MAX_DESCRIPTION_HASHTAGS) {
        let clean: String = tag.chars().filter(|c| !c.is_whitespace() && *c != '#').collect();
        if clean.is_empty() || clean.eq_ignore_ascii_case("shorts") {
            continue;
        }
        hashtags.push(format!("#{}", clean));
    }

    if !hashtags.is_empty() {
        if !formatted.is_empty() {
            formatted.push_str("\n\n");
        }
        formatted.push_str(&hashtags.join(" "));
    }

    formatted
}

/// Clean tags for the API: no `#`, no blanks, no duplicates, within the total budget.
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    let mut cleaned = Vec::new();

    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').trim().to_string();
        if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
            continue;
        }
        // Multi-word tags are quoted by YouTube, which costs two extra characters
        let cost = tag.chars().count() + if tag.contains(' ') { 2 } else { 0 };
        let separator = if cleaned.is_empty() { 0 } else { 1 };
        if total + separator + cost > MAX_TAGS_TOTAL_CHARS {
            break;
        }
        total += separator + cost;
        cleaned.push(tag);
    }

    cleaned
}

pub fn shorts_url(video_id: &str) -> String {
    format!("https://youtube.com/shorts/{}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_parsing() {
        assert_eq!("Public".parse::<Privacy>().unwrap(), Privacy::Public);
        assert_eq!(" unlisted ".parse::<Privacy>().unwrap(), Privacy::Unlisted);
        assert!("friends".parse::<Privacy>().is_err());
        assert_eq!(serde_json::to_string(&Privacy::Private).unwrap(), "\"private\"");
    }

    #[test]
    fn test_optimize_title_appends_shorts_tag() {
        assert_eq!(optimize_title("  My cat  ", 100), "My cat #Shorts");
        assert_eq!(optimize_title("Already #shorts", 100), "Already #shorts");
    }

    #[test]
    fn test_optimize_title_truncates_on_char_boundary() {
        let long = "é".repeat(120);
        let title = optimize_title(&long, 100);
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_optimize_title_respects_tiny_limits() {
        assert_eq!(optimize_title("Cat", 0), "");
        assert_eq!(optimize_title("Cat", 2), "Ca");
        assert_eq!(optimize_title("Cat", 3), "...");
        for max_len in 0..12 {
            assert!(optimize_title("A long enough title", max_len).chars().count() <= max_len);
        }
    }

    #[test]
    fn test_format_description_adds_hashtags() {
        let tags = vec!["cute cats".to_string(), "#funny".to_string(), "shorts".to_string()];
        let description = format_description("Watch this.", &tags);
        assert_eq!(description, "Watch this.\n\n#Shorts #cutecats #funny");
    }

    #[test]
    fn test_format_description_limits_hashtags() {
        let tags: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        let description = format_description("#Shorts already", &tags);
        assert_eq!(description.matches('#').count(), 1 + MAX_DESCRIPTION_HASHTAGS);
    }

    #[test]
    fn test_sanitize_tags() {
        let tags = vec![
            "#Cats".to_string(),
            "cats".to_string(),
            "  ".to_string(),
            "funny pets".to_string(),
        ];
        assert_eq!(sanitize_tags(&tags), vec!["Cats".to_string(), "funny pets".to_string()]);
    }

    #[test]
    fn test_sanitize_tags_respects_budget() {
        let tags: Vec<String> = (0..100).map(|i| format!("{:0>20}", i)).collect();
        let cleaned = sanitize_tags(&tags);
        let total: usize = cleaned.iter().map(|t| t.len()).sum::<usize>() + cleaned.len() - 1;
        assert!(total <= MAX_TAGS_TOTAL_CHARS);
        assert_eq!(cleaned.len(), 23);
    }
}
