// AI-generated titles, descriptions and hashtags for a video file

use crate::config::Settings;
use crate::error::{Result, UploaderError};
use crate::llm::{language_model_from_settings, LanguageModel};
use crate::probe::{content_hints, try_probe_video, VideoProbe};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

const MAX_PROMPT_LABELS: usize = 10;

lazy_static! {
    static ref FIELD_LINE: Regex =
        Regex::new(r"(?i)^[\s*_#>-]*(title|description|hashtags)[\s*_]*:[\s*_]*(.*)$").unwrap();
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataAlternative {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    /// Content hints with occurrence counts, most frequent first.
    pub labels: Vec<(String, usize)>,
    pub probe: Option<VideoProbe>,
    #[serde(default)]
    pub alternatives: Vec<MetadataAlternative>,
    /// False when the text came from fallbacks.
    pub ai_generated: bool,
}

/// Fields pulled out of a `TITLE:`/`DESCRIPTION:`/`HASHTAGS:` reply.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub hashtags: Vec<String>,
}

pub fn parse_metadata_response(text: &str) -> ParsedMetadata {
    let mut parsed = ParsedMetadata::default();

    for line in text.lines() {
        let Some(caps) = FIELD_LINE.captures(line.trim()) else {
            continue;
        };
        let value = caps[2].trim().trim_end_matches('*').trim();
        match caps[1].to_lowercase().as_str() {
            "title" => {
                let title = value.trim_matches('"').trim();
                if !title.is_empty() {
                    parsed.title = Some(title.to_string());
                }
            }
            "description" => {
                if !value.is_empty() {
                    parsed.description = Some(value.to_string());
                }
            }
            _ => parsed.hashtags = split_hashtags(value),
        }
    }

    parsed
}

fn split_hashtags(value: &str) -> Vec<String> {
    let separator = if value.contains(',') { ',' } else { ' ' };
    value
        .split(separator)
        .map(|tag| tag.trim().trim_start_matches('#').trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Accepts a bare JSON array, a fenced one, or an object wrapping one.
pub fn parse_alternatives(text: &str) -> Vec<MetadataAlternative> {
    let body = CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let value: Value = match serde_json::from_str(body.trim()) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to parse alternatives JSON: {}", e);
            return Vec::new();
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }) {
            Some(items) => items,
            None => {
                tracing::error!("Alternatives response was not a JSON array");
                return Vec::new();
            }
        },
        _ => {
            tracing::error!("Alternatives response was not a JSON array");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<MetadataAlternative>(item).ok())
        .filter(|alt| !alt.title.trim().is_empty())
        .map(|mut alt| {
            alt.hashtags = alt
                .hashtags
                .iter()
                .map(|t| t.trim().trim_start_matches('#').to_string())
                .filter(|t| !t.is_empty())
                .collect();
            alt
        })
        .collect()
}

/// "Video featuring a, b, c." from the top three labels.
pub fn fallback_description(labels: &[(String, usize)]) -> String {
    let top: Vec<&str> = labels.iter().take(3).map(|(label, _)| label.as_str()).collect();
    if top.is_empty() {
        "Video featuring content.".to_string()
    } else {
        format!("Video featuring {}.", top.join(", "))
    }
}

pub fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn format_labels(labels: &[(String, usize)]) -> String {
    if labels.is_empty() {
        return "none".to_string();
    }
    labels
        .iter()
        .take(MAX_PROMPT_LABELS)
        .map(|(label, count)| format!("{}({})", label, count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn with_style(mut prompt: String, style_prompt: Option<&str>) -> String {
    if let Some(style) = style_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\n\nAdditional style instructions: {}", style));
    }
    prompt
}

pub fn metadata_system_prompt() -> String {
    "You write metadata for YouTube Shorts. From the content hints and file name of a short video, \
write an engaging title, description and hashtags. Reply in exactly this format:\n\
TITLE: <title>\n\
DESCRIPTION: <description>\n\
HASHTAGS: <comma-separated hashtags without the # symbol>\n\n\
Guidelines:\n\
- Titles are catchy and to the point\n\
- Descriptions are 2-3 sentences that build on the title\n\
- Give 5-7 relevant hashtags\n\
- Sound like a person, not a model\n\
- Lean into curiosity and emotion"
        .to_string()
}

pub fn metadata_user_prompt(
    labels: &[(String, usize)],
    file_name: &str,
    max_title_length: usize,
    style_prompt: Option<&str>,
) -> String {
    let prompt = format!(
        "Content hints: {}\nFilename: {}\n\n\
Write a catchy title (max {} characters), an engaging 2-3 sentence description, \
and 5-7 hashtags that help this Short get discovered. Work the most prominent hints \
into your guess of what happens in the video, in a casual social-media voice.",
        format_labels(labels),
        file_name,
        max_title_length
    );
    with_style(prompt, style_prompt)
}

pub fn alternatives_system_prompt(count: usize) -> String {
    format!(
        "You write metadata for YouTube Shorts. Produce {} different title, description and hashtag \
combinations for one short video, each with its own angle or target audience. Reply with JSON only, \
as an array of objects: [{{\"title\": \"...\", \"description\": \"...\", \"hashtags\": [\"tag1\", \"tag2\"]}}]",
        count
    )
}

pub fn alternatives_user_prompt(
    labels: &[(String, usize)],
    file_name: &str,
    count: usize,
    max_title_length: usize,
    style_prompt: Option<&str>,
) -> String {
    let prompt = format!(
        "Content hints: {}\nFilename: {}\n\n\
Give {} metadata options for this YouTube Short. Keep titles under {} characters, \
descriptions 2-3 sentences, and 5-7 hashtags per option without the # symbol.",
        format_labels(labels),
        file_name,
        count,
        max_title_length
    );
    with_style(prompt, style_prompt)
}

pub struct MetadataGenerator {
    model: Option<Arc<dyn LanguageModel>>,
    max_title_length: usize,
    alternatives: usize,
    probe_enabled: bool,
}

impl MetadataGenerator {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, max_title_length: usize, alternatives: usize) -> Self {
        Self {
            model,
            max_title_length,
            alternatives,
            probe_enabled: true,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            language_model_from_settings(settings),
            settings.max_title_length,
            settings.alternatives,
        )
    }

    /// Skip ffprobe (labels then come from the file name only).
    pub fn without_probe(mut self) -> Self {
        self.probe_enabled = false;
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub async fn generate(&self, path: &Path, style_prompt: Option<&str>) -> Result<GeneratedMetadata> {
        if !path.exists() {
            return Err(UploaderError::NotFound(format!("Video file {}", path.display())));
        }

        let probe = if self.probe_enabled {
            let probe_path = path.to_path_buf();
            tokio::task::spawn_blocking(move || try_probe_video(&probe_path))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Probe task failed: {}", e);
                    None
                })
        } else {
            None
        };

        if let Some(probe) = &probe {
            if !probe.is_short_form() {
                tracing::warn!(
                    "{} does not look like a Short ({}x{}, {:.0}s); YouTube may treat it as a regular video",
                    path.display(),
                    probe.display_dimensions().0,
                    probe.display_dimensions().1,
                    probe.duration_seconds
                );
            }
        }

        let labels = content_hints(path, probe.as_ref());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut parsed = ParsedMetadata::default();
        let mut alternatives = Vec::new();

        if let Some(model) = &self.model {
            tracing::info!("Generating metadata for {} with {}", file_name, model.name());
            let user = metadata_user_prompt(&labels, &file_name, self.max_title_length, style_prompt);
            match model.complete(&metadata_system_prompt(), &user, false).await {
                Ok(text) => {
                    tracing::debug!("Model response: {}", text);
                    parsed = parse_metadata_response(&text);
                }
                Err(e) => tracing::error!("Error generating metadata: {}", e),
            }

            if self.alternatives > 0 {
                alternatives = self
                    .generate_alternatives(model.as_ref(), &labels, &file_name, style_prompt)
                    .await;
            }
        } else {
            tracing::warn!("No language model configured, using fallback metadata for {}", file_name);
        }

        let ai_generated = parsed.title.is_some();
        let title = parsed.title.unwrap_or_else(|| fallback_title(path));
        let description = parsed
            .description
            .unwrap_or_else(|| fallback_description(&labels));

        tracing::info!("Generated title: {}", title);

        Ok(GeneratedMetadata {
            title,
            description,
            hashtags: parsed.hashtags,
            labels,
            probe,
            alternatives,
            ai_generated,
        })
    }

    async fn generate_alternatives(
        &self,
        model: &dyn LanguageModel,
        labels: &[(String, usize)],
        file_name: &str,
        style_prompt: Option<&str>,
    ) -> Vec<MetadataAlternative> {
        tracing::info!("Generating {} alternative metadata options", self.alternatives);
        let system = alternatives_system_prompt(self.alternatives);
        let user = alternatives_user_prompt(labels, file_name, self.alternatives, self.max_title_length, style_prompt);

        match model.complete(&system, &user, true).await {
            Ok(text) => {
                let alternatives = parse_alternatives(&text);
                tracing::info!("Generated {} metadata alternatives", alternatives.len());
                alternatives
            }
            Err(e) => {
                tracing::error!("Error generating alternative metadata: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        async fn complete(&self, _system: &str, user: &str, json_output: bool) -> Result<String> {
            self.prompts.lock().unwrap().push((user.to_string(), json_output));
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn video(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    #[test]
    fn test_parse_metadata_response() {
        let text = "TITLE: My Cat vs The Cucumber\n\
                    DESCRIPTION: She did not expect that. Watch till the end!\n\
                    HASHTAGS: cats, #funny, , pets";
        let parsed = parse_metadata_response(text);
        assert_eq!(parsed.title.as_deref(), Some("My Cat vs The Cucumber"));
        assert_eq!(
            parsed.description.as_deref(),
            Some("She did not expect that. Watch till the end!")
        );
        assert_eq!(parsed.hashtags, vec!["cats", "funny", "pets"]);
    }

    #[test]
    fn test_parse_metadata_response_tolerates_markdown() {
        let text = "Here you go:\n**Title:** \"Skate Fail\"\n**Description:** Ouch.\n**Hashtags:** #skate #fail";
        let parsed = parse_metadata_response(text);
        assert_eq!(parsed.title.as_deref(), Some("Skate Fail"));
        assert_eq!(parsed.description.as_deref(), Some("Ouch."));
        assert_eq!(parsed.hashtags, vec!["skate", "fail"]);
    }

    #[test]
    fn test_parse_metadata_response_missing_fields() {
        let parsed = parse_metadata_response("I cannot help with that.");
        assert_eq!(parsed, ParsedMetadata::default());
    }

    #[test]
    fn test_parse_alternatives_variants() {
        let array = r##"[{"title": "A", "description": "a", "hashtags": ["#x", "y"]}, {"title": "B"}]"##;
        let parsed = parse_alternatives(array);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].hashtags, vec!["x", "y"]);

        let fenced = "```json\n[{\"title\": \"A\"}]\n```";
        assert_eq!(parse_alternatives(fenced).len(), 1);

        let wrapped = r#"{"alternatives": [{"title": "A"}, {"title": ""}]}"#;
        assert_eq!(parse_alternatives(wrapped).len(), 1);

        assert!(parse_alternatives(r#"{"title": "single"}"#).is_empty());
        assert!(parse_alternatives("nope").is_empty());
    }

    #[test]
    fn test_user_prompt_includes_labels_and_style() {
        let labels = vec![("cat".to_string(), 3), ("vertical video".to_string(), 1)];
        let prompt = metadata_user_prompt(&labels, "cat.mp4", 80, Some("  use emojis "));
        assert!(prompt.contains("Content hints: cat(3), vertical video(1)"));
        assert!(prompt.contains("Filename: cat.mp4"));
        assert!(prompt.contains("max 80 characters"));
        assert!(prompt.ends_with("Additional style instructions: use emojis"));

        let plain = metadata_user_prompt(&labels, "cat.mp4", 80, Some("   "));
        assert!(!plain.contains("Additional style instructions"));
    }

    #[test]
    fn test_fallbacks() {
        let labels = vec![
            ("cat".to_string(), 3),
            ("dog".to_string(), 2),
            ("sofa".to_string(), 1),
            ("rug".to_string(), 1),
        ];
        assert_eq!(fallback_description(&labels), "Video featuring cat, dog, sofa.");
        assert_eq!(fallback_description(&[]), "Video featuring content.");
        assert_eq!(fallback_title(Path::new("/x/My Clip.mp4")), "My Clip");
    }

    #[tokio::test]
    async fn test_generate_with_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = video(&dir, "dog_beach_zoomies.mp4");
        let model = ScriptedModel::new(vec![
            Ok("TITLE: Beach Zoomies\nDESCRIPTION: Pure joy.\nHASHTAGS: dogs, beach".to_string()),
            Ok(r#"[{"title": "Alt", "description": "d", "hashtags": ["a"]}]"#.to_string()),
        ]);

        let generator = MetadataGenerator::new(Some(model.clone()), 100, 3).without_probe();
        let metadata = generator.generate(&path, Some("funny")).await.unwrap();

        assert_eq!(metadata.title, "Beach Zoomies");
        assert_eq!(metadata.description, "Pure joy.");
        assert_eq!(metadata.hashtags, vec!["dogs", "beach"]);
        assert_eq!(metadata.alternatives.len(), 1);
        assert!(metadata.ai_generated);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("dog(1), beach(1), zoomies(1)"));
        assert!(!prompts[0].1);
        assert!(prompts[1].1);
    }

    #[tokio::test]
    async fn test_generate_falls_back_when_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = video(&dir, "sunset_timelapse.mov");
        let model = ScriptedModel::new(vec![Err(UploaderError::api(500, "boom"))]);

        let generator = MetadataGenerator::new(Some(model), 100, 0).without_probe();
        let metadata = generator.generate(&path, None).await.unwrap();

        assert_eq!(metadata.title, "sunset_timelapse");
        assert_eq!(metadata.description, "Video featuring sunset, timelapse.");
        assert!(metadata.hashtags.is_empty());
        assert!(!metadata.ai_generated);
    }

    #[tokio::test]
    async fn test_generate_without_model_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MetadataGenerator::new(None, 100, 3).without_probe();

        let metadata = generator.generate(&video(&dir, "IMG_0001.mp4"), None).await.unwrap();
        assert_eq!(metadata.title, "IMG_0001");
        assert_eq!(metadata.description, "Video featuring content.");

        let missing = generator.generate(&dir.path().join("gone.mp4"), None).await;
        assert!(matches!(missing, Err(UploaderError::NotFound(_))));
    }
}
