// ffprobe-based inspection of video files, plus descriptive hints for metadata prompts

use crate::error::{Result, UploaderError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

/// Longest video YouTube treats as a Short.
pub const MAX_SHORT_SECONDS: f64 = 180.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoProbe {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub rotation: i32,
    pub has_audio: bool,
    pub format: String,
    pub file_size_mb: f64,
}

impl VideoProbe {
    /// Display dimensions, accounting for rotation metadata from phones.
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn is_vertical(&self) -> bool {
        let (w, h) = self.display_dimensions();
        h > w
    }

    pub fn is_short_form(&self) -> bool {
        self.is_vertical() && self.duration_seconds > 0.0 && self.duration_seconds <= MAX_SHORT_SECONDS
    }
}

/// Execute FFprobe for media analysis
fn execute_ffprobe_command(args: &[&str]) -> Result<String> {
    let output = Command::new("ffprobe")
        .args(args)
        .output()
        .map_err(|e| UploaderError::Probe(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UploaderError::Probe(format!("ffprobe error: {}", stderr.trim())));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub fn probe_video(path: &Path) -> Result<VideoProbe> {
    let file = path.to_string_lossy();
    let args = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        file.as_ref(),
    ];
    let output = execute_ffprobe_command(&args)?;
    parse_ffprobe_output(&output)
}

/// Like `probe_video`, but a missing ffprobe or unreadable file only logs.
pub fn try_probe_video(path: &Path) -> Option<VideoProbe> {
    match probe_video(path) {
        Ok(probe) => Some(probe),
        Err(e) => {
            tracing::warn!("Could not probe {}: {}", path.display(), e);
            None
        }
    }
}

pub fn parse_ffprobe_output(output: &str) -> Result<VideoProbe> {
    let json: Value = serde_json::from_str(output)
        .map_err(|e| UploaderError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let format = &json["format"];
    let number = |v: &Value| -> f64 {
        v.as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| v.as_f64())
            .unwrap_or(0.0)
    };

    let mut probe = VideoProbe {
        duration_seconds: number(&format["duration"]),
        width: 0,
        height: 0,
        fps: 0.0,
        rotation: 0,
        has_audio: false,
        format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
        file_size_mb: number(&format["size"]) / (1024.0 * 1024.0),
    };

    let mut has_video = false;
    for stream in json["streams"].as_array().into_iter().flatten() {
        match stream["codec_type"].as_str() {
            Some("video") if !has_video => {
                has_video = true;
                probe.width = stream["width"].as_u64().unwrap_or(0) as u32;
                probe.height = stream["height"].as_u64().unwrap_or(0) as u32;
                probe.fps = parse_frame_rate(stream["r_frame_rate"].as_str().unwrap_or("0/1"));
                probe.rotation = stream_rotation(stream);
                if probe.duration_seconds == 0.0 {
                    probe.duration_seconds = number(&stream["duration"]);
                }
            }
            Some("audio") => probe.has_audio = true,
            _ => {}
        }
    }

    if !has_video {
        return Err(UploaderError::Probe("No video stream found".to_string()));
    }
    Ok(probe)
}

fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den != 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.parse().unwrap_or(0.0),
    }
}

// Older muxers use a "rotate" tag, newer ffprobe reports display matrix side data
fn stream_rotation(stream: &Value) -> i32 {
    if let Some(rotate) = stream["tags"]["rotate"].as_str().and_then(|r| r.parse().ok()) {
        return rotate;
    }
    stream["side_data_list"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|side| side["rotation"].as_i64())
        .unwrap_or(0) as i32
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "video", "clip", "final", "edit", "copy",
    "img", "vid", "mov", "mp4", "export", "new", "short", "shorts",
];

/// Descriptive labels with occurrence counts, most frequent first. File name
/// words come first, then facts about the footage.
pub fn content_hints(path: &Path, probe: Option<&VideoProbe>) -> Vec<(String, usize)> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut push = |label: String| {
        let count = counts.entry(label.clone()).or_insert(0);
        if *count == 0 {
            order.push(label);
        }
        *count += 1;
    };

    for word in stem.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < 3 || word.chars().all(|c| c.is_ascii_digit()) || STOPWORDS.contains(&word) {
            continue;
        }
        push(word.to_string());
    }

    if let Some(probe) = probe {
        let (w, h) = probe.display_dimensions();
        push(
            match h.cmp(&w) {
                std::cmp::Ordering::Greater => "vertical video",
                std::cmp::Ordering::Less => "horizontal video",
                std::cmp::Ordering::Equal => "square video",
            }
            .to_string(),
        );
        if probe.duration_seconds > 0.0 && probe.duration_seconds <= 15.0 {
            push("quick clip".to_string());
        }
        if probe.fps >= 50.0 {
            push("smooth slow motion".to_string());
        }
        if w.max(h) >= 2160 {
            push("4k footage".to_string());
        }
        push(if probe.has_audio { "with sound" } else { "silent footage" }.to_string());
    }

    let mut hints: Vec<(String, usize)> = order
        .into_iter()
        .map(|label| {
            let count = counts.get(&label).copied().unwrap_or(1);
            (label, count)
        })
        .collect();
    // Stable sort keeps first-seen order among equal counts
    hints.sort_by(|a, b| b.1.cmp(&a.1));
    hints
}
