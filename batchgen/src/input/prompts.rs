//! Prompt text segmentation.
//!
//! A batch file is split into prompts using the first format that matches:
//! scene headers (`Scene 3 — ...`), a numbered list (`3. ...`), or blocks
//! separated by blank lines.

use regex::Regex;
use std::sync::LazyLock;

static SCENE_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Scene\s+\d+\s*[—–-]").unwrap());
static SCENE_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Scene\s+\d+").unwrap());
static NUMBERED_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\.\s").unwrap());
static NUMBERED_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s").unwrap());
static BLANK_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static ASSET_DIRECTIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*images?:\s*(?:\[([^\]]+)\]|(.+))$").unwrap()
});
static ASSET_SEPARATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,\s]+").unwrap());

const SEPARATOR: &str = "---";
const HEAVY_SEPARATOR: &str = "=======";

/// Prompt text with its auxiliary asset names split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDirective {
    pub text: String,
    pub asset_names: Vec<String>,
}

/// Split a batch file into prompts.
pub fn parse_prompts(content: &str) -> Vec<String> {
    if SCENE_HEADER_REGEX.is_match(content) {
        parse_scenes(content)
    } else if NUMBERED_LINE_REGEX.is_match(content) {
        parse_numbered(content)
    } else {
        parse_blocks(content)
    }
}

fn parse_scenes(content: &str) -> Vec<String> {
    let mut starts: Vec<usize> = SCENE_HEADER_REGEX
        .find_iter(content)
        .map(|m| m.start())
        .collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(content.len());

    starts
        .windows(2)
        .map(|w| content[w[0]..w[1]].trim())
        .filter(|block| !block.is_empty() && SCENE_START_REGEX.is_match(block))
        .map(str::to_string)
        .collect()
}

fn parse_numbered(content: &str) -> Vec<String> {
    let mut prompts = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.contains(SEPARATOR) {
            continue;
        }

        if NUMBERED_PREFIX_REGEX.is_match(trimmed) {
            if !current.is_empty() {
                prompts.push(std::mem::take(&mut current));
            }
            current = NUMBERED_PREFIX_REGEX.replace(trimmed, "").trim().to_string();
        } else if !trimmed.is_empty() && !trimmed.contains(HEAVY_SEPARATOR) {
            current.push(' ');
            current.push_str(trimmed);
        }
    }
    if !current.is_empty() {
        prompts.push(current);
    }
    prompts
}

fn parse_blocks(content: &str) -> Vec<String> {
    let is_separator = |s: &str| s.contains(HEAVY_SEPARATOR) || s.contains(SEPARATOR);

    let prompts: Vec<String> = BLANK_LINE_REGEX
        .split(content)
        .map(str::trim)
        .filter(|block| !block.is_empty() && !is_separator(block))
        .map(str::to_string)
        .collect();

    let whole = content.trim();
    if prompts.is_empty() && !whole.is_empty() && !is_separator(content) {
        return vec![whole.to_string()];
    }
    prompts
}

/// Split an `image:`/`images:` line off a prompt.
///
/// Accepts `images: a.png, b.png`, `images: [a.png b.png]` and the singular
/// form. Only the first directive is honored.
pub fn extract_asset_directive(text: &str) -> AssetDirective {
    let Some(caps) = ASSET_DIRECTIVE_REGEX.captures(text) else {
        return AssetDirective {
            text: text.to_string(),
            asset_names: Vec::new(),
        };
    };

    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())
        .unwrap_or_default();
    let asset_names: Vec<String> = ASSET_SEPARATOR_REGEX
        .split(raw)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let cleaned = ASSET_DIRECTIVE_REGEX.replace(text, "").trim().to_string();

    AssetDirective {
        text: cleaned,
        asset_names,
    }
}
