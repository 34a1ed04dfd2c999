//! Post-processing of free-form model output.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::WardrobeItemInsert;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("valid fence regex"));

/// Returns the first balanced top-level `{...}` in `text`, looking inside code fences first.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(inner) = CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    {
        if let Some(found) = scan_object(inner) {
            return Some(found);
        }
    }
    scan_object(text)
}

fn scan_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            let candidate = &text[start..start + end + 1];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte index of the brace closing the one at index 0, string-literal aware.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct RawWardrobeAnalysis {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("model answer has no '{field}'"))
}

/// Turns the model's garment description into a row ready for storage.
pub fn parse_wardrobe_analysis(text: &str) -> Result<WardrobeItemInsert> {
    let json = extract_json_object(text)
        .ok_or_else(|| anyhow!("model answer contains no JSON object"))?;
    let raw: RawWardrobeAnalysis = serde_json::from_str(json)?;

    Ok(WardrobeItemInsert {
        category: required("category", raw.category)?,
        color: required("color", raw.color)?,
        style: required("style", raw.style)?,
        description: raw
            .description
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    })
}
