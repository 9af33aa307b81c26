//! YAML utilities for iRacing session info preprocessing
//!
//! iRacing's YAML output has several non-standard issues that need correction:
//! - Free-text values (driver and team names, setup names) are written unquoted
//!   and may contain `:`, `'`, `#` or start with `,`
//! - Control characters that break YAML parsers
//! - The block is written in the simulator's Windows code page, not UTF-8
//!
//! This module provides low-level YAML cleaning without parsing.

use encoding_rs::WINDOWS_1252;

use crate::{GarageError, Result};

/// Keys whose values are free text and must be quoted before parsing.
const FREE_TEXT_KEYS: &[&str] = &[
    "AbbrevName:",
    "TeamName:",
    "UserName:",
    "Initials:",
    "DriverSetupName:",
    "CarDesignStr:",
];

/// Preprocess iRacing YAML to fix known issues
///
/// Removes control characters (except `\n`, `\r`, `\t`) and single-quotes the
/// values of known free-text keys, doubling any embedded single quotes.
///
/// Returns the cleaned YAML string ready for parsing.
pub fn preprocess_iracing_yaml(yaml: &str) -> Result<String> {
    let cleaned: String =
        yaml.chars().filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\r' | '\t')).collect();

    if cleaned.trim().is_empty() {
        return Err(GarageError::parse(
            "YAML preprocessing",
            "YAML is empty after preprocessing",
        ));
    }

    let mut result = String::with_capacity(cleaned.len() + 64);
    for (i, line) in cleaned.split('\n').enumerate() {
        if i > 0 {
            result.push('\n');
        }
        result.push_str(&quote_free_text(line));
    }

    Ok(result)
}

fn quote_free_text(line: &str) -> std::borrow::Cow<'_, str> {
    for key in FREE_TEXT_KEYS {
        let Some(key_pos) = line.find(key) else {
            continue;
        };
        // Only whole keys: `TeamName:` must not match inside `CarTeamName:`.
        let preceded_by_ident =
            line[..key_pos].chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());
        if preceded_by_ident {
            continue;
        }

        let after_colon = key_pos + key.len();
        let rest = &line[after_colon..];
        let Some(value_start) = rest.find(|c: char| !c.is_whitespace()) else {
            return line.into();
        };
        let value = rest[value_start..].trim_end_matches(['\r', ' ', '\t']);
        if value.starts_with('\'') || value.starts_with('"') {
            return line.into();
        }

        let escaped = value.replace('\'', "''");
        return format!("{}{}'{}'", &line[..after_colon], &rest[..value_start], escaped).into();
    }
    line.into()
}

/// Extract the session info block from a file buffer
///
/// Trailing NUL padding is stripped. The text is decoded as UTF-8 when valid,
/// otherwise as Windows-1252. Returns the raw YAML string without preprocessing.
pub fn extract_yaml_from_memory(data: &[u8], offset: i32, length: i32) -> Result<String> {
    if offset < 0 {
        return Err(GarageError::parse("YAML extraction", format!("Invalid offset: {}", offset)));
    }

    if length <= 0 {
        return Ok(String::new());
    }

    let offset = offset as usize;
    let length = length as usize;

    let end = offset.checked_add(length).filter(|end| *end <= data.len()).ok_or_else(|| {
        GarageError::parse(
            "YAML extraction",
            format!(
                "YAML extends beyond buffer bounds: offset={}, len={}, buffer_size={}",
                offset,
                length,
                data.len()
            ),
        )
    })?;

    let yaml_data = &data[offset..end];
    let yaml_len = yaml_data.iter().position(|&b| b == 0).unwrap_or(length);

    Ok(decode_session_text(&yaml_data[..yaml_len]))
}

/// Decode session text: UTF-8 if valid, Windows-1252 otherwise.
pub fn decode_session_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}
