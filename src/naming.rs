// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::provider::{EpisodeInfo, ProgrammeInfo};

/// Maximum length for each name portion of a filename
const MAX_NAME_LENGTH: usize = 100;

/// Check if a character is allowed in filenames (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Generate a filename stem (without extension) for an episode
///
/// Format: "YYYY-MM-DD-programme-episode". The episode name is left out for
/// single-episode programmes and when it merely repeats the programme name.
pub fn final_name_stem(programme: &ProgrammeInfo, episode: &EpisodeInfo) -> String {
    let date_prefix = episode.date.format("%Y-%m-%d").to_string();

    let programme_name = sanitize_name(&programme.name);
    let episode_name = sanitize_name(&episode.name);

    let mut parts = vec![date_prefix];
    if !programme_name.is_empty() {
        parts.push(programme_name.clone());
    }
    if !programme.single_episode
        && !episode_name.is_empty()
        && !episode_name.eq_ignore_ascii_case(&programme_name)
    {
        parts.push(episode_name);
    }
    if parts.len() == 1 {
        parts.push("untitled".to_string());
    }

    parts.join("-")
}

/// Target path, without extension, for downloading an episode into `output_dir`
pub fn final_name(
    output_dir: &Path,
    programme: &ProgrammeInfo,
    episode: &EpisodeInfo,
) -> PathBuf {
    output_dir.join(final_name_stem(programme, episode))
}

/// Path of the file a provider produced for `final_name`.
///
/// The extension is appended rather than substituted, since stems may
/// contain dots.
pub fn output_path(final_name: &Path, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return final_name.to_path_buf();
    }

    let mut path = OsString::from(final_name.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Sanitize a provider supplied name for use in a filename.
///
/// Names scraped from web pages may still carry HTML entities, so those are
/// decoded before the whitelist is applied.
fn sanitize_name(name: &str) -> String {
    let decoded = html_escape::decode_html_entities(name);

    let sanitized: String = decoded
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    // Collapse multiple spaces/dashes into single dash
    let collapsed = collapse_separators(&sanitized);

    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());

    let limited = if trimmed.len() > MAX_NAME_LENGTH {
        truncate_at_boundary(trimmed, MAX_NAME_LENGTH)
    } else {
        trimmed.to_string()
    };

    // Reserved device names and the like
    sanitize_filename::sanitize_with_options(
        limited,
        sanitize_filename::Options {
            replacement: "-",
            ..Default::default()
        },
    )
}

/// Collapse multiple spaces and dashes into single dashes
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c == '-' || c.is_whitespace() {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

/// Truncate string at a word boundary
fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let truncated: String = s.chars().take(max_len).collect();
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}
