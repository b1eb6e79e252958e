//! Переписывание SDP: порядок кодеков и ограничение битрейта.
//!
//! Все функции чистые: при отсутствии нужной секции или кодека SDP
//! возвращается без изменений.

use crate::model::CodecPreferences;

pub const DEFAULT_AUDIO_CODEC: &str = "opus";
pub const DEFAULT_VIDEO_CODEC: &str = "H264";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSection {
    Audio,
    Video,
}

impl MediaSection {
    fn m_line_prefix(&self) -> &'static str {
        match self {
            Self::Audio => "m=audio ",
            Self::Video => "m=video ",
        }
    }
}

fn separator(sdp: &str) -> &'static str {
    if sdp.contains("\r\n") { "\r\n" } else { "\n" }
}

fn split_lines<'a>(sdp: &'a str, sep: &str) -> Vec<&'a str> {
    sdp.split(sep).collect()
}

/// Line range `[m_line, next_m_line)` of the first section of the given kind.
fn section_bounds(lines: &[&str], section: MediaSection) -> Option<(usize, usize)> {
    let start = lines
        .iter()
        .position(|l| l.starts_with(section.m_line_prefix()))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with("m="))
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());
    Some((start, end))
}

/// Payload type from `a=rtpmap:<pt> <codec>/<clock>[/<channels>]`.
fn rtpmap_payload_type<'a>(line: &'a str, codec: &str) -> Option<&'a str> {
    let rest = line.strip_prefix("a=rtpmap:")?;
    let (pt, encoding) = rest.split_once(' ')?;
    if pt.is_empty() || !pt.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut parts = encoding.split('/');
    let name = parts.next()?;
    let clock = parts.next()?;
    if !name.eq_ignore_ascii_case(codec) || clock.is_empty() {
        return None;
    }
    Some(pt)
}

/// `m=<media> <port> <proto> <fmt...>` with `pt` moved to the front of the format list.
/// `None` when the m-line does not list `pt` at all.
fn reorder_m_line(m_line: &str, pt: &str) -> Option<String> {
    let parts: Vec<&str> = m_line.split(' ').collect();
    if parts.len() <= 3 || !parts[3..].contains(&pt) {
        return None;
    }

    let mut formats: Vec<&str> = parts[3..].iter().copied().filter(|f| *f != pt).collect();
    formats.insert(0, pt);

    let reordered = parts[..3]
        .iter()
        .copied()
        .chain(formats)
        .collect::<Vec<_>>()
        .join(" ");
    Some(reordered)
}

/// Moves the payload type of `codec` to the front of the section's format list.
pub fn prefer_codec(sdp: &str, codec: &str, section: MediaSection) -> String {
    let sep = separator(sdp);
    let lines = split_lines(sdp, sep);

    let Some((start, end)) = section_bounds(&lines, section) else {
        return sdp.to_owned();
    };
    let Some(pt) = lines[start + 1..end]
        .iter()
        .find_map(|l| rtpmap_payload_type(l, codec))
    else {
        return sdp.to_owned();
    };
    let Some(m_line) = reorder_m_line(lines[start], pt) else {
        return sdp.to_owned();
    };

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| if i == start { m_line.as_str() } else { *line })
        .collect::<Vec<_>>()
        .join(sep)
}

/// Applies the audio then the video preference. Unset preferences fall back
/// to `DEFAULT_AUDIO_CODEC` and `DEFAULT_VIDEO_CODEC`.
pub fn negotiate(sdp: &str, prefs: &CodecPreferences) -> String {
    let audio = prefs.audio.as_deref().unwrap_or(DEFAULT_AUDIO_CODEC);
    let video = prefs.video.as_deref().unwrap_or(DEFAULT_VIDEO_CODEC);

    let out = prefer_codec(sdp, audio, MediaSection::Audio);
    prefer_codec(&out, video, MediaSection::Video)
}

/// Sets `b=AS:<kbps>` for the section, replacing an existing one.
pub fn limit_bandwidth(sdp: &str, section: MediaSection, kbps: u32) -> String {
    let sep = separator(sdp);
    let mut lines: Vec<String> = split_lines(sdp, sep).into_iter().map(str::to_owned).collect();
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();

    let Some((start, end)) = section_bounds(&borrowed, section) else {
        return sdp.to_owned();
    };

    let bandwidth = format!("b=AS:{kbps}");
    let existing = borrowed[start + 1..end]
        .iter()
        .position(|l| l.starts_with("b=AS:"))
        .map(|offset| start + 1 + offset);
    let connection_line = borrowed[start + 1..end]
        .iter()
        .position(|l| l.starts_with("c="))
        .map(|offset| start + 1 + offset);

    match (existing, connection_line) {
        (Some(i), _) => lines[i] = bandwidth,
        (None, Some(c)) => lines.insert(c + 1, bandwidth),
        (None, None) => lines.insert(start + 1, bandwidth),
    }

    lines.join(sep)
}
