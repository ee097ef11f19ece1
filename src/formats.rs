use serde::Serialize;

const MAX_TITLE_CHARS: usize = 200;
const FULL_HD_HEIGHT: u32 = 1080;

/// The three download formats the relay knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    Mp4Hd,
    Mp4FullHd,
    Mp3,
}

impl FormatCode {
    pub const ALL: [FormatCode; 3] = [FormatCode::Mp4Hd, FormatCode::Mp4FullHd, FormatCode::Mp3];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mp4-720" => Some(Self::Mp4Hd),
            "mp4-1080" => Some(Self::Mp4FullHd),
            "mp3" => Some(Self::Mp3),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Mp4Hd => "mp4-720",
            Self::Mp4FullHd => "mp4-1080",
            Self::Mp3 => "mp3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mp4Hd => "MP4 — 720p HD",
            Self::Mp4FullHd => "MP4 — 1080p Full HD",
            Self::Mp3 => "MP3 — Sadece Ses",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, Self::Mp3)
    }

    /// Resolution ceiling for video formats.
    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::Mp4Hd => Some(720),
            Self::Mp4FullHd => Some(FULL_HD_HEIGHT),
            Self::Mp3 => None,
        }
    }

    pub fn extension(self) -> &'static str {
        if self.is_audio() { "mp3" } else { "mp4" }
    }

    pub fn mime_type(self) -> &'static str {
        if self.is_audio() {
            "audio/mpeg"
        } else {
            "video/mp4"
        }
    }

    pub fn attachment_filename(self) -> String {
        format!("videosnap.{}", self.extension())
    }
}

impl std::fmt::Display for FormatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub code: &'static str,
    pub label: &'static str,
}

impl From<FormatCode> for FormatOption {
    fn from(format: FormatCode) -> Self {
        Self {
            code: format.code(),
            label: format.label(),
        }
    }
}

/// Menu offered without looking at the source.
pub fn full_menu() -> Vec<FormatOption> {
    FormatCode::ALL.into_iter().map(FormatOption::from).collect()
}

/// Menu offered after probing: 1080p only when the source reaches it.
pub fn probed_menu(max_height: Option<u32>) -> Vec<FormatOption> {
    FormatCode::ALL
        .into_iter()
        .filter(|format| match format {
            FormatCode::Mp4FullHd => max_height.is_some_and(|height| height >= FULL_HD_HEIGHT),
            _ => true,
        })
        .map(FormatOption::from)
        .collect()
}

/// Turns a backend-reported filename into a display title.
pub fn title_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    clamp_title(stem)
}

/// Replaces separators with spaces and caps the length.
pub fn clamp_title(value: &str) -> String {
    value
        .chars()
        .map(|character| match character {
            '-' | '_' => ' ',
            other => other,
        })
        .take(MAX_TITLE_CHARS)
        .collect()
}
