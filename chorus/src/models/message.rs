use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Image media types accepted anywhere in the system.
///
/// Individual providers may accept only a subset; see
/// `ProviderAdapter::supported_media_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Gif,
        MediaType::Webp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    /// Parses a MIME string. Parameters (`; charset=...`) and case are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/gif" => Ok(Self::Gif),
            "image/webp" => Ok(Self::Webp),
            _ => Err(format!("Unsupported media type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// `data` is standard padded base64.
    Image { media_type: MediaType, data: String },
}

/// Provider-agnostic form of one user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedMessage {
    parts: Vec<ContentPart>,
}

impl NormalizedMessage {
    /// Builds the message from a prompt and optional raw image bytes.
    /// A blank prompt contributes no text part.
    pub fn build(prompt: &str, image: Option<(MediaType, &[u8])>) -> Self {
        let mut parts = Vec::with_capacity(2);

        if !prompt.trim().is_empty() {
            parts.push(ContentPart::Text(prompt.to_string()));
        }

        if let Some((media_type, bytes)) = image {
            parts.push(ContentPart::Image {
                media_type,
                data: STANDARD.encode(bytes),
            });
        }

        Self { parts }
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn has_images(&self) -> bool {
        self.images().next().is_some()
    }

    pub fn images(&self) -> impl Iterator<Item = (MediaType, &str)> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::Image { media_type, data } => Some((*media_type, data.as_str())),
            ContentPart::Text(_) => None,
        })
    }

    /// All text parts joined with blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
