use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool results returned by the client
    Tool,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Message holding a single text block
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all text blocks
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls in this message, in order
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall { id, name, arguments } => Some((id.as_str(), name.as_str(), arguments.as_str())),
            _ => None,
        })
    }
}

/// Tagged unit of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text {
        /// The text string
        text: String,
    },
    /// Tool invocation requested by the assistant
    ToolCall {
        /// Call identifier, referenced by the matching result
        id: String,
        /// Tool name
        name: String,
        /// Arguments as JSON text, carried verbatim
        arguments: String,
    },
    /// Result of a tool invocation
    ToolResult {
        /// Identifier of the call this answers
        call_id: String,
        /// Result payload, carried verbatim
        content: String,
        /// Whether the tool reported a failure
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Image input
    Image {
        /// Where the image bytes come from
        source: MediaSource,
    },
}

/// Image payload descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// Inline base64 data
    Base64 {
        /// MIME type, e.g. `image/png`
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Remote image
    Url {
        /// Image URL
        url: String,
    },
}

impl MediaSource {
    /// Parse a `data:<mime>;base64,<data>` URI, or treat anything else as a URL
    pub fn from_uri(uri: &str) -> Self {
        uri.strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map_or_else(
                || Self::Url { url: uri.to_owned() },
                |(media_type, data)| Self::Base64 {
                    media_type: media_type.to_owned(),
                    data: data.to_owned(),
                },
            )
    }

    /// Render as a URI, inlining base64 data
    pub fn to_uri(&self) -> String {
        match self {
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
            Self::Url { url } => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trips() {
        let source = MediaSource::from_uri("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(
            source,
            MediaSource::Base64 {
                media_type: "image/png".to_owned(),
                data: "iVBORw0KGgo=".to_owned(),
            }
        );
        assert_eq!(source.to_uri(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn plain_urls_stay_urls() {
        let source = MediaSource::from_uri("https://example.com/cat.png");
        assert_eq!(
            source,
            MediaSource::Url {
                url: "https://example.com/cat.png".to_owned()
            }
        );
    }

    #[test]
    fn joined_text_skips_other_blocks() {
        let message = Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text { text: "a".to_owned() },
                ContentBlock::ToolCall {
                    id: "c1".to_owned(),
                    name: "f".to_owned(),
                    arguments: "{}".to_owned(),
                },
                ContentBlock::Text { text: "b".to_owned() },
            ],
        };
        assert_eq!(message.joined_text(), "ab");
        assert_eq!(message.tool_calls().count(), 1);
    }
}
