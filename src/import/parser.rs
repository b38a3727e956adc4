//! Export document decoding.
//!
//! An export is a JSON array of conversations, each carrying an ordered array
//! of chat messages. Small files are decoded in one go; files above the
//! configured threshold are walked one conversation at a time so peak memory
//! stays bounded by the largest single conversation.

use serde::de::{self, DeserializeSeed, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThreadkeepError};
use crate::model::Sender;

/// Default size above which the streaming decoder is used (100 MiB).
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 100 * 1024 * 1024;

const STREAM_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// A conversation as it appears in the export document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConversation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chat_messages: Vec<ExportMessage>,
}

/// A chat message as it appears in the export document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<ContentBlock>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, rename = "parent_message_uuid")]
    pub parent_uuid: Option<String>,
}

/// A typed content block; only `text` blocks carry message text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentBlock {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ExportMessage {
    /// Message text: the direct field, else the first non-empty `text` block.
    #[must_use]
    pub fn text(&self) -> &str {
        if !self.text.is_empty() {
            return &self.text;
        }
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .find_map(|block| block.text.as_deref().filter(|t| !t.is_empty()))
            .unwrap_or("")
    }

    /// Declared parent UUID, treating an empty string as absent.
    #[must_use]
    pub fn parent_uuid(&self) -> Option<&str> {
        self.parent_uuid.as_deref().filter(|p| !p.is_empty())
    }

    /// # Errors
    ///
    /// Returns a validation error if the sender is not `human` or `assistant`.
    pub fn sender(&self) -> Result<Sender> {
        self.sender.parse()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How an export file is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Decode the whole array, then validate it.
    Batch,
    /// Decode and validate one conversation at a time.
    Streaming,
}

/// Decoder for one export file.
#[derive(Debug)]
pub struct ExportParser {
    path: PathBuf,
    size: u64,
    strategy: ParseStrategy,
}

impl ExportParser {
    /// Stat the file and pick a strategy from its size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be inspected.
    pub fn open(path: &Path, streaming_threshold: u64) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ThreadkeepError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ThreadkeepError::Io(e)
            }
        })?;
        let size = metadata.len();
        let strategy = if size > streaming_threshold {
            ParseStrategy::Streaming
        } else {
            ParseStrategy::Batch
        };

        Ok(Self {
            path: path.to_path_buf(),
            size,
            strategy,
        })
    }

    #[must_use]
    pub const fn strategy(&self) -> ParseStrategy {
        self.strategy
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Decode and validate the whole export.
    ///
    /// # Errors
    ///
    /// Returns a format error for malformed JSON or any failed validation.
    pub fn parse(&self) -> Result<Vec<ExportConversation>> {
        let bytes = fs::read(&self.path)?;
        let conversations: Vec<ExportConversation> =
            serde_json::from_slice(&bytes).map_err(malformed)?;
        validate_export(&conversations)?;
        Ok(conversations)
    }

    /// Decode conversations one at a time, validating each before handing it
    /// to `on_conversation` together with its position in the array.
    ///
    /// Any malformed token, failed validation, or callback error stops the walk
    /// and is returned; conversations already delivered must be discarded by
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns a format error, or the first error returned by the callback.
    pub fn stream<F>(&self, mut on_conversation: F) -> Result<usize>
    where
        F: FnMut(usize, ExportConversation) -> Result<()>,
    {
        let file = File::open(&self.path)?;
        let reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file);
        let mut deserializer = serde_json::Deserializer::from_reader(reader);

        let mut failure = None;
        let walked = ConversationStream {
            on_conversation: &mut on_conversation,
            failure: &mut failure,
        }
        .deserialize(&mut deserializer);

        if let Some(err) = failure {
            return Err(err);
        }
        let count = walked.map_err(malformed)?;
        deserializer.end().map_err(malformed)?;

        if count == 0 {
            return Err(ThreadkeepError::format("no conversations found in export"));
        }
        Ok(count)
    }
}

fn malformed(err: serde_json::Error) -> ThreadkeepError {
    if err.is_io() {
        return ThreadkeepError::Json(err);
    }
    ThreadkeepError::format(format!(
        "malformed JSON at line {}, column {}: {err}",
        err.line(),
        err.column()
    ))
}

/// Seed that walks the top-level array without collecting it.
struct ConversationStream<'a, F> {
    on_conversation: &'a mut F,
    failure: &'a mut Option<ThreadkeepError>,
}

impl<'de, F> DeserializeSeed<'de> for ConversationStream<'_, F>
where
    F: FnMut(usize, ExportConversation) -> Result<()>,
{
    type Value = usize;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<usize, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for ConversationStream<'_, F>
where
    F: FnMut(usize, ExportConversation) -> Result<()>,
{
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of conversations")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<usize, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let Self {
            on_conversation,
            failure,
        } = self;

        let mut index = 0;
        while let Some(conversation) = seq.next_element::<ExportConversation>()? {
            let delivered = validate_conversation(index, &conversation)
                .and_then(|()| on_conversation(index, conversation));
            if let Err(err) = delivered {
                *failure = Some(err);
                return Err(de::Error::custom("import aborted"));
            }
            index += 1;
        }
        Ok(index)
    }
}

/// Validate a fully decoded export.
///
/// # Errors
///
/// Returns a format error naming the first offending conversation or message.
pub fn validate_export(conversations: &[ExportConversation]) -> Result<()> {
    if conversations.is_empty() {
        return Err(ThreadkeepError::format("no conversations found in export"));
    }
    for (index, conversation) in conversations.iter().enumerate() {
        validate_conversation(index, conversation)?;
    }
    Ok(())
}

/// Validate one conversation's required fields.
///
/// # Errors
///
/// Returns a format error naming the offending conversation or message index.
pub fn validate_conversation(index: usize, conversation: &ExportConversation) -> Result<()> {
    let at = || format!("conversation {index}");
    if conversation.uuid.trim().is_empty() {
        return Err(ThreadkeepError::format_at(at(), "missing uuid"));
    }
    if conversation.created_at.trim().is_empty() {
        return Err(ThreadkeepError::format_at(at(), "missing created_at"));
    }

    for (position, message) in conversation.chat_messages.iter().enumerate() {
        let at = || format!("conversation {index}, message {position}");
        if message.uuid.trim().is_empty() {
            return Err(ThreadkeepError::format_at(at(), "missing uuid"));
        }
        if message.sender().is_err() {
            return Err(ThreadkeepError::format_at(
                at(),
                format!("invalid sender: '{}'", message.sender),
            ));
        }
    }
    Ok(())
}
