//! Canonical protocol: the stable format this gateway speaks to its callers

mod streaming;
mod types;

pub use streaming::{ContentDelta, ErrorBody, MessageDeltaBody, StreamEvent};
pub use types::{
    new_message_id, new_request_id, new_tool_use_id, validate, CanonicalRequest,
    CanonicalResponse, ContentBlock, ImageSource, Message, MessageContent, Role, StopReason,
    SystemBlock, SystemPrompt, TokenUsage, ToolResultContent, ToolSpec, ValidationError,
};
