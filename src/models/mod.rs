//! 客户端数据模型

pub mod openai;
pub mod responses;

pub use openai::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart,
    MessageContent, ResponseMessage, StreamOptions, Usage,
};
pub use responses::{ResponsesInput, ResponsesInputItem, ResponsesRequest};
