//! 请求处理模块
//!
//! 提供请求上下文。

mod context;

pub use context::RequestContext;
