//! Translation between the native chat API and the `OpenAI` Chat Completions API.
//!
//! The core of the bridge: converts requests, responses, and streaming chunks
//! between the two formats. Everything here is free of I/O except the SSE read
//! loop in [`streaming::transcode_stream`], which only touches the stream it is given.

pub mod chat_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
