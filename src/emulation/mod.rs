//! Responses protocol emulation over plain streaming chat completions.

pub mod events;
pub mod object;
pub mod service;

pub use events::ResponseEvent;
pub use object::{
    ItemStatus, OutputContent, OutputFunctionCall, OutputItem, OutputMessage, ResponseError,
    ResponseObject,
};
pub use service::{ResponseEventStream, ResponsesEmulator, ResponsesInput, ResponsesRequest};
