//! Identifier generation.
//!
//! All ids are process-unique. Response ids are built from UUIDv7, so their
//! lexical order follows creation order.

use uuid::Uuid;

pub const RESPONSE_ID_PREFIX: &str = "resp_";
pub const MESSAGE_ID_PREFIX: &str = "msg_";
pub const FUNCTION_CALL_ID_PREFIX: &str = "fc_";
pub const TOOL_CALL_ID_PREFIX: &str = "call_";

const TOOL_CALL_HEX_LEN: usize = 24;

/// Time-ordered response id.
pub fn response_id() -> String {
    format!("{RESPONSE_ID_PREFIX}{}", Uuid::now_v7().simple())
}

/// Output message item id.
pub fn message_id() -> String {
    format!("{MESSAGE_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Output function-call item id.
pub fn function_call_item_id() -> String {
    format!("{FUNCTION_CALL_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Synthesized tool-call id for backends that stream calls without one.
pub fn tool_call_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{TOOL_CALL_ID_PREFIX}{}", &hex[..TOOL_CALL_HEX_LEN])
}
