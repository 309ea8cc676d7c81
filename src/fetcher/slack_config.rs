//! Slack Web API endpoint table
//!
//! Which method each [`ApiCall`] maps to, where its payload lives in the
//! response and how it continues. Keeps the per-endpoint differences as data
//! rather than as separate code paths.

use super::pagination::{PagePolicy, PageToken};
use super::ApiCall;

/// Default Slack Web API base URL
pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Page size requested from cursor-paginated endpoints (Slack caps at 1000)
pub const CURSOR_PAGE_LIMIT: u32 = 200;

/// Page size requested from counted-page endpoints
pub const COUNTED_PAGE_SIZE: u32 = 100;

/// Conversation types requested from `conversations.list`
pub const CONVERSATION_TYPES: &str = "public_channel,private_channel,mpim,im";

/// How an endpoint returns its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A list of items, possibly spread across pages
    List(PagePolicy),
    /// A single object in one response
    Object,
}

/// Static description of one Slack method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Web API method name (e.g. "conversations.history")
    pub method: &'static str,
    /// Response field holding the items or the object
    pub payload_field: &'static str,
    /// Payload shape and continuation style
    pub shape: ResponseShape,
}

/// `conversations.list`
pub const CONVERSATIONS_LIST: EndpointSpec = EndpointSpec {
    method: "conversations.list",
    payload_field: "channels",
    shape: ResponseShape::List(PagePolicy::cursor()),
};

/// `users.list`
pub const USERS_LIST: EndpointSpec = EndpointSpec {
    method: "users.list",
    payload_field: "members",
    shape: ResponseShape::List(PagePolicy::cursor()),
};

/// `emoji.list`
pub const EMOJI_LIST: EndpointSpec = EndpointSpec {
    method: "emoji.list",
    payload_field: "emoji",
    shape: ResponseShape::Object,
};

/// `files.list`
pub const FILES_LIST: EndpointSpec = EndpointSpec {
    method: "files.list",
    payload_field: "files",
    shape: ResponseShape::List(PagePolicy::counted()),
};

/// `conversations.history`
pub const CONVERSATIONS_HISTORY: EndpointSpec = EndpointSpec {
    method: "conversations.history",
    payload_field: "messages",
    shape: ResponseShape::List(PagePolicy::cursor()),
};

/// `conversations.info`
pub const CONVERSATIONS_INFO: EndpointSpec = EndpointSpec {
    method: "conversations.info",
    payload_field: "channel",
    shape: ResponseShape::Object,
};

/// `conversations.members`
pub const CONVERSATIONS_MEMBERS: EndpointSpec = EndpointSpec {
    method: "conversations.members",
    payload_field: "members",
    shape: ResponseShape::List(PagePolicy::cursor()),
};

/// `pins.list`
pub const PINS_LIST: EndpointSpec = EndpointSpec {
    method: "pins.list",
    payload_field: "items",
    shape: ResponseShape::List(PagePolicy::Single),
};

/// `conversations.replies`
pub const CONVERSATIONS_REPLIES: EndpointSpec = EndpointSpec {
    method: "conversations.replies",
    payload_field: "messages",
    shape: ResponseShape::List(PagePolicy::cursor()),
};

impl ApiCall {
    /// Endpoint description for this call
    pub fn endpoint(&self) -> &'static EndpointSpec {
        match self {
            ApiCall::ConversationList => &CONVERSATIONS_LIST,
            ApiCall::UserList => &USERS_LIST,
            ApiCall::EmojiList => &EMOJI_LIST,
            ApiCall::FileList => &FILES_LIST,
            ApiCall::History(_) => &CONVERSATIONS_HISTORY,
            ApiCall::Info(_) => &CONVERSATIONS_INFO,
            ApiCall::Members(_) => &CONVERSATIONS_MEMBERS,
            ApiCall::Pins(_) => &PINS_LIST,
            ApiCall::Replies(_, _) => &CONVERSATIONS_REPLIES,
        }
    }

    /// Query parameters for this call, continuing at `token`
    pub fn query_params(&self, token: Option<&PageToken>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        match self {
            ApiCall::ConversationList => {
                params.push(("types", CONVERSATION_TYPES.to_string()));
            }
            ApiCall::History(id)
            | ApiCall::Info(id)
            | ApiCall::Members(id)
            | ApiCall::Pins(id) => {
                params.push(("channel", id.to_string()));
            }
            ApiCall::Replies(id, ts) => {
                params.push(("channel", id.to_string()));
                params.push(("ts", ts.clone()));
            }
            ApiCall::UserList | ApiCall::EmojiList | ApiCall::FileList => {}
        }

        match self.endpoint().shape {
            ResponseShape::List(PagePolicy::Cursor(_)) => {
                params.push(("limit", CURSOR_PAGE_LIMIT.to_string()));
            }
            ResponseShape::List(PagePolicy::Counted(_)) => {
                params.push(("count", COUNTED_PAGE_SIZE.to_string()));
            }
            _ => {}
        }

        match token {
            Some(PageToken::Cursor(cursor)) => params.push(("cursor", cursor.clone())),
            Some(PageToken::Page(page)) => params.push(("page", page.to_string())),
            None => {}
        }

        params
    }
}
