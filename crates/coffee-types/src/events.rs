use serde::{Deserialize, Serialize};

use crate::models::{ChatAddress, MemberId};

/// Menus the transport can show under a reply.
///
/// The core only names the menu; the transport decides how to render it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuToken {
    /// Hide any keyboard
    RemoveKeyboard,
    /// City picker
    Cities,
    /// "Remind me" + "Stop meetings"
    #[default]
    RemindStop,
    /// "Remind me" + "Change time" + "Stop meetings"
    RemindChangeTimeStop,
    /// "Join again"
    Activate,
}

/// A text message received from a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundMessage {
    pub member_id: MemberId,
    pub handle: String,
    pub chat_address: ChatAddress,
    pub text: String,
}

/// A message the transport should send right away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub destination: ChatAddress,
    pub text: String,
    pub menu: MenuToken,
}

impl Reply {
    pub fn new(destination: ChatAddress, text: impl Into<String>, menu: MenuToken) -> Self {
        Self {
            destination,
            text: text.into(),
            menu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_tokens_serialize_as_snake_case() {
        let reply = Reply::new(7, "hi", MenuToken::RemindChangeTimeStop);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["menu"], "remind_change_time_stop");
        assert_eq!(json["destination"], 7);
    }

    #[test]
    fn inbound_rejects_unknown_fields() {
        let raw = r#"{"member_id":1,"handle":"john","chat_address":1,"text":"/start","extra":true}"#;
        assert!(serde_json::from_str::<InboundMessage>(raw).is_err());
    }
}
