use super::{CycleId, Fragment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Code { text: String },
    /// Base64 data URL or remote reference.
    Image { image: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text { text: value.into() }
    }

    pub fn code(value: impl Into<String>) -> Self {
        ContentPart::Code { text: value.into() }
    }

    pub fn image(value: impl Into<String>) -> Self {
        ContentPart::Image {
            image: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, rename = "object", skip_serializing_if = "Option::is_none")]
    pub fragment: Option<Fragment>,
    /// Submission cycle that produced an assistant message. Never serialized.
    #[serde(skip)]
    pub cycle: Option<CycleId>,
}

impl Message {
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
            fragment: None,
            cycle: None,
        }
    }

    pub fn assistant(fragment: Fragment, cycle: CycleId) -> Self {
        Self {
            role: Role::Assistant,
            content: fragment.assistant_content(),
            fragment: Some(fragment),
            cycle: Some(cycle),
        }
    }

    pub fn is_assistant_of(&self, cycle: CycleId) -> bool {
        self.role == Role::Assistant && self.cycle == Some(cycle)
    }
}

/// Fields to shallow-merge into an existing message; `None` keeps the old value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub role: Option<Role>,
    pub content: Option<Vec<ContentPart>>,
    pub fragment: Option<Fragment>,
}

impl MessagePatch {
    pub fn apply(self, message: &mut Message) {
        if let Some(role) = self.role {
            message.role = role;
        }
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(fragment) = self.fragment {
            message.fragment = Some(fragment);
        }
    }
}

/// Message shape accepted by the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiMessage {
    pub role: String,
    pub content: Vec<ApiContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentPart {
    Text { text: String },
    Image { image: String },
}

/// Converts the transcript into wire messages. Code parts travel as text, in place,
/// so part order survives the trip.
pub fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|message| ApiMessage {
            role: message.role.as_str().to_string(),
            content: message
                .content
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } | ContentPart::Code { text } => {
                        ApiContentPart::Text { text: text.clone() }
                    }
                    ContentPart::Image { image } => ApiContentPart::Image {
                        image: image.clone(),
                    },
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_part_wire_tags() {
        let parts = vec![
            ContentPart::text("hi"),
            ContentPart::code("x = 1"),
            ContentPart::image("data:image/png;base64,AAAA"),
        ];
        let value = serde_json::to_value(&parts).unwrap();
        assert_eq!(value[0]["type"], "text");
        assert_eq!(value[1]["type"], "code");
        assert_eq!(value[1]["text"], "x = 1");
        assert_eq!(value[2]["image"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_api_messages_keep_part_order_and_flatten_code() {
        let messages = vec![
            Message::user(vec![
                ContentPart::text("look"),
                ContentPart::image("data:image/png;base64,AAAA"),
            ]),
            Message::assistant(
                Fragment {
                    commentary: Some("done".to_string()),
                    code: Some("print(1)".to_string()),
                    ..Fragment::default()
                },
                CycleId(1),
            ),
        ];

        let wire = to_api_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "user");
        assert!(matches!(&wire[0].content[1], ApiContentPart::Image { .. }));
        assert_eq!(wire[1].role, "assistant");
        assert_eq!(
            wire[1].content,
            vec![
                ApiContentPart::Text {
                    text: "done".to_string()
                },
                ApiContentPart::Text {
                    text: "print(1)".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_message_cycle_is_not_serialized() {
        let message = Message::assistant(Fragment::default(), CycleId(7));
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("cycle").is_none());
        assert_eq!(value["role"], "assistant");
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let mut message = Message::user(vec![ContentPart::text("a")]);
        MessagePatch {
            content: Some(vec![ContentPart::text("b")]),
            ..MessagePatch::default()
        }
        .apply(&mut message);
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, vec![ContentPart::text("b")]);
        assert!(message.fragment.is_none());
    }
}
