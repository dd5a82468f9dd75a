use super::ContentPart;
use serde::{Deserialize, Serialize};

/// Structured output of the code-generation stream.
///
/// Every field is optional: while streaming the value is a partial snapshot, and
/// the model may still omit fields in the final object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_additional_dependencies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dependencies_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Canonical serialization of a fragment, used only to spot duplicate completions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        *self == Fragment::default()
    }

    /// Field order is fixed by the struct and absent fields are skipped, so equal
    /// values always produce equal strings.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(serde_json::to_string(self).unwrap_or_default())
    }

    pub fn commentary_text(&self) -> &str {
        self.commentary.as_deref().unwrap_or("")
    }

    pub fn code_text(&self) -> &str {
        self.code.as_deref().unwrap_or("")
    }

    pub fn assistant_content(&self) -> Vec<ContentPart> {
        vec![
            ContentPart::text(self.commentary_text()),
            ContentPart::code(self.code_text()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_construction_order() {
        let a: Fragment =
            serde_json::from_str(r#"{"code":"x","commentary":"c","template":"nextjs-developer"}"#)
                .unwrap();
        let b: Fragment =
            serde_json::from_str(r#"{"template":"nextjs-developer","commentary":"c","code":"x"}"#)
                .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = Fragment {
            code: Some("y".to_string()),
            ..a.clone()
        };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_empty_fragment_detection() {
        assert!(Fragment::default().is_empty());
        let parsed: Fragment = serde_json::from_str(r#"{"unknown":1}"#).unwrap();
        assert!(parsed.is_empty());
        assert!(!Fragment {
            title: Some(String::new()),
            ..Fragment::default()
        }
        .is_empty());
    }

    #[test]
    fn test_assistant_content_defaults_missing_fields_to_empty() {
        let fragment = Fragment {
            code: Some("console.log(1)".to_string()),
            ..Fragment::default()
        };
        assert_eq!(
            fragment.assistant_content(),
            vec![ContentPart::text(""), ContentPart::code("console.log(1)")]
        );
    }
}
