use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply of the sandbox endpoint. Web templates report a preview `url`;
/// interpreter templates report captured output and cell results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default)]
    pub sbx_id: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stdout: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_results: Vec<Value>,
}

impl ExecutionResult {
    pub fn is_web(&self) -> bool {
        self.url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_web_and_interpreter_results() {
        let web: ExecutionResult = serde_json::from_str(
            r#"{"sbxId":"sbx_1","template":"nextjs-developer","url":"https://3000-sbx.example"}"#,
        )
        .unwrap();
        assert!(web.is_web());
        assert_eq!(web.sbx_id, "sbx_1");

        let interpreter: ExecutionResult = serde_json::from_str(
            r#"{"sbxId":"sbx_2","template":"code-interpreter-v1","stdout":["1\n"],"stderr":[],"runtimeError":null,"cellResults":[{"text":"1"}]}"#,
        )
        .unwrap();
        assert!(!interpreter.is_web());
        assert_eq!(interpreter.stdout, vec!["1\n".to_string()]);
        assert_eq!(interpreter.cell_results.len(), 1);
    }
}
