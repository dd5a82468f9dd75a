use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Named execution environment the model may target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateDefinition {
    pub name: String,
    pub lib: Vec<String>,
    pub file: String,
    pub instructions: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Template id to definition. Ordered so request payloads are stable.
pub type Templates = BTreeMap<String, TemplateDefinition>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplateSelection {
    #[default]
    Auto,
    Specific(String),
}

impl FromStr for TemplateSelection {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Ok(TemplateSelection::Auto)
        } else {
            Ok(TemplateSelection::Specific(trimmed.to_string()))
        }
    }
}

impl std::fmt::Display for TemplateSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateSelection::Auto => write!(f, "auto"),
            TemplateSelection::Specific(id) => write!(f, "{id}"),
        }
    }
}

/// `Auto` offers the whole catalog; a specific id narrows it to that entry.
/// Unknown ids fall back to the whole catalog.
pub fn resolve_templates(catalog: &Templates, selection: &TemplateSelection) -> Templates {
    match selection {
        TemplateSelection::Auto => catalog.clone(),
        TemplateSelection::Specific(id) => match catalog.get(id) {
            Some(definition) => BTreeMap::from([(id.clone(), definition.clone())]),
            None => catalog.clone(),
        },
    }
}

fn libs(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn builtin_templates() -> Templates {
    let mut templates = Templates::new();
    templates.insert(
        "code-interpreter-v1".to_string(),
        TemplateDefinition {
            name: "Python data analyst".to_string(),
            lib: libs(&[
                "python",
                "jupyter",
                "numpy",
                "pandas",
                "matplotlib",
                "seaborn",
                "plotly",
            ]),
            file: "script.py".to_string(),
            instructions: "Runs code as a Jupyter notebook cell. Strong data analysis angle. Can use complex visualisation to explain results.".to_string(),
            port: None,
        },
    );
    templates.insert(
        "nextjs-developer".to_string(),
        TemplateDefinition {
            name: "Next.js developer".to_string(),
            lib: libs(&[
                "nextjs@14.2.5",
                "typescript",
                "@types/node",
                "@types/react",
                "@types/react-dom",
                "postcss",
                "tailwindcss",
                "shadcn",
            ]),
            file: "pages/index.tsx".to_string(),
            instructions: "A Next.js 13+ app that reloads automatically. Using the pages router."
                .to_string(),
            port: Some(3000),
        },
    );
    templates.insert(
        "vue-developer".to_string(),
        TemplateDefinition {
            name: "Vue.js developer".to_string(),
            lib: libs(&["vue@latest", "nuxt@3.13.0", "tailwindcss"]),
            file: "app.vue".to_string(),
            instructions: "A Vue.js 3+ app that reloads automatically. Only when asked specifically for a Vue app.".to_string(),
            port: Some(3000),
        },
    );
    templates.insert(
        "streamlit-developer".to_string(),
        TemplateDefinition {
            name: "Streamlit developer".to_string(),
            lib: libs(&[
                "streamlit",
                "pandas",
                "numpy",
                "matplotlib",
                "request",
                "seaborn",
                "plotly",
            ]),
            file: "app.py".to_string(),
            instructions: "A streamlit app that reloads automatically.".to_string(),
            port: Some(8501),
        },
    );
    templates.insert(
        "gradio-developer".to_string(),
        TemplateDefinition {
            name: "Gradio developer".to_string(),
            lib: libs(&[
                "gradio",
                "pandas",
                "numpy",
                "matplotlib",
                "request",
                "seaborn",
                "plotly",
            ]),
            file: "app.py".to_string(),
            instructions: "A gradio app. Gradio Blocks/Interface should be called demo."
                .to_string(),
            port: Some(7860),
        },
    );
    templates
}
