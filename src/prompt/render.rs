//! Prompt Renderer - Render templates with input data using Handlebars
//!
//! Templates use `{{name}}` placeholders. Rendering runs in strict mode: a
//! placeholder with no matching input is an error, never an empty string.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, VloopError};

/// Named values substituted into a prompt template
pub type InputData = BTreeMap<String, Value>;

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    /// Create a new PromptRenderer in strict mode
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Prompts are plain text, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render a template string with the given input data
    pub fn render(&self, template: &str, data: &InputData) -> Result<String> {
        self.render_with(template, data)
    }

    /// Render a template string with any serializable context
    pub fn render_with<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| VloopError::TemplateRender(e.to_string()))
    }

    /// Register a named template for later use
    pub fn register_template(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| VloopError::TemplateRender(format!("failed to register template '{}': {}", name, e)))
    }

    /// Render a previously registered template
    pub fn render_named(&self, name: &str, data: &InputData) -> Result<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| VloopError::TemplateRender(e.to_string()))
    }

    /// Check if a named template is registered
    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.get_template(name).is_some()
    }
}

/// Build the system context given to the model for a whole execution
pub fn build_system_prompt(validator_instructions: &str) -> String {
    let mut prompt = String::from(
        "You are an expert assistant that provides precise, well-formatted responses according to the given instructions.\n",
    );
    if !validator_instructions.trim().is_empty() {
        prompt.push_str(validator_instructions.trim());
        prompt.push('\n');
    }
    prompt.push_str(
        "IMPORTANT: Your responses will be automatically validated. Please ensure they exactly match the required format.\n\
         When I ask you to correct previous errors, please analyze the feedback carefully and provide an improved response \
         that addresses all the validation issues.",
    );
    prompt
}

/// Build the user message asking for a corrected response
pub fn build_retry_prompt(feedback: &str) -> String {
    if feedback.trim().is_empty() {
        return "Please provide a corrected response.".to_string();
    }
    format!(
        "Your previous response had validation errors:\n{}\nPlease provide a corrected response that addresses these issues.",
        feedback
    )
}

/// Turn `key=value` pairs into input data; values that parse as JSON keep their type
pub fn parse_input_pairs<I, S>(pairs: I) -> Result<InputData>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut data = InputData::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| VloopError::InvalidConfig(format!("expected key=value, got '{}'", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(VloopError::InvalidConfig(format!("empty key in '{}'", pair)));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        data.insert(key.to_string(), value);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> InputData {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_render_simple() {
        let renderer = PromptRenderer::new();
        let result = renderer
            .render("Hello, {{name}}!", &data(&[("name", json!("World"))]))
            .unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_render_non_string_values() {
        let renderer = PromptRenderer::new();
        let result = renderer
            .render("{{count}} items, done={{done}}", &data(&[("count", json!(5)), ("done", json!(false))]))
            .unwrap();
        assert_eq!(result, "5 items, done=false");
    }

    #[test]
    fn test_render_missing_variable_is_error() {
        let renderer = PromptRenderer::new();
        let err = renderer.render("Hello, {{name}}!", &InputData::new()).unwrap_err();
        assert!(matches!(err, VloopError::TemplateRender(_)));
    }

    #[test]
    fn test_render_no_escape_html() {
        let renderer = PromptRenderer::new();
        let result = renderer
            .render("Code: {{code}}", &data(&[("code", json!("<b>\"x\" & y</b>"))]))
            .unwrap();
        assert_eq!(result, "Code: <b>\"x\" & y</b>");
    }

    #[test]
    fn test_render_with_serializable() {
        #[derive(Serialize)]
        struct Context {
            name: String,
            count: i32,
        }

        let renderer = PromptRenderer::new();
        let context = Context {
            name: "Bob".to_string(),
            count: 5,
        };
        assert_eq!(
            renderer.render_with("{{name}} has {{count}} items", &context).unwrap(),
            "Bob has 5 items"
        );
    }

    #[test]
    fn test_render_preserves_whitespace() {
        let renderer = PromptRenderer::new();
        let template = "Line 1\n\nLine 3\n\n\nLine 6";
        assert_eq!(renderer.render(template, &InputData::new()).unwrap(), template);
    }

    #[test]
    fn test_register_and_render_named() {
        let mut renderer = PromptRenderer::new();
        assert!(!renderer.has_template("greeting"));
        renderer.register_template("greeting", "Hello, {{name}}!").unwrap();
        assert!(renderer.has_template("greeting"));

        let result = renderer
            .render_named("greeting", &data(&[("name", json!("World"))]))
            .unwrap();
        assert_eq!(result, "Hello, World!");
        assert!(renderer.render_named("nonexistent", &InputData::new()).is_err());
    }

    #[test]
    fn test_register_invalid_template() {
        let mut renderer = PromptRenderer::new();
        assert!(renderer.register_template("broken", "{{#if}}").is_err());
    }

    #[test]
    fn test_build_system_prompt_includes_instructions() {
        let prompt = build_system_prompt("Respond with a JSON object.");
        assert!(prompt.contains("Respond with a JSON object."));
        assert!(prompt.contains("automatically validated"));
    }

    #[test]
    fn test_build_retry_prompt() {
        let prompt = build_retry_prompt("- ERROR: must be JSON");
        assert!(prompt.starts_with("Your previous response had validation errors:"));
        assert!(prompt.contains("- ERROR: must be JSON"));
        assert!(prompt.ends_with("addresses these issues."));

        assert_eq!(build_retry_prompt(""), "Please provide a corrected response.");
    }

    #[test]
    fn test_parse_input_pairs() {
        let data = parse_input_pairs(["topic=rust", "count=3", "tags=[\"a\",\"b\"]"]).unwrap();
        assert_eq!(data["topic"], json!("rust"));
        assert_eq!(data["count"], json!(3));
        assert_eq!(data["tags"], json!(["a", "b"]));

        assert!(parse_input_pairs(["novalue"]).is_err());
        assert!(parse_input_pairs(["=x"]).is_err());
    }
}
