//! YAML batch file for `vloop batch`.
//!
//! ```yaml
//! - label: rust-summary
//!   template: "Summarize {{topic}} as a JSON object"
//!   validator: json_object
//!   input:
//!     topic: rust
//! - template_file: prompts/report.hbs
//!   validator: report
//!   max_retries: 5
//! ```

use eyre::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use vloop::runner::ExecutionRequest;
use vloop::validation::ValidatorRegistry;

/// One entry of a batch file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEntry {
    pub label: Option<String>,
    pub template: Option<String>,
    /// Resolved relative to the batch file
    pub template_file: Option<PathBuf>,
    #[serde(default = "default_validator")]
    pub validator: String,
    #[serde(default)]
    pub input: BTreeMap<String, Value>,
    #[serde(default)]
    pub context: Option<BTreeMap<String, Value>>,
    pub max_retries: Option<u32>,
}

fn default_validator() -> String {
    "json".to_string()
}

/// Read a batch file
pub fn load_batch_file(path: &Path) -> Result<Vec<BatchEntry>> {
    let content = fs::read_to_string(path).context(format!("Failed to read batch file {}", path.display()))?;
    let entries: Vec<BatchEntry> =
        serde_yaml::from_str(&content).context(format!("Failed to parse batch file {}", path.display()))?;
    Ok(entries)
}

impl BatchEntry {
    /// Build the execution request, loading the template file when needed
    pub fn into_request(self, index: usize, base_dir: &Path, registry: &ValidatorRegistry) -> Result<ExecutionRequest> {
        let template = match (self.template, &self.template_file) {
            (Some(inline), None) => inline,
            (None, Some(file)) => {
                let path = base_dir.join(file);
                fs::read_to_string(&path).context(format!("Failed to read template {}", path.display()))?
            }
            (Some(_), Some(_)) => bail!("entry {}: set either template or template_file, not both", index),
            (None, None) => bail!("entry {}: missing template or template_file", index),
        };
        let validator = registry.get(&self.validator)?;

        let mut request = ExecutionRequest::new(template, validator)
            .with_input(self.input)
            .with_label(self.label.unwrap_or_else(|| format!("request-{}", index)));
        if let Some(context) = self.context {
            request = request.with_context(context);
        }
        if let Some(max_retries) = self.max_retries {
            request = request.with_max_retries(max_retries);
        }
        Ok(request)
    }
}
