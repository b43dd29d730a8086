//! Versioned prompt templates.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Braces that do not
//! name a supplied variable are left as-is, so templates may contain literal
//! JSON examples.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Result, ServiceError};

const CLASSIFY: &str = r#"You are the planner of a multi-handler assistant. Decide which handler should answer the user's query.

Handlers:
- web_search or rag: facts, lists, explanations; a text answer is enough.
- coding: numbers, totals, averages, statistics, calculations, or answers that require reading the data files and counting, ranking or filtering them (best selling, least, first, how many). Always choose coding for these; the answer needs a script that reads the files.
- general: small talk or anything unclear.

Reply with ONLY the following JSON object and no other text:
{"task_type": "web_search"|"rag"|"coding"|"general", "reason": "short justification", "plan": ["step 1", "step 2"]}

User query: {query}"#;

const GENERATE_SCRIPT: &str = r#"You are an expert Python programmer. Write ONLY Python code that answers the question below.
- The working directory is the data root ({data_root}); open data files with relative paths.
- These names are already imported and available: {capabilities}.
- Print the final answer with print(). A script that prints nothing is a failure.
- Put the code in a single ```python fenced block and add no explanation.

Data files:
{data_schema}

Question: {query}"#;

const CORRECT_SCRIPT: &str = r#"The Python script below was written to answer a question but it failed.
Fix it and return ONLY the corrected script in a single ```python fenced block.
- The working directory is the data root ({data_root}); open data files with relative paths.
- These names are already imported and available: {capabilities}.
- Print the final answer with print().

Data files:
{data_schema}

Question: {query}

Failing script:
```python
{script}
```

Failure:
{failure}"#;

const SUMMARIZE_SUCCESS: &str = r#"User question: {query}
Output of the script that answered it:
{output}

Explain this result to the user in a short answer. Use only the numbers that appear in the output above; do not invent or estimate any other number."#;

const SUMMARIZE_FAILURE: &str = r#"User question: {query}
A script was run to answer this question but it failed, even after one correction:
{failure}

In one or two plain sentences, tell the user the answer could not be computed and why. Do not give any numeric result and do not guess one."#;

const RESEARCH: &str = r#"Below is information gathered about a topic. Use it to give the user a complete and accurate answer.
If the information is insufficient or says "{no_results}", give the best general answer you can.

User question: {query}

Gathered information:
{context}

Keep the answer professional and informative."#;

const DATA_SCHEMA: &str = "No schema has been configured. Inspect the files under the data root before relying on field names.";

/// A complete, versioned set of prompt templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    pub version: String,
    pub classify: String,
    pub generate_script: String,
    pub correct_script: String,
    pub summarize_success: String,
    pub summarize_failure: String,
    pub research: String,
    /// Free-text description of the data files scripts may read.
    #[serde(default = "default_data_schema")]
    pub data_schema: String,
}

fn default_data_schema() -> String {
    DATA_SCHEMA.to_string()
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptSet {
    /// The templates compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            version: "builtin-1".to_string(),
            classify: CLASSIFY.to_string(),
            generate_script: GENERATE_SCRIPT.to_string(),
            correct_script: CORRECT_SCRIPT.to_string(),
            summarize_success: SUMMARIZE_SUCCESS.to_string(),
            summarize_failure: SUMMARIZE_FAILURE.to_string(),
            research: RESEARCH.to_string(),
            data_schema: DATA_SCHEMA.to_string(),
        }
    }

    /// Load and validate a prompt set from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Prompts(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let set: PromptSet = toml::from_str(raw)?;
        set.validate()?;
        Ok(set)
    }

    /// Every template must reference the placeholders its caller fills.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ServiceError::Prompts("version cannot be empty".into()));
        }
        let required: [(&str, &str, &[&str]); 6] = [
            ("classify", self.classify.as_str(), &["query"]),
            ("generate_script", self.generate_script.as_str(), &["query"]),
            (
                "correct_script",
                self.correct_script.as_str(),
                &["query", "script", "failure"],
            ),
            (
                "summarize_success",
                self.summarize_success.as_str(),
                &["query", "output"],
            ),
            (
                "summarize_failure",
                self.summarize_failure.as_str(),
                &["query", "failure"],
            ),
            ("research", self.research.as_str(), &["query", "context"]),
        ];
        for (name, template, placeholders) in required {
            for placeholder in placeholders {
                if !template.contains(&format!("{{{placeholder}}}")) {
                    return Err(ServiceError::Prompts(format!(
                        "template '{name}' is missing placeholder {{{placeholder}}}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// SHA256 hex over the serialized set.
    pub fn digest(&self) -> String {
        // struct field order is fixed, so the JSON encoding is stable
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned, and unknown or malformed
/// placeholders are copied through unchanged.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}');
        let value = close.and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
