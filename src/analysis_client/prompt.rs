//! Analysis prompts
//!
//! One prompt per deployment. It is fixed when the client is built and
//! sent unchanged with every frame.

use std::path::Path;

const GENERAL_SURVEILLANCE: &str = "\
Analyze this surveillance image and identify any notable activities, people, or objects.
Look for:
1. Number of people present
2. What activities people are engaged in
3. Any unusual or suspicious behavior
4. Key objects in the scene
5. General description of the environment

Provide a detailed analysis of what you observe in this surveillance footage.";

const EXAM_HALL: &str = "\
Analyze this exam hall image and identify any suspicious behavior or disciplinary issues.
Look for:
1. Students looking at others' papers
2. Use of unauthorized materials
3. Communication between students
4. Use of mobile phones or other electronic devices
5. Any other suspicious or concerning behavior

Provide a detailed analysis of any suspicious activities found, or confirm if everything appears normal.";

/// Task-specific analysis prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPrompt {
    name: String,
    text: String,
}

impl AnalysisPrompt {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// General activity monitoring
    pub fn general_surveillance() -> Self {
        Self::new("general", GENERAL_SURVEILLANCE)
    }

    /// Exam misconduct monitoring
    pub fn exam_hall() -> Self {
        Self::new("exam", EXAM_HALL)
    }

    /// Prompt text read from a file
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom")
            .to_string();
        Ok(Self::new(name, text.trim().to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
