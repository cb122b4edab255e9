//! Test script model produced by the Tosca parser.

use comfy_table::{presets::ASCII_FULL, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Navigate,
    Click,
    Input,
    Select,
    Verify,
    Calculate,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Navigate => "NAVIGATE",
            ActionType::Click => "CLICK",
            ActionType::Input => "INPUT",
            ActionType::Select => "SELECT",
            ActionType::Verify => "VERIFY",
            ActionType::Calculate => "CALCULATE",
            ActionType::Other(raw) => raw,
        }
    }
}

impl From<&str> for ActionType {
    fn from(raw: &str) -> Self {
        match raw {
            "NAVIGATE" => ActionType::Navigate,
            "CLICK" => ActionType::Click,
            "INPUT" => ActionType::Input,
            "SELECT" => ActionType::Select,
            "VERIFY" => ActionType::Verify,
            "CALCULATE" => ActionType::Calculate,
            other => ActionType::Other(other.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(raw: String) -> Self {
        ActionType::from(raw.as_str())
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiElement {
    pub identifier: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub field_reference: String,
    #[serde(default)]
    pub expected_value: String,
    #[serde(default)]
    pub allowed_values: String,
    #[serde(default)]
    pub validation_type: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub step_number: i64,
    #[serde(default)]
    pub description: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub element: Option<UiElement>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub expected_result: String,
    #[serde(default)]
    pub screenshot: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl Step {
    pub fn is_user_action(&self) -> bool {
        matches!(
            self.action_type,
            ActionType::Navigate | ActionType::Click | ActionType::Input | ActionType::Select
        )
    }

    pub fn is_verification(&self) -> bool {
        matches!(
            self.action_type,
            ActionType::Verify | ActionType::Calculate
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub step_id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDataRow {
    pub field_name: String,
    pub field_value: String,
    #[serde(default)]
    pub field_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestScript {
    pub script_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub site_code: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub execution_status: String,
    #[serde(default)]
    pub execution_count: i64,
    #[serde(default)]
    pub last_executed: String,
    /// Source order; never re-sorted.
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub test_data: Vec<TestDataRow>,
}

/// Annotation types containing "SPECIFIC" (any case) mark site deviations.
pub fn is_site_specific_annotation(kind: &str) -> bool {
    kind.to_uppercase().contains("SPECIFIC")
}

/// Loose text match on an assertion reason: mentions "site" or the site name.
///
/// This is a heuristic. Steps that are site-specific only by convention
/// will not be caught, and any reason containing "site" (e.g. "website")
/// will be.
pub fn reason_mentions_site(reason: &str, site_name: &str) -> bool {
    let reason = reason.to_lowercase();
    if reason.contains("site") {
        return true;
    }
    let site_name = site_name.trim().to_lowercase();
    !site_name.is_empty() && reason.contains(&site_name)
}

impl TestScript {
    pub fn user_action_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|step| step.is_user_action()).collect()
    }

    pub fn verification_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|step| step.is_verification())
            .collect()
    }

    pub fn site_specific_annotations(&self) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|annotation| is_site_specific_annotation(&annotation.kind))
            .collect()
    }

    /// Steps referenced by a site-specific annotation, plus steps with an
    /// assertion whose reason mentions the site. Source order is kept.
    pub fn site_specific_steps(&self) -> Vec<&Step> {
        let annotated: HashSet<&str> = self
            .site_specific_annotations()
            .into_iter()
            .map(|annotation| annotation.step_id.as_str())
            .collect();

        self.steps
            .iter()
            .filter(|step| {
                annotated.contains(step.step_id.as_str())
                    || step
                        .assertions
                        .iter()
                        .any(|assertion| reason_mentions_site(&assertion.reason, &self.site_name))
            })
            .collect()
    }

    pub fn step_by_id(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    pub fn summary(&self) -> ScriptSummary<'_> {
        ScriptSummary { script: self }
    }
}

pub struct ScriptSummary<'a> {
    script: &'a TestScript,
}

impl fmt::Display for ScriptSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = self.script;
        let site_specific = script.site_specific_steps();

        writeln!(f, "Test Script: {}", script.name)?;
        writeln!(f, "  ID: {}", script.script_id)?;
        writeln!(f, "  Site: {} ({})", script.site_name, script.site_code)?;
        writeln!(f, "  System: {}", script.system_name)?;
        writeln!(
            f,
            "  Status: {} ({} runs)",
            script.execution_status, script.execution_count
        )?;
        writeln!(f, "  Last Run: {}", script.last_executed)?;
        writeln!(f, "  Total Steps: {}", script.steps.len())?;
        writeln!(f, "  User Action Steps: {}", script.user_action_steps().len())?;
        writeln!(f, "  Site-Specific Steps: {}", site_specific.len())?;

        if !script.steps.is_empty() {
            let mut table = Table::new();
            table.load_preset(ASCII_FULL);
            table.set_header(vec!["#", "Action", "Description", "Detail", "Site"]);
            for step in &script.steps {
                let detail = if !step.value.is_empty() {
                    step.value.as_str()
                } else {
                    step.target_url.as_str()
                };
                let marker = if site_specific
                    .iter()
                    .any(|candidate| std::ptr::eq(*candidate, step))
                {
                    "SITE-SPECIFIC"
                } else {
                    ""
                };
                table.add_row(vec![
                    step.step_number.to_string(),
                    step.action_type.to_string(),
                    step.description.clone(),
                    detail.to_string(),
                    marker.to_string(),
                ]);
            }
            writeln!(f, "\nSteps:\n{table}")?;
        }

        if !script.annotations.is_empty() {
            writeln!(f, "\nAnnotations:")?;
            for annotation in &script.annotations {
                let preview: String = annotation.description.chars().take(100).collect();
                writeln!(f, "  [{}] {}...", annotation.kind, preview)?;
            }
        }

        Ok(())
    }
}
