//! Opal site overlays.
//!
//! An overlay document lists, per transaction code, the ways a site deviates
//! from the enterprise default. The assembler concatenates the rules of every
//! loaded document and projects them into the shape the generation layer
//! consumes. It never modifies the parsed scripts or processes; consumers
//! join on the transaction code themselves.

use crate::error::{read_source, ParseError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub system: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub company: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Plant and company codes are often written unquoted, so numbers and
/// booleans are accepted and kept as their textual form.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn empty_value() -> Value {
    Value::String(String::new())
}

/// Keeps a key that is present with a null value (`field:`), so that it
/// stays distinguishable from a key that was never written.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One site deviation as written in the overlay document.
///
/// Optional dimensions are `None` only when the key is absent; a key written
/// without a value is `Some(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "empty_value")]
    pub enterprise_default: Value,
    #[serde(default = "empty_value")]
    pub site_override: Value,
    #[serde(default)]
    pub reason: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub field: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub field_technical: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub step: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub tiers: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub actions: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature_ranges: Option<Value>,
    /// Keys this crate does not interpret. Dropped by `resolve`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayRule {
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlayDocument {
    #[serde(default)]
    site: Option<SiteInfo>,
    #[serde(default)]
    overlays: Option<Vec<OverlayRule>>,
}

/// Blank and `null` documents contribute nothing.
fn parse_overlay(source: &str) -> Result<Option<OverlayDocument>, ParseError> {
    if source.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_yaml::from_str::<Option<OverlayDocument>>(source)?)
}

/// A variation projected for the generation layer. Optional dimensions are
/// present only when the source variation declared them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVariation {
    #[serde(rename = "type")]
    pub kind: String,
    pub enterprise_default: Value,
    pub site_override: Value,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_technical: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_ranges: Option<Value>,
}

impl From<&Variation> for ResolvedVariation {
    fn from(variation: &Variation) -> Self {
        // field_technical travels with field, defaulting to empty.
        let field_technical = variation.field.as_ref().map(|_| {
            variation
                .field_technical
                .clone()
                .unwrap_or_else(empty_value)
        });
        ResolvedVariation {
            kind: variation.kind.clone(),
            enterprise_default: variation.enterprise_default.clone(),
            site_override: variation.site_override.clone(),
            reason: variation.reason.clone(),
            field: variation.field.clone(),
            field_technical,
            step: variation.step.clone(),
            tiers: variation.tiers.clone(),
            condition: variation.condition.clone(),
            actions: variation.actions.clone(),
            temperature_ranges: variation.temperature_ranges.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOverlay {
    pub process: String,
    pub transaction: String,
    pub variations: Vec<ResolvedVariation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedOverlays {
    pub site: SiteInfo,
    pub overlays: Vec<ResolvedOverlay>,
}

impl ResolvedOverlays {
    pub fn for_transaction<'a>(
        &'a self,
        transaction_code: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedVariation> + 'a {
        self.overlays
            .iter()
            .filter(move |overlay| overlay.transaction == transaction_code)
            .flat_map(|overlay| overlay.variations.iter())
    }
}

/// Loads overlay documents once, then answers read-only queries.
#[derive(Debug, Default)]
pub struct OverlayAssembler {
    site: SiteInfo,
    raw_overlays: Vec<OverlayRule>,
}

impl OverlayAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads each document in order. Missing files are skipped with a
    /// warning; the last document that declares `site` wins, and rules are
    /// appended without deduplication. Returns the number of files loaded.
    ///
    /// Every file is parsed before any is merged, so a failure leaves the
    /// assembler unchanged.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, ParseError> {
        let mut documents = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                tracing::warn!(path = %path.display(), "overlay file not found, skipping");
                continue;
            }
            let source = read_source(path)?;
            documents.push((path, parse_overlay(&source)?));
        }

        let loaded = documents.len();
        for (path, document) in documents {
            let rules = document.map(|document| self.merge(document)).unwrap_or(0);
            tracing::info!(path = %path.display(), rules, "loaded overlay");
        }
        Ok(loaded)
    }

    /// Merges one overlay document and returns how many rules it added.
    pub fn load_str(&mut self, source: &str) -> Result<usize, ParseError> {
        Ok(parse_overlay(source)?
            .map(|document| self.merge(document))
            .unwrap_or(0))
    }

    fn merge(&mut self, document: OverlayDocument) -> usize {
        if let Some(site) = document.site {
            self.site = site;
        }
        let rules = document.overlays.unwrap_or_default();
        let added = rules.len();
        self.raw_overlays.extend(rules);
        added
    }

    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    pub fn rules(&self) -> &[OverlayRule] {
        &self.raw_overlays
    }

    /// Projects every loaded rule into the generation-layer shape.
    ///
    /// `role` is accepted for per-role filtering but is not applied yet:
    /// every role sees every rule.
    pub fn resolve(&self, role: &str) -> ResolvedOverlays {
        let _ = role;
        ResolvedOverlays {
            site: self.site.clone(),
            overlays: self
                .raw_overlays
                .iter()
                .map(|rule| ResolvedOverlay {
                    process: rule.process.clone(),
                    transaction: rule.transaction.clone(),
                    variations: rule.variations.iter().map(ResolvedVariation::from).collect(),
                })
                .collect(),
        }
    }

    /// Variations of every rule whose transaction matches exactly
    /// (case-sensitive).
    pub fn get_overlays_for_transaction(&self, transaction_code: &str) -> Vec<&Variation> {
        self.raw_overlays
            .iter()
            .filter(|rule| rule.transaction == transaction_code)
            .flat_map(|rule| rule.variations.iter())
            .collect()
    }

    pub fn get_field_constraints(&self, transaction_code: &str) -> Vec<&Variation> {
        self.get_overlays_for_transaction(transaction_code)
            .into_iter()
            .filter(|variation| variation.field.is_some())
            .collect()
    }

    pub fn get_process_gates(&self, transaction_code: &str) -> Vec<&Variation> {
        self.variations_of_kind(transaction_code, "process_gate")
    }

    pub fn get_approval_rules(&self, transaction_code: &str) -> Vec<&Variation> {
        self.variations_of_kind(transaction_code, "approval_rule")
    }

    fn variations_of_kind(&self, transaction_code: &str, kind: &str) -> Vec<&Variation> {
        self.get_overlays_for_transaction(transaction_code)
            .into_iter()
            .filter(|variation| variation.kind == kind)
            .collect()
    }

    pub fn summary(&self) -> OverlaySummary<'_> {
        OverlaySummary { assembler: self }
    }
}

pub struct OverlaySummary<'a> {
    assembler: &'a OverlayAssembler,
}

impl fmt::Display for OverlaySummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let site = &self.assembler.site;
        let rules = &self.assembler.raw_overlays;
        let total: usize = rules.iter().map(|rule| rule.variations.len()).sum();

        writeln!(
            f,
            "Site: {} ({})",
            site.name.as_deref().unwrap_or("Unknown"),
            site.code.as_deref().unwrap_or_default()
        )?;
        writeln!(f, "System: {}", site.system.as_deref().unwrap_or_default())?;
        writeln!(f, "Total overlay rules: {total}")?;

        if !rules.is_empty() {
            writeln!(f)?;
        }
        for rule in rules {
            writeln!(
                f,
                "  {} ({}): {} variations",
                rule.process,
                rule.transaction,
                rule.variations.len()
            )?;
            for variation in &rule.variations {
                let label = match variation.field.as_ref().or(variation.step.as_ref()) {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                writeln!(f, "    - {} [{}]", label, variation.kind)?;
            }
        }
        Ok(())
    }
}
