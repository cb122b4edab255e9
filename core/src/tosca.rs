//! Tosca-style test script parser.
//!
//! Exported scripts come in two shapes: documents in the Tosca 2.0
//! namespace, and bare documents whose container and field names are not
//! consistently cased. The shape is picked once from the root element and
//! both paths fill the same [`TestScript`].

use crate::error::{read_source, ParseError};
use crate::script::{ActionType, Annotation, Assertion, Step, TestDataRow, TestScript, UiElement};
use crate::xml::{parse_document, XmlNode};
use std::path::Path;

pub const TOSCA_NS: &str = "http://www.tricentis.com/tosca/2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Namespaced,
    Bare,
}

impl Schema {
    pub fn detect(root: &XmlNode) -> Self {
        if root.namespace.is_some() {
            Schema::Namespaced
        } else {
            Schema::Bare
        }
    }
}

pub fn parse(path: impl AsRef<Path>) -> Result<TestScript, ParseError> {
    let path = path.as_ref();
    let source = read_source(path)?;
    let script = parse_str(&source)?;
    tracing::debug!(
        path = %path.display(),
        steps = script.steps.len(),
        annotations = script.annotations.len(),
        "parsed Tosca script"
    );
    Ok(script)
}

pub fn parse_str(source: &str) -> Result<TestScript, ParseError> {
    let root = parse_document(source)?;
    let script = match Schema::detect(&root) {
        Schema::Namespaced => parse_namespaced(&root),
        Schema::Bare => parse_bare(&root),
    };
    Ok(script)
}

const NS: Option<&str> = Some(TOSCA_NS);

fn parse_namespaced(root: &XmlNode) -> TestScript {
    let metadata = root.child(NS, "Metadata");
    let env = root.child(NS, "TestEnvironment");
    let text = |node: Option<&XmlNode>, tag: &str| text_of(node, NS, tag);

    TestScript {
        script_id: text(metadata, "TestScriptId"),
        name: text(metadata, "Name"),
        description: text(metadata, "Description"),
        version: text(metadata, "Version"),
        process: text(metadata, "Process"),
        transaction: text(metadata, "Transaction"),
        execution_status: text(metadata, "ExecutionStatus"),
        execution_count: parse_count(&text(metadata, "ExecutionCount"), "ExecutionCount"),
        last_executed: text(metadata, "LastExecutedDate"),
        site_code: text(env, "SiteCode"),
        site_name: text(env, "SiteName"),
        system_name: text(env, "SystemName"),
        // Annotations carry their own <Step> reference element.
        steps: root
            .descendants_outside(NS, "Step", "Annotation")
            .into_iter()
            .map(|node| parse_step(node, NS))
            .collect(),
        annotations: root
            .descendants(NS, "Annotation")
            .into_iter()
            .map(|node| parse_annotation(node, NS))
            .collect(),
        test_data: root
            .descendants(NS, "DataRow")
            .into_iter()
            .map(|node| parse_data_row(node, NS))
            .collect(),
    }
}

fn parse_bare(root: &XmlNode) -> TestScript {
    let metadata = root
        .child(None, "Metadata")
        .or_else(|| root.child(None, "metadata"));
    let env = root
        .child(None, "TestEnvironment")
        .or_else(|| root.child(None, "testEnvironment"));
    let text = |node: Option<&XmlNode>, tags: &[&str]| {
        tags.iter()
            .map(|tag| text_of(node, None, tag))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    };

    let steps = root
        .find(None, "TestSteps")
        .or_else(|| root.find(None, "steps"))
        .map(|container| {
            let upper: Vec<&XmlNode> = container.children(None, "Step").collect();
            let nodes = if upper.is_empty() {
                container.children(None, "step").collect()
            } else {
                upper
            };
            nodes.into_iter().map(|node| parse_step(node, None)).collect()
        })
        .unwrap_or_default();

    let annotations = root
        .find(None, "Annotations")
        .map(|container| {
            container
                .children(None, "Annotation")
                .map(|node| parse_annotation(node, None))
                .collect()
        })
        .unwrap_or_default();

    TestScript {
        script_id: text(metadata, &["TestScriptId"]),
        name: text(metadata, &["Name", "name"]),
        description: text(metadata, &["Description", "description"]),
        version: text(metadata, &["Version", "version"]),
        process: text(metadata, &["Process", "process"]),
        transaction: text(metadata, &["Transaction", "transaction"]),
        execution_status: text(metadata, &["ExecutionStatus", "status"]),
        execution_count: parse_count(&text(metadata, &["ExecutionCount"]), "ExecutionCount"),
        last_executed: text(metadata, &["LastExecutedDate", "last_executed"]),
        site_code: text(env, &["SiteCode"]),
        site_name: text(env, &["SiteName"]),
        system_name: text(env, &["SystemName"]),
        steps,
        annotations,
        test_data: root
            .descendants(None, "DataRow")
            .into_iter()
            .map(|node| parse_data_row(node, None))
            .collect(),
    }
}

fn parse_step(node: &XmlNode, ns: Option<&str>) -> Step {
    let action = node.child(ns, "Action");
    let element = action
        .and_then(|action| action.child(ns, "Element"))
        .map(|element| UiElement {
            identifier: element.child_text(ns, "Identifier"),
            description: element.child_text(ns, "Description"),
        });

    Step {
        step_id: node.child_text(ns, "StepId"),
        step_number: parse_count(&node.child_text(ns, "StepNumber"), "StepNumber"),
        description: node.child_text(ns, "Description"),
        action_type: ActionType::from(text_of(action, ns, "Type")),
        element,
        value: text_of(action, ns, "Value"),
        target_url: text_of(action, ns, "TargetURL"),
        expected_result: node.child_text(ns, "ExpectedResult"),
        screenshot: node.child_text(ns, "ScreenshotReference"),
        assertions: node
            .children(ns, "Assertion")
            .map(|assertion| Assertion {
                kind: assertion.child_text(ns, "Type"),
                field_reference: assertion.child_text(ns, "FieldReference"),
                expected_value: assertion.child_text(ns, "ExpectedValue"),
                allowed_values: assertion.child_text(ns, "AllowedValues"),
                validation_type: assertion.child_text(ns, "ValidationType"),
                reason: assertion.child_text(ns, "Reason"),
            })
            .collect(),
    }
}

fn parse_annotation(node: &XmlNode, ns: Option<&str>) -> Annotation {
    Annotation {
        kind: node.child_text(ns, "Type"),
        step_id: node.child_text(ns, "Step"),
        description: node.child_text(ns, "Description"),
    }
}

fn parse_data_row(node: &XmlNode, ns: Option<&str>) -> TestDataRow {
    TestDataRow {
        field_name: node.child_text(ns, "FieldName"),
        field_value: node.child_text(ns, "FieldValue"),
        field_description: node.child_text(ns, "FieldDescription"),
    }
}

fn text_of(node: Option<&XmlNode>, ns: Option<&str>, tag: &str) -> String {
    node.map(|node| node.child_text(ns, tag)).unwrap_or_default()
}

/// Empty means zero; anything else unparsable is logged and treated as zero.
fn parse_count(raw: &str, field: &'static str) -> i64 {
    if raw.is_empty() {
        return 0;
    }
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(field, value = raw, "non-numeric value, using 0");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NAMESPACED: &str = include_str!("../fixtures/goods_receipt.tosca.xml");
    const BARE: &str = include_str!("../fixtures/goods_receipt_bare.xml");

    #[test]
    fn detects_schema_from_root_namespace() {
        let namespaced = parse_document(NAMESPACED).expect("namespaced parses");
        let bare = parse_document(BARE).expect("bare parses");
        assert_eq!(Schema::detect(&namespaced), Schema::Namespaced);
        assert_eq!(Schema::detect(&bare), Schema::Bare);
    }

    #[test]
    fn parses_namespaced_metadata_and_steps() {
        let script = parse_str(NAMESPACED).expect("failed to parse script");

        assert_eq!(script.script_id, "TS-MIGO-001");
        assert_eq!(script.name, "Goods Receipt for PO");
        assert_eq!(script.version, "1.2");
        assert_eq!(script.transaction, "MIGO");
        assert_eq!(script.execution_status, "PASSED");
        assert_eq!(script.execution_count, 14);
        assert_eq!(script.site_code, "ANN");
        assert_eq!(script.site_name, "Anniston");
        assert_eq!(script.system_name, "S4P");

        let numbers: Vec<i64> = script.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, [1, 2, 3]);

        let input = &script.steps[1];
        assert_eq!(input.action_type, ActionType::Input);
        assert_eq!(input.value, "4500001234");
        let element = input.element.as_ref().expect("ui element");
        assert_eq!(element.identifier, "txtPurchaseOrder");
        assert_eq!(element.description, "Purchase order number");

        assert_eq!(script.steps[0].target_url, "/sap/bc/gui/migo");
        assert!(script.steps[0].element.is_none());

        assert_eq!(script.steps[2].assertions.len(), 1);
        assert_eq!(script.steps[2].assertions[0].allowed_values, "0001,0002");

        assert_eq!(script.test_data.len(), 2);
        assert_eq!(script.test_data[0].field_name, "PurchaseOrder");
    }

    #[test]
    fn annotation_step_references_are_not_steps() {
        let script = parse_str(NAMESPACED).expect("failed to parse script");
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.annotations.len(), 1);
        assert_eq!(script.annotations[0].step_id, "S2");
    }

    #[test]
    fn three_step_site_annotation_scenario() {
        let script = parse_str(NAMESPACED).expect("failed to parse script");

        let user_steps = script.user_action_steps();
        assert_eq!(user_steps.len(), 2);
        assert!(user_steps.iter().all(|s| s.action_type != ActionType::Verify));

        let site_ids: Vec<&str> = script
            .site_specific_steps()
            .iter()
            .map(|s| s.step_id.as_str())
            .collect();
        assert!(site_ids.contains(&"S2"));
    }

    #[test]
    fn bare_schema_tolerates_casing_variants() {
        let script = parse_str(BARE).expect("failed to parse script");

        assert_eq!(script.name, "Goods Receipt (bare)");
        assert_eq!(script.description, "Lower-case metadata");
        assert_eq!(script.execution_status, "FAILED");
        assert_eq!(script.last_executed, "2024-03-01");
        assert_eq!(script.execution_count, 0);
        assert_eq!(script.site_name, "Anniston");

        let ids: Vec<&str> = script.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, ["B1", "B2"]);
        assert_eq!(script.steps[1].action_type, ActionType::Verify);
        assert_eq!(script.steps[1].assertions[0].reason, "Anniston recall traceability");

        assert_eq!(script.annotations.len(), 1);
        assert_eq!(script.test_data.len(), 1);

        let site_ids: Vec<&str> = script
            .site_specific_steps()
            .iter()
            .map(|s| s.step_id.as_str())
            .collect();
        assert_eq!(site_ids, ["B1", "B2"]);
    }

    #[test]
    fn missing_optional_sections_default_to_empty() {
        let script = parse_str(&format!(r#"<TestScript xmlns="{TOSCA_NS}"/>"#))
            .expect("empty namespaced script");
        assert!(script.name.is_empty());
        assert_eq!(script.execution_count, 0);
        assert!(script.steps.is_empty());

        let script = parse_str("<TestScript><Metadata><ExecutionCount>many</ExecutionCount></Metadata></TestScript>")
            .expect("bare script with junk count");
        assert_eq!(script.execution_count, 0);
        assert!(script.annotations.is_empty());
    }

    #[test]
    fn steps_keep_source_order() {
        let source = r#"<TestScript><TestSteps>
  <Step><StepId>b</StepId><StepNumber>2</StepNumber></Step>
  <Step><StepId>a</StepId><StepNumber>1</StepNumber></Step>
  <Step><StepId>z</StepId><StepNumber>-1</StepNumber></Step>
</TestSteps></TestScript>"#;
        let script = parse_str(source).expect("failed to parse script");
        let ids: Vec<&str> = script.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "z"]);
        let numbers: Vec<i64> = script.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, [2, 1, -1]);
    }

    #[test]
    fn malformed_xml_surfaces_syntax_error() {
        let err = parse_str("<TestScript><Metadata></TestScript>").expect_err("bad xml");
        assert!(matches!(err, ParseError::Xml(_)));
    }

    #[test]
    fn parses_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(BARE.as_bytes()).expect("write fixture");
        let script = parse(file.path()).expect("failed to parse file");
        assert_eq!(script.steps.len(), 2);
    }
}
