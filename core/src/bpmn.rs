//! BPMN 2.0 process diagram parser.

use crate::error::{read_source, ParseError};
use crate::process::{
    DataObject, Event, EventType, Gateway, GatewayType, MessageFlow, Participant, Process,
    SequenceFlow, Task,
};
use crate::xml::{parse_document, XmlNode};
use std::path::Path;

pub const BPMN_NS: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";

const NS: Option<&str> = Some(BPMN_NS);

const TASK_TAGS: [&str; 5] = ["task", "userTask", "serviceTask", "sendTask", "receiveTask"];

const GATEWAY_TAGS: [(&str, GatewayType); 3] = [
    ("exclusiveGateway", GatewayType::Exclusive),
    ("parallelGateway", GatewayType::Parallel),
    ("inclusiveGateway", GatewayType::Inclusive),
];

const EVENT_TAGS: [(&str, EventType); 4] = [
    ("startEvent", EventType::Start),
    ("intermediateThrowEvent", EventType::Intermediate),
    ("intermediateCatchEvent", EventType::Intermediate),
    ("endEvent", EventType::End),
];

pub fn parse(path: impl AsRef<Path>) -> Result<Process, ParseError> {
    let path = path.as_ref();
    let source = read_source(path)?;
    let process = parse_str(&source)?;
    tracing::debug!(
        path = %path.display(),
        tasks = process.tasks.len(),
        gateways = process.gateways.len(),
        events = process.events.len(),
        flows = process.sequence_flows.len(),
        "parsed BPMN process"
    );
    Ok(process)
}

pub fn parse_str(source: &str) -> Result<Process, ParseError> {
    let root = parse_document(source)?;

    let process_el = root
        .child(NS, "process")
        .ok_or(ParseError::MissingElement { element: "process" })?;

    let definitions_doc = documentation(&root);
    let mut process = Process {
        id: process_el.attr_or_empty("id"),
        name: process_el.attr_or_empty("name"),
        documentation: if definitions_doc.is_empty() {
            documentation(process_el)
        } else {
            definitions_doc
        },
        ..Process::default()
    };

    // Grouped by tag, then document order within each tag.
    for tag in TASK_TAGS {
        process
            .tasks
            .extend(process_el.children(NS, tag).map(parse_task));
    }

    for (tag, gateway_type) in GATEWAY_TAGS {
        process.gateways.extend(
            process_el
                .children(NS, tag)
                .map(|node| parse_gateway(node, gateway_type)),
        );
    }

    for (tag, event_type) in EVENT_TAGS {
        process.events.extend(
            process_el
                .children(NS, tag)
                .map(|node| parse_event(node, event_type)),
        );
    }

    process.sequence_flows = process_el
        .children(NS, "sequenceFlow")
        .map(|node| SequenceFlow {
            id: node.attr_or_empty("id"),
            name: node.attr_or_empty("name"),
            source_ref: node.attr_or_empty("sourceRef"),
            target_ref: node.attr_or_empty("targetRef"),
        })
        .collect();

    if let Some(collaboration) = root.child(NS, "collaboration") {
        process.participants = collaboration
            .children(NS, "participant")
            .map(|node| Participant {
                id: node.attr_or_empty("id"),
                name: node.attr_or_empty("name"),
                process_ref: node.attr_or_empty("processRef"),
            })
            .collect();
        process.message_flows = collaboration
            .children(NS, "messageFlow")
            .map(|node| MessageFlow {
                id: node.attr_or_empty("id"),
                name: node.attr_or_empty("name"),
                source_ref: node.attr_or_empty("sourceRef"),
                target_ref: node.attr_or_empty("targetRef"),
            })
            .collect();
    }

    process.data_objects = root
        .children(NS, "itemDefinition")
        .filter_map(|node| {
            let documentation = documentation(node);
            (!documentation.is_empty()).then(|| DataObject {
                id: node.attr_or_empty("id"),
                documentation,
            })
        })
        .collect();

    Ok(process)
}

fn parse_task(node: &XmlNode) -> Task {
    Task {
        id: node.attr_or_empty("id"),
        name: node.attr_or_empty("name"),
        documentation: documentation(node),
        incoming: flow_refs(node, "incoming"),
        outgoing: flow_refs(node, "outgoing"),
    }
}

fn parse_gateway(node: &XmlNode, gateway_type: GatewayType) -> Gateway {
    Gateway {
        id: node.attr_or_empty("id"),
        name: node.attr_or_empty("name"),
        documentation: documentation(node),
        gateway_type,
        incoming: flow_refs(node, "incoming"),
        outgoing: flow_refs(node, "outgoing"),
        default_flow: node.attr_or_empty("default"),
    }
}

fn parse_event(node: &XmlNode, event_type: EventType) -> Event {
    Event {
        id: node.attr_or_empty("id"),
        name: node.attr_or_empty("name"),
        documentation: documentation(node),
        event_type,
        incoming: flow_refs(node, "incoming"),
        outgoing: flow_refs(node, "outgoing"),
    }
}

fn flow_refs(node: &XmlNode, tag: &str) -> Vec<String> {
    node.children(NS, tag)
        .map(|child| child.trimmed_text())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Text of a nested `documentation/text` node, falling back to the
/// documentation element's own text.
fn documentation(node: &XmlNode) -> String {
    let Some(doc) = node.child(NS, "documentation") else {
        return String::new();
    };
    let nested = doc.child_text(NS, "text");
    if !nested.is_empty() {
        return nested;
    }
    doc.trimmed_text().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Element;
    use std::io::Write;

    const PURCHASE_FLOW: &str = include_str!("../fixtures/purchase_requisition.bpmn");

    fn ids(elements: &[Element<'_>]) -> Vec<String> {
        elements.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn parses_approval_scenario() {
        let process = parse_str(PURCHASE_FLOW).expect("failed to parse process");

        assert_eq!(process.id, "Process_PR");
        assert_eq!(process.name, "Purchase Requisition");
        assert_eq!(
            ids(&process.ordered_elements()),
            ["start", "create_pr", "approved_gw", "post_po", "end_rejected", "end_done"]
        );

        let create = process
            .tasks
            .iter()
            .find(|task| task.name == "Create PR (ME51N)")
            .expect("create task present");
        assert_eq!(create.transaction_code(), "ME51N");
        assert_eq!(create.incoming, ["f_start"]);
        assert_eq!(create.outgoing, ["f_create"]);

        let decisions = process.decision_points();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].id, "approved_gw");
        assert_eq!(decisions[0].default_flow, "f_no");

        assert_eq!(
            process.get_outgoing_flows("approved_gw"),
            vec![("post_po", "Yes"), ("end_rejected", "No")]
        );
        assert_eq!(process.get_flow_label("approved_gw", "post_po"), "Yes");
    }

    #[test]
    fn reads_documentation_collaboration_and_data_objects() {
        let process = parse_str(PURCHASE_FLOW).expect("failed to parse process");

        assert_eq!(process.documentation, "Requisition to purchase order.");
        let create = process
            .get_element_by_id("create_pr")
            .expect("create task present");
        assert_eq!(create.documentation(), "Buyer enters the requisition.");
        let gateway = process
            .get_element_by_id("approved_gw")
            .expect("gateway present");
        assert_eq!(gateway.documentation(), "Approver checks budget.");

        assert_eq!(process.roles(), ["Requester", "Buyer"]);
        assert_eq!(process.participants[1].process_ref, "Process_PR");
        assert_eq!(process.message_flows.len(), 1);
        assert_eq!(process.message_flows[0].name, "PO copy");

        assert_eq!(process.data_objects.len(), 1);
        assert_eq!(process.data_objects[0].id, "item_pr_form");
    }

    #[test]
    fn collapses_intermediate_events_and_keeps_task_subtypes() {
        let source = format!(
            r#"<definitions xmlns="{BPMN_NS}">
  <process id="p1">
    <startEvent id="s"/>
    <serviceTask id="svc" name="Sync (ZSYNC)"/>
    <intermediateCatchEvent id="wait"/>
    <intermediateThrowEvent id="notify"/>
    <task id="plain" name="Plain"/>
    <inclusiveGateway id="inc"/>
    <endEvent id="e"/>
  </process>
</definitions>"#
        );

        let process = parse_str(&source).expect("failed to parse process");
        let task_ids: Vec<&str> = process.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(task_ids, ["plain", "svc"]);
        let intermediate = process
            .events
            .iter()
            .filter(|ev| ev.event_type == EventType::Intermediate)
            .count();
        assert_eq!(intermediate, 2);
        assert_eq!(process.gateways[0].gateway_type, GatewayType::Inclusive);
        assert!(process.participants.is_empty());
        assert!(process.message_flows.is_empty());
    }

    #[test]
    fn missing_process_is_structural_error() {
        let source = format!(r#"<definitions xmlns="{BPMN_NS}"><collaboration id="c"/></definitions>"#);
        let err = parse_str(&source).expect_err("no process element");
        assert!(matches!(err, ParseError::MissingElement { element: "process" }));
        assert!(err.is_structural());
    }

    #[test]
    fn process_outside_bpmn_namespace_is_not_recognized() {
        let err = parse_str(r#"<definitions><process id="p"/></definitions>"#)
            .expect_err("bare process");
        assert!(err.is_structural());
    }

    #[test]
    fn process_without_id_defaults_to_empty() {
        let source = format!(
            r#"<definitions xmlns="{BPMN_NS}"><process name="x"><startEvent id="s"/></process></definitions>"#
        );
        let process = parse_str(&source).expect("process without id parses");
        assert_eq!(process.id, "");
        assert_eq!(process.name, "x");
        assert_eq!(process.events.len(), 1);
        assert_eq!(process.ordered_elements().len(), 1);
    }

    #[test]
    fn malformed_xml_is_not_structural() {
        let err = parse_str("<definitions><process id=\"p\"></definitions>").expect_err("bad xml");
        assert!(!err.is_structural());
    }

    #[test]
    fn parses_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(PURCHASE_FLOW.as_bytes()).expect("write fixture");

        let process = parse(file.path()).expect("failed to parse file");
        assert_eq!(process.tasks.len(), 2);

        let missing = parse(file.path().with_extension("absent")).expect_err("missing file");
        assert!(matches!(missing, ParseError::Io { .. }));
    }

    #[test]
    fn summary_lists_flow_and_decisions() {
        let process = parse_str(PURCHASE_FLOW).expect("failed to parse process");
        let summary = process.summary().to_string();
        assert!(summary.contains("Process: Purchase Requisition"));
        assert!(summary.contains("Roles: Requester, Buyer"));
        assert!(summary.contains("Create PR (ME51N) [ME51N]"));
        assert!(summary.contains("paths: 'Yes', 'No'"));
        assert!(summary.contains("Decision Points:\n  Approved?"));
        assert!(summary.contains("Key Documents:\n  - Purchase requisition form"));
    }
}
