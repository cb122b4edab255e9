//! Process graph model produced by the BPMN parser.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
}

impl Task {
    /// First parenthesised token of 2 to 10 uppercase letters or digits in
    /// the task name, e.g. `ME51N` in `"Create PR (ME51N)"`.
    pub fn transaction_code(&self) -> &str {
        extract_transaction_code(&self.name).unwrap_or_default()
    }
}

static TRANSACTION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([A-Z0-9]{2,10})\)").expect("transaction code pattern compiles")
});

pub fn extract_transaction_code(name: &str) -> Option<&str> {
    TRANSACTION_CODE
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayType {
    Exclusive,
    Parallel,
    Inclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    pub gateway_type: GatewayType,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
    /// Id of the default sequence flow, empty when none is declared.
    #[serde(default)]
    pub default_flow: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    Intermediate,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    pub event_type: EventType,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceFlow {
    pub id: String,
    /// Branch label, e.g. "Yes" on a decision outcome.
    #[serde(default)]
    pub name: String,
    pub source_ref: String,
    pub target_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub process_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageFlow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub source_ref: String,
    pub target_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataObject {
    pub id: String,
    #[serde(default)]
    pub documentation: String,
}

/// A borrowed view of any flow node in a process.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Task(&'a Task),
    Gateway(&'a Gateway),
    Event(&'a Event),
}

impl<'a> Element<'a> {
    pub fn id(&self) -> &'a str {
        match *self {
            Element::Task(task) => &task.id,
            Element::Gateway(gateway) => &gateway.id,
            Element::Event(event) => &event.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Element::Task(task) => &task.name,
            Element::Gateway(gateway) => &gateway.name,
            Element::Event(event) => &event.name,
        }
    }

    pub fn documentation(&self) -> &'a str {
        match *self {
            Element::Task(task) => &task.documentation,
            Element::Gateway(gateway) => &gateway.documentation,
            Element::Event(event) => &event.documentation,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Element::Task(_) => "Task",
            Element::Gateway(_) => "Gateway",
            Element::Event(_) => "Event",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Process {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub sequence_flows: Vec<SequenceFlow>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub message_flows: Vec<MessageFlow>,
    #[serde(default)]
    pub data_objects: Vec<DataObject>,
}

impl Process {
    /// Participant (lane) names in declaration order.
    pub fn roles(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name.as_str()).collect()
    }

    /// Every flow node: tasks, then gateways, then events.
    pub fn elements(&self) -> impl Iterator<Item = Element<'_>> {
        self.tasks
            .iter()
            .map(Element::Task)
            .chain(self.gateways.iter().map(Element::Gateway))
            .chain(self.events.iter().map(Element::Event))
    }

    pub fn start_event(&self) -> Option<&Event> {
        self.events
            .iter()
            .find(|event| event.event_type == EventType::Start)
    }

    /// Breadth-first walk of the sequence flows from the start event.
    ///
    /// Each element is emitted once, on first visit, so cycles are cut at the
    /// first revisit without being reported. Sibling order follows the order
    /// the flows appear in the document. Without a start event all elements
    /// are returned in insertion order.
    pub fn ordered_elements(&self) -> Vec<Element<'_>> {
        let mut lookup: HashMap<&str, Element<'_>> = HashMap::new();
        let mut insertion: Vec<&str> = Vec::new();
        for element in self.elements() {
            if lookup.insert(element.id(), element).is_none() {
                insertion.push(element.id());
            }
        }

        let Some(start) = self.start_event() else {
            return insertion.into_iter().map(|id| lookup[id]).collect();
        };

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for flow in &self.sequence_flows {
            adjacency
                .entry(flow.source_ref.as_str())
                .or_default()
                .push(flow.target_ref.as_str());
        }

        let mut ordered = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([start.id.as_str()]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(element) = lookup.get(current) {
                ordered.push(*element);
            }
            for &next in adjacency.get(current).into_iter().flatten() {
                if !visited.contains(next) {
                    queue.push_back(next);
                }
            }
        }

        ordered
    }

    /// Elements that [`Process::ordered_elements`] never reaches from the
    /// start event. Empty when there is no start event.
    pub fn unreachable_elements(&self) -> Vec<Element<'_>> {
        let reached: HashSet<&str> = self
            .ordered_elements()
            .iter()
            .map(|element| element.id())
            .collect();
        self.elements()
            .filter(|element| !reached.contains(element.id()))
            .collect()
    }

    /// Exclusive gateways only; parallel and inclusive splits are not
    /// decisions a trainee makes.
    pub fn decision_points(&self) -> Vec<&Gateway> {
        self.gateways
            .iter()
            .filter(|gateway| gateway.gateway_type == GatewayType::Exclusive)
            .collect()
    }

    /// `(target_ref, label)` for each flow leaving `element_id`, in document order.
    pub fn get_outgoing_flows(&self, element_id: &str) -> Vec<(&str, &str)> {
        self.sequence_flows
            .iter()
            .filter(|flow| flow.source_ref == element_id)
            .map(|flow| (flow.target_ref.as_str(), flow.name.as_str()))
            .collect()
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<Element<'_>> {
        self.elements().find(|element| element.id() == element_id)
    }

    pub fn get_flow_label(&self, source_id: &str, target_id: &str) -> &str {
        self.sequence_flows
            .iter()
            .find(|flow| flow.source_ref == source_id && flow.target_ref == target_id)
            .map(|flow| flow.name.as_str())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> ProcessSummary<'_> {
        ProcessSummary { process: self }
    }
}

pub struct ProcessSummary<'a> {
    process: &'a Process,
}

impl fmt::Display for ProcessSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let process = self.process;
        writeln!(f, "Process: {}", process.name)?;
        writeln!(f, "  ID: {}", process.id)?;
        writeln!(f, "  Roles: {}", process.roles().join(", "))?;
        writeln!(f, "  Tasks: {}", process.tasks.len())?;
        writeln!(f, "  Gateways: {}", process.gateways.len())?;
        writeln!(f, "  Events: {}", process.events.len())?;
        writeln!(f, "  Flows: {}", process.sequence_flows.len())?;

        if !process.documentation.is_empty() {
            writeln!(f, "\nDocumentation:")?;
            for line in process.documentation.lines().take(8) {
                writeln!(f, "  {}", line.trim())?;
            }
        }

        writeln!(f, "\nProcess Flow (execution order):")?;
        for element in process.ordered_elements() {
            let extra = match element {
                Element::Task(task) if !task.transaction_code().is_empty() => {
                    format!(" [{}]", task.transaction_code())
                }
                Element::Gateway(gateway) => {
                    let paths: Vec<String> = process
                        .get_outgoing_flows(&gateway.id)
                        .into_iter()
                        .map(|(_, label)| {
                            if label.is_empty() {
                                "default".to_string()
                            } else {
                                format!("'{label}'")
                            }
                        })
                        .collect();
                    if paths.is_empty() {
                        String::new()
                    } else {
                        format!(" -> paths: {}", paths.join(", "))
                    }
                }
                _ => String::new(),
            };
            writeln!(f, "  [{:8}] {}{}", element.kind_label(), element.name(), extra)?;
        }

        let decisions = process.decision_points();
        if !decisions.is_empty() {
            writeln!(f, "\nDecision Points:")?;
            for gateway in decisions {
                writeln!(f, "  {}", gateway.name)?;
                for line in gateway.documentation.lines().take(4) {
                    writeln!(f, "    {}", line.trim())?;
                }
            }
        }

        if !process.data_objects.is_empty() {
            writeln!(f, "\nKey Documents:")?;
            for object in &process.data_objects {
                let label = object
                    .documentation
                    .lines()
                    .next()
                    .filter(|line| !line.is_empty())
                    .unwrap_or(object.id.as_str());
                writeln!(f, "  - {label}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, name: &str) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
            ..Task::default()
        }
    }

    fn event(id: &str, event_type: EventType) -> Event {
        Event {
            id: id.to_string(),
            name: id.to_string(),
            documentation: String::new(),
            event_type,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    fn gateway(id: &str, gateway_type: GatewayType) -> Gateway {
        Gateway {
            id: id.to_string(),
            name: id.to_string(),
            documentation: String::new(),
            gateway_type,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            default_flow: String::new(),
        }
    }

    fn flow(id: &str, source: &str, target: &str, name: &str) -> SequenceFlow {
        SequenceFlow {
            id: id.to_string(),
            name: name.to_string(),
            source_ref: source.to_string(),
            target_ref: target.to_string(),
        }
    }

    fn ids(elements: &[Element<'_>]) -> Vec<String> {
        elements.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn extracts_transaction_codes() {
        assert_eq!(task("t", "Create PR (ME51N)").transaction_code(), "ME51N");
        assert_eq!(task("t", "Post GR (MIGO) then (MB1C)").transaction_code(), "MIGO");
        assert_eq!(task("t", "Check (stock) in (MMBE)").transaction_code(), "MMBE");
        assert_eq!(task("t", "Single (X)").transaction_code(), "");
        assert_eq!(task("t", "Too long (ABCDEFGHIJK)").transaction_code(), "");
        assert_eq!(task("t", "No code here").transaction_code(), "");
        assert_eq!(task("t", "Nested ((AB))").transaction_code(), "AB");
        assert_eq!(task("t", "Mixed (Me51n) case").transaction_code(), "");
    }

    #[test]
    fn bfs_truncates_cycles_without_error() {
        let process = Process {
            id: "loop".to_string(),
            tasks: vec![task("a", "A"), task("b", "B")],
            events: vec![event("start", EventType::Start)],
            sequence_flows: vec![
                flow("f1", "start", "a", ""),
                flow("f2", "a", "b", ""),
                flow("f3", "b", "a", "retry"),
            ],
            ..Process::default()
        };

        assert_eq!(ids(&process.ordered_elements()), ["start", "a", "b"]);
        assert!(process.unreachable_elements().is_empty());
    }

    #[test]
    fn sibling_order_follows_flow_declaration_order() {
        let process = Process {
            id: "split".to_string(),
            tasks: vec![task("left", "Left"), task("right", "Right")],
            gateways: vec![gateway("g", GatewayType::Parallel)],
            events: vec![event("start", EventType::Start)],
            sequence_flows: vec![
                flow("f1", "start", "g", ""),
                flow("f2", "g", "right", ""),
                flow("f3", "g", "left", ""),
            ],
            ..Process::default()
        };

        assert_eq!(ids(&process.ordered_elements()), ["start", "g", "right", "left"]);
        assert!(process.decision_points().is_empty());
    }

    #[test]
    fn without_start_event_returns_insertion_order() {
        let process = Process {
            id: "nostart".to_string(),
            tasks: vec![task("t1", "One")],
            gateways: vec![gateway("g1", GatewayType::Exclusive)],
            events: vec![event("end", EventType::End)],
            sequence_flows: vec![flow("f1", "end", "t1", "")],
            ..Process::default()
        };

        assert_eq!(ids(&process.ordered_elements()), ["t1", "g1", "end"]);
        assert!(process.unreachable_elements().is_empty());
    }

    #[test]
    fn reports_elements_not_reachable_from_start() {
        let process = Process {
            id: "island".to_string(),
            tasks: vec![task("a", "A"), task("orphan", "Orphan")],
            events: vec![event("start", EventType::Start)],
            sequence_flows: vec![flow("f1", "start", "a", ""), flow("f2", "a", "ghost", "")],
            ..Process::default()
        };

        assert_eq!(ids(&process.ordered_elements()), ["start", "a"]);
        assert_eq!(ids(&process.unreachable_elements()), ["orphan"]);
        assert!(process.get_element_by_id("ghost").is_none());
    }

    #[test]
    fn flow_lookups_use_first_match() {
        let process = Process {
            id: "labels".to_string(),
            sequence_flows: vec![
                flow("f1", "g", "a", "Yes"),
                flow("f2", "g", "a", "Again"),
                flow("f3", "g", "b", ""),
            ],
            ..Process::default()
        };

        assert_eq!(process.get_flow_label("g", "a"), "Yes");
        assert_eq!(process.get_flow_label("g", "b"), "");
        assert_eq!(process.get_flow_label("a", "g"), "");
        assert_eq!(
            process.get_outgoing_flows("g"),
            vec![("a", "Yes"), ("a", "Again"), ("b", "")]
        );
    }

    #[test]
    fn decision_points_are_exactly_the_exclusive_gateways() {
        let process = Process {
            id: "gateways".to_string(),
            gateways: vec![
                gateway("x", GatewayType::Exclusive),
                gateway("p", GatewayType::Parallel),
                gateway("i", GatewayType::Inclusive),
                gateway("x2", GatewayType::Exclusive),
            ],
            ..Process::default()
        };

        let decisions: Vec<&str> = process
            .decision_points()
            .iter()
            .map(|gw| gw.id.as_str())
            .collect();
        assert_eq!(decisions, ["x", "x2"]);
        for gw in &process.gateways {
            assert_eq!(
                decisions.contains(&gw.id.as_str()),
                gw.gateway_type == GatewayType::Exclusive
            );
        }
    }
}
