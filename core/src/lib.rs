pub mod bpmn;
pub mod config;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod process;
pub mod script;
pub mod tosca;
pub mod xml;

pub use config::{OutputConfig, PipelineConfig, Scope, SourcePaths};
pub use error::ParseError;
pub use overlay::{
    OverlayAssembler, OverlayRule, OverlaySummary, ResolvedOverlay, ResolvedOverlays,
    ResolvedVariation, SiteInfo, Variation,
};
pub use pipeline::{dry_run, load_overlays, parse_sources, DryRun, ParsedSources};
pub use process::{
    extract_transaction_code, DataObject, Element, Event, EventType, Gateway, GatewayType,
    MessageFlow, Participant, Process, ProcessSummary, SequenceFlow, Task,
};
pub use script::{
    is_site_specific_annotation, reason_mentions_site, ActionType, Annotation, Assertion,
    ScriptSummary, Step, TestDataRow, TestScript, UiElement,
};
