use serde_derive::Deserialize;
use serde_derive::Serialize;

/// Selects which messages count as highlights when the report includes an
/// extraction section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HighlightPolicy {
    Keywords(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportOptions {
    pub title: Option<String>,
    pub include_metadata: bool,
    pub include_transcript: bool,
    pub highlight: Option<HighlightPolicy>,
    /// When set, the orchestrator routes one extra generation request
    /// through the normal client and cache path and prepends the output as
    /// a Summary section. The synthesizer itself never generates.
    pub summarize: bool,
}

impl Default for ReportOptions {
    fn default() -> ReportOptions {
        return ReportOptions {
            title: None,
            include_metadata: true,
            include_transcript: true,
            highlight: None,
            summarize: false,
        };
    }
}

/// Plain structured text plus minimal layout hints. Rendering to a binary
/// document format is an external collaborator's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub heading: String,
    pub level: u8,
    pub body: String,
    pub page_break: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub sections: Vec<ReportSection>,
}
