//! Rendering sinks.

use crate::models::{PanelReport, PanelStatus, PresentationHint, Summary};
use tracing::debug;

/// Receiver of pipeline output.
///
/// `render` gets each summary exactly as the pipeline produced it;
/// `placeholder` is called instead when the panel's driving selection is
/// empty.
pub trait ChartSink {
    fn render(&mut self, hint: &PresentationHint, summary: &Summary);
    fn placeholder(&mut self, hint: &PresentationHint, dimension: &str);
    fn notice(&mut self, message: &str);
}

/// Collects panels and notices for a report.
#[derive(Debug, Default)]
pub struct ReportSink {
    panels: Vec<PanelReport>,
    notices: Vec<String>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn panels(&self) -> &[PanelReport] {
        &self.panels
    }

    /// Consume the sink, returning `(panels, notices)`.
    pub fn into_parts(self) -> (Vec<PanelReport>, Vec<String>) {
        (self.panels, self.notices)
    }
}

/// Message shown in place of a chart whose selection is empty.
pub fn placeholder_message(dimension: &str) -> String {
    format!("Select at least one {} to show this chart.", dimension)
}

impl ChartSink for ReportSink {
    fn render(&mut self, hint: &PresentationHint, summary: &Summary) {
        debug!("Rendering panel '{}'", hint.title);
        self.panels.push(PanelReport {
            hint: hint.clone(),
            status: PanelStatus::Rendered {
                summary: summary.clone(),
            },
        });
    }

    fn placeholder(&mut self, hint: &PresentationHint, dimension: &str) {
        debug!("Placeholder for panel '{}' ({})", hint.title, dimension);
        self.panels.push(PanelReport {
            hint: hint.clone(),
            status: PanelStatus::Placeholder {
                dimension: dimension.to_string(),
                message: placeholder_message(dimension),
            },
        });
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
