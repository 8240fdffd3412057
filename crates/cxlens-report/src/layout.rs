//! Report structure: which lines appear, in which order, in which style.

use cxlens_schema::AnalysisResult;

pub const REPORT_TITLE: &str = "Code Complexity Report";
pub const SUMMARY_HEADING: &str = "Summary Metrics";
pub const FUNCTIONS_HEADING: &str = "Function Complexity";
pub const EMPTY_SECTION: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

/// Ordered, styled lines of one report, before pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    lines: Vec<ReportLine>,
}

impl ReportDocument {
    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    /// Plain-text rendition: one line per report line, detail indented.
    pub fn to_plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| match line.style {
                LineStyle::Detail => format!("    {}", line.text),
                _ => line.text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Project an analysis result onto the fixed report structure.
pub fn layout(result: &AnalysisResult) -> ReportDocument {
    let mut lines = vec![
        ReportLine::new(LineStyle::Title, REPORT_TITLE),
        ReportLine::new(LineStyle::Heading, SUMMARY_HEADING),
    ];

    if result.summary().is_empty() {
        lines.push(ReportLine::new(LineStyle::Body, EMPTY_SECTION));
    }
    for metric in result.summary().iter() {
        lines.push(ReportLine::new(
            LineStyle::Body,
            format!("{}: {}", metric.name, metric.value),
        ));
    }

    lines.push(ReportLine::new(LineStyle::Heading, FUNCTIONS_HEADING));
    if result.functions().is_empty() {
        lines.push(ReportLine::new(LineStyle::Body, EMPTY_SECTION));
    }
    for function in result.functions() {
        lines.push(ReportLine::new(
            LineStyle::Body,
            format!("{}: {}", function.name, function.complexity),
        ));
        if let Some(time) = &function.time_complexity {
            lines.push(ReportLine::new(LineStyle::Detail, format!("time: {time}")));
        }
        if let Some(space) = &function.space_complexity {
            lines.push(ReportLine::new(LineStyle::Detail, format!("space: {space}")));
        }
        for issue in function.issues.iter().flatten() {
            lines.push(ReportLine::new(LineStyle::Detail, format!("issue: {issue}")));
        }
    }

    ReportDocument { lines }
}
