use httpbench_common::Report;

pub const BANNER: &str = "********** Benchmark Result **********";

/// Render the report as a two-column table sized to its longest label and value.
pub fn render_table(report: &Report) -> String {
    let fields = report.fields();
    let left = fields.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
    let right = fields.iter().map(|(_, value)| value.chars().count()).max().unwrap_or(0);
    let rule = "-".repeat(left + right + 7);

    let mut lines = Vec::with_capacity(fields.len() + 3);
    lines.push(BANNER.to_string());
    lines.push(rule.clone());
    for (label, value) in &fields {
        lines.push(format!(
            "| {label:<lw$}| {value:<rw$}|",
            lw = left + 1,
            rw = right + 1
        ));
    }
    lines.push(rule);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn render_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
