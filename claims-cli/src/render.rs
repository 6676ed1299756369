use claim_flow::{ClaimDraft, RenderState, ReportView};
use std::fmt::Write;

/// Plain-text rendering of the claim and the results panel.
pub fn to_text(draft: &ClaimDraft, state: &RenderState) -> String {
    let mut out = String::new();
    let fields = draft.fields();
    let _ = writeln!(out, "Claim Details");
    let _ = writeln!(out, "  Description:   {}", draft.description());
    let _ = writeln!(out, "  Accident:      {}", fields.accident_type);
    let _ = writeln!(out, "  Location:      {}", fields.location);
    let _ = writeln!(out, "  Impact speed:  {} km/h", fields.impact_speed);
    let _ = writeln!(out, "  Braking:       {}", fields.braking_info);
    let _ = writeln!(out);

    match state {
        RenderState::Initial => {
            let _ = writeln!(out, "Ready for Assessment");
        }
        RenderState::Loading => {
            let _ = writeln!(out, "Running AI Analysis...");
        }
        RenderState::Error { message } => {
            let _ = writeln!(out, "Analysis Failed");
            let _ = writeln!(out, "  {message}");
        }
        RenderState::Report(view) => write_report(&mut out, view),
    }
    out
}

fn write_report(out: &mut String, view: &ReportView) {
    let _ = writeln!(out, "Overall Severity:      {}", view.overall_severity);
    let _ = writeln!(out, "Total Estimated Cost:  {}", view.total_estimated_cost_display);
    let _ = writeln!(
        out,
        "Highlighted image:     {} ({} bytes)",
        view.highlighted_image.mime(),
        view.highlighted_image.len()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Itemized Damage Report");
    for part in &view.damaged_parts {
        let _ = writeln!(
            out,
            "  - {} [{}] {}: {}",
            part.part_name, part.severity, part.estimated_cost_display, part.reasoning
        );
    }
    if let Some(fraud_check) = &view.fraud_check {
        let _ = writeln!(out);
        let _ = writeln!(out, "Fraud & Tampering Check");
        let _ = writeln!(out, "  {fraud_check}");
    }
}
