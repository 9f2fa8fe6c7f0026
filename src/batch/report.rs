//! Plain-text reports for the batch CLI

use alignment_interpreter::interpretation_core::diagnostics::{BlockerCount, Distribution};
use alignment_interpreter::interpretation_core::{
    DiagnosticsResult, Dimension, ThresholdConfig, ThresholdKey,
};
use alignment_interpreter::{ThresholdVersion, VersionRegistry};
use std::fmt::Write;

pub fn diagnostics_report(result: &DiagnosticsResult, config: &ThresholdConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Alignment diagnostics ({} bars) ===", result.total_bars);

    for dimension in Dimension::ALL {
        let _ = writeln!(out, "\n{}", dimension);
        write_distribution(&mut out, result.distribution.dimension(dimension));
    }

    let d = &result.distribution;
    let _ = writeln!(out, "\nDivergence warnings: {}", d.divergence_warning_count);
    let _ = writeln!(out, "Wave 3 continuation: {}", d.wave3_continuation_count);
    let _ = writeln!(out, "Wave 5 exhaustion:   {}", d.wave5_exhaustion_count);

    let _ = writeln!(out, "\nmulti_tf_stack_score bands");
    write_distribution(&mut out, &result.multi_tf_stack_bands);

    let gating = &result.gating_analysis;
    write_blockers(&mut out, "Not STRONG blocked by", &gating.strong_alignment);
    write_blockers(&mut out, "Not HIGH confidence blocked by", &gating.high_confidence);
    write_blockers(&mut out, "Not CONTINUATION blocked by", &gating.continuation_bias);

    let rare = &result.rare_states;
    let _ = writeln!(out, "\nRare states");
    if rare.rare.is_empty() && rare.unreachable.is_empty() && rare.overrepresented.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for s in &rare.unreachable {
        let _ = writeln!(out, "  UNREACHABLE      {}.{}", s.state, s.value);
    }
    for s in &rare.rare {
        let _ = writeln!(out, "  RARE             {}.{} ({:.2}%)", s.state, s.value, s.pct);
    }
    for s in &rare.overrepresented {
        let _ = writeln!(out, "  OVERREPRESENTED  {}.{} ({:.2}%)", s.state, s.value, s.pct);
    }

    let defaults = ThresholdConfig::default();
    let changed: Vec<String> = ThresholdKey::ALL
        .iter()
        .filter(|&&k| config.get(k) != defaults.get(k))
        .map(|&k| format!("{}={}", k, config.get(k)))
        .collect();
    if !changed.is_empty() {
        let _ = writeln!(out, "\nNon-default thresholds: {}", changed.join(", "));
    }
    out
}

fn write_distribution(out: &mut String, distribution: &Distribution) {
    for (name, share) in distribution.iter() {
        let _ = writeln!(out, "  {:<12} {:>6} {:>7.2}%", name, share.count, share.pct);
    }
}

fn write_blockers(out: &mut String, title: &str, blockers: &[BlockerCount]) {
    let _ = writeln!(out, "\n{}", title);
    if blockers.is_empty() {
        let _ = writeln!(out, "  (no bars)");
    }
    for b in blockers {
        let _ = writeln!(out, "  {:>6} {:>7.2}%  {}", b.count, b.pct, b.label);
    }
}

pub fn thresholds_table(config: &ThresholdConfig, active: Option<&ThresholdVersion>) -> String {
    let mut out = String::new();
    match active {
        Some(v) => {
            let _ = writeln!(out, "Active version: {} ({})", v.id, v.name);
        }
        None => {
            let _ = writeln!(out, "Active version: none (defaults)");
        }
    }
    let defaults = ThresholdConfig::default();
    let mut category = None;
    for key in ThresholdKey::ALL {
        if category != Some(key.category()) {
            category = Some(key.category());
            let _ = writeln!(out, "\n{}", key.category());
        }
        let value = config.get(key);
        let marker = if value != defaults.get(key) { "*" } else { " " };
        let _ = writeln!(out, "{} {:<22} {:>6} {}", marker, key.name(), value, key.label());
    }
    out
}

pub fn versions_table(registry: &VersionRegistry) -> String {
    let mut out = String::new();
    if registry.versions.is_empty() {
        let _ = writeln!(out, "No saved versions");
        return out;
    }
    for v in &registry.versions {
        let active = if registry.active_version_id.as_deref() == Some(v.id.as_str()) {
            "*"
        } else {
            " "
        };
        let _ = writeln!(
            out,
            "{} {:<4} {:<24} {}",
            active,
            v.id,
            v.name,
            v.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alignment_interpreter::interpretation_core::{diagnose, RawIntervalScores};

    #[test]
    fn test_report_mentions_blockers_and_rare_states() {
        let scores = vec![
            RawIntervalScores {
                alignment_score: Some(0.5),
                multi_tf_stack_score: Some(0.5),
                ..Default::default()
            };
            10
        ];
        let config = ThresholdConfig::default();
        let report = diagnostics_report(&diagnose(scores, &config), &config);
        assert!(report.contains("(10 bars)"));
        assert!(report.contains("alignment_score < 0.75"));
        assert!(report.contains("UNREACHABLE      alignment_state.STRONG"));
        assert!(!report.contains("Non-default thresholds"));
    }

    #[test]
    fn test_thresholds_table_marks_overrides() {
        let config = ThresholdConfig {
            alignment_strong: 0.6,
            ..Default::default()
        };
        let table = thresholds_table(&config, None);
        assert!(table.contains("* alignment_strong"));
        assert!(table.contains("  alignment_moderate"));
        assert!(table.contains("none (defaults)"));
    }
}
