//! Render a [`kontra::orchestrator::RunOutput`] as text, JSON, or YAML.
//!
//! Grounded on the engine's own `output.rs`: a format enum, an options
//! struct, and one `format_*` function per serialization target.

use colored::Colorize;
use kontra::orchestrator::RunOutput;

use crate::cli::Format;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub format:  Format,
    pub colored: bool,
    pub stats:   bool
}

pub fn render(output: &RunOutput, opts: &RenderOptions) -> String {
    match opts.format {
        Format::Json => serde_json::to_string_pretty(&trimmed(output, opts)).unwrap_or_default(),
        Format::Yaml => serde_yaml::to_string(&trimmed(output, opts)).unwrap_or_default(),
        Format::Text => render_text(output, opts)
    }
}

/// `RunOutput` already hides `stats` behind `skip_serializing_if`; drop it
/// outright when `--stats` was not passed so JSON/YAML mirror the text view.
fn trimmed(output: &RunOutput, opts: &RenderOptions) -> RunOutput {
    let mut out = output.clone();
    if !opts.stats {
        out.stats = None;
    }
    out
}

fn render_text(output: &RunOutput, opts: &RenderOptions) -> String {
    let mut text = String::new();
    let header = format!("=== {} ===\n\n", output.dataset);
    text.push_str(&if opts.colored { header.bold().to_string() } else { header });

    for result in &output.results {
        let line = format!(
            "[{}] {} — {}\n",
            if result.passed { "PASS" } else { "FAIL" },
            result.rule_name,
            result.message
        );
        if opts.colored {
            text.push_str(&if result.passed { line.green().to_string() } else { line.red().to_string() });
        } else {
            text.push_str(&line);
        }
    }

    text.push('\n');
    let summary = &output.summary;
    text.push_str(&format!(
        "{} rules, {} passed, {} failed ({} blocking, {} warning, {} info)\n",
        summary.total_rules,
        summary.rules_passed,
        summary.rules_failed,
        summary.blocking_failures,
        summary.warning_failures,
        summary.info_failures
    ));

    if opts.stats {
        if let Some(stats) = &output.stats {
            text.push_str(&format!("engine: {}\n", stats.engine_label));
            if let Some(preplan) = &stats.preplan_summary {
                text.push_str(&format!(
                    "preplan: {}/{} row groups kept, {} pass_meta, {} fail_meta, {} unknown\n",
                    preplan.rg_kept, preplan.rg_total, preplan.rules_pass_meta, preplan.rules_fail_meta, preplan.rules_unknown
                ));
            }
            if let Some(pushdown) = &stats.pushdown_summary {
                text.push_str(&format!("pushdown: {} via {}\n", pushdown.rules_pushed, pushdown.executor));
            }
        }
    }

    text
}
