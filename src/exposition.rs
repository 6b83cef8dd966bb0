//! Prometheus text exposition format (0.0.4) rendering.

use std::fmt::Write;

use crate::collector::{describe, MetricKind, Sample};

/// Render one scrape's samples. Each metric has at most one sample per
/// cycle, so HELP/TYPE comments are emitted per sample in cycle order.
pub fn render(samples: &[Sample]) -> String {
    let descriptors = describe();
    let mut output = String::with_capacity(samples.len() * 80);

    for sample in samples {
        if let Some(descriptor) = descriptors.iter().find(|d| d.name == sample.name) {
            writeln!(output, "# HELP {} {}", descriptor.name, descriptor.help).ok();
            writeln!(output, "# TYPE {} {}", descriptor.name, type_str(descriptor.kind)).ok();
        }
        writeln!(output, "{} {}", sample.name, sample.value).ok();
    }

    output
}

fn type_str(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Gauge => "gauge",
        MetricKind::Counter => "counter",
    }
}
