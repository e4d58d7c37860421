use crate::registry::CounterSnapshot;
use std::fmt::Write;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render counter snapshots in the text exposition format.
///
/// ```text
/// # HELP errors_total Number of errors
/// # TYPE errors_total counter
/// errors_total{host="api",env="prod"} 3
/// ```
pub fn render(counters: &[CounterSnapshot]) -> String {
    let mut out = String::new();

    for counter in counters {
        let _ = writeln!(out, "# HELP {} {}", counter.name, escape_help(&counter.help));
        let _ = writeln!(out, "# TYPE {} counter", counter.name);

        if counter.label_names.is_empty() && counter.series.is_empty() {
            let _ = writeln!(out, "{} 0", counter.name);
            continue;
        }

        for series in &counter.series {
            out.push_str(&counter.name);
            if !counter.label_names.is_empty() {
                out.push('{');
                for (i, (name, value)) in counter
                    .label_names
                    .iter()
                    .zip(&series.label_values)
                    .enumerate()
                {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}=\"{}\"", name, escape_label_value(value));
                }
                out.push('}');
            }
            let _ = writeln!(out, " {}", series.value);
        }
    }

    out
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SeriesSnapshot;

    #[test]
    fn test_render_labeled_counter() {
        let snapshot = CounterSnapshot {
            name: "errors_total".to_string(),
            help: "Number of errors".to_string(),
            label_names: vec!["host".to_string(), "env".to_string()],
            series: vec![SeriesSnapshot {
                label_values: vec!["api".to_string(), "prod".to_string()],
                value: 3,
            }],
        };

        assert_eq!(
            render(&[snapshot]),
            "# HELP errors_total Number of errors\n\
             # TYPE errors_total counter\n\
             errors_total{host=\"api\",env=\"prod\"} 3\n"
        );
    }

    #[test]
    fn test_unobserved_unlabeled_counter_renders_zero() {
        let snapshot = CounterSnapshot {
            name: "events".to_string(),
            help: "All events".to_string(),
            label_names: vec![],
            series: vec![],
        };
        assert!(render(&[snapshot]).ends_with("events 0\n"));
    }

    #[test]
    fn test_unobserved_labeled_counter_has_no_samples() {
        let snapshot = CounterSnapshot {
            name: "events".to_string(),
            help: String::new(),
            label_names: vec!["host".to_string()],
            series: vec![],
        };
        assert_eq!(render(&[snapshot]).lines().count(), 2);
    }

    #[test]
    fn test_label_values_are_escaped() {
        assert_eq!(escape_label_value("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
        assert_eq!(escape_help("line\\one\nline two"), "line\\\\one\\nline two");
    }
}
