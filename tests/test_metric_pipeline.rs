use log_metrics::config::parse_config;
use log_metrics::{
    DefaultLabelValues, LabelAliases, Level, LogEvent, MetricPipeline, MetricRegistry,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn pipeline_with_defaults(yaml: &str, defaults: DefaultLabelValues) -> MetricPipeline {
    let specs = parse_config(yaml, "test")
        .expect("config parses")
        .validate(&LabelAliases::default())
        .expect("config validates");
    MetricPipeline::build(specs, Arc::new(defaults), Arc::new(MetricRegistry::new()))
        .expect("pipeline builds")
}

fn pipeline(yaml: &str) -> MetricPipeline {
    pipeline_with_defaults(yaml, DefaultLabelValues::new().with("host", "localhost"))
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn count(pipeline: &MetricPipeline, metric: &str, pairs: &[(&str, &str)]) -> u64 {
    pipeline
        .registry()
        .counter(metric)
        .expect("counter registered")
        .get(&labels(pairs))
}

#[test]
fn test_label_from_event_property() {
    let pipeline = pipeline(
        r#"
- name: example_metric
  help: Number of events
  filter: "Level = 'Information'"
  labels:
    - name: name
      value: "{Name}"
"#,
    );

    let event =
        LogEvent::new(Level::Information, "Hello, {Name}!").with_property("Name", "some_name");
    let report = pipeline.handle_event(&event);

    assert_eq!(report.incremented, 1);
    assert_eq!(count(&pipeline, "example_metric", &[("name", "some_name")]), 1);
}

#[test]
fn test_missing_label_property_falls_back_to_default() {
    let pipeline = pipeline(
        r#"
- name: by_host
  filter: "Level = Error"
  tags: ["{Host}"]
"#,
    );

    pipeline.handle_event(&LogEvent::new(Level::Error, "boom"));
    pipeline.handle_event(&LogEvent::new(Level::Error, "boom").with_property("Host", "web-1"));

    assert_eq!(count(&pipeline, "by_host", &[("host", "localhost")]), 1);
    assert_eq!(count(&pipeline, "by_host", &[("host", "web-1")]), 1);
}

#[test]
fn test_unresolvable_label_skips_observation() {
    let pipeline = pipeline(
        r#"
- name: by_environment
  filter: "Level = Error"
  labels:
    - name: env
      value: "{Environment}"
"#,
    );

    let report = pipeline.handle_event(&LogEvent::new(Level::Error, "boom"));

    assert_eq!(report.matched, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.incremented, 0);
    assert!(pipeline.registry().snapshot()[0].series.is_empty());
}

#[test]
fn test_malformed_filter_excludes_only_that_metric() {
    let pipeline = pipeline(
        r#"
- name: broken
  filter: "Level = "
- name: errors
  filter: "Level = Error"
"#,
    );

    assert_eq!(pipeline.rejected().len(), 1);
    assert_eq!(pipeline.rejected()[0].name, "broken");
    assert!(pipeline.registry().counter("broken").is_none());

    let report = pipeline.handle_event(&LogEvent::new(Level::Error, "boom"));
    assert_eq!(report.incremented, 1);
    assert_eq!(count(&pipeline, "errors", &[]), 1);
}

#[test]
fn test_every_matching_metric_counts_independently() {
    let pipeline = pipeline(
        r#"
- name: all_errors
  filter: "Level = Error"
- name: api_errors
  filter: "Level = Error AND Host = api"
- name: warnings
  filter: "Level = Warning"
"#,
    );

    pipeline.handle_event(&LogEvent::new(Level::Error, "a").with_property("Host", "api"));
    pipeline.handle_event(&LogEvent::new(Level::Error, "b").with_property("Host", "web"));
    pipeline.handle_event(&LogEvent::new(Level::Information, "c"));

    assert_eq!(count(&pipeline, "all_errors", &[]), 2);
    assert_eq!(count(&pipeline, "api_errors", &[]), 1);
    assert_eq!(count(&pipeline, "warnings", &[]), 0);
}

#[test]
fn test_concurrent_events_are_all_counted() {
    const THREADS: usize = 8;
    const EVENTS: usize = 500;

    let pipeline = pipeline(
        r#"
- name: requests
  filter: "Level = Information"
  tags: ["{Route}"]
"#,
    );

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let pipeline = &pipeline;
            scope.spawn(move || {
                let route = if t % 2 == 0 { "/a" } else { "/b" };
                for _ in 0..EVENTS {
                    let event =
                        LogEvent::new(Level::Information, "hit").with_property("Route", route);
                    pipeline.handle_event(&event);
                }
            });
        }
    });

    let half = (THREADS / 2 * EVENTS) as u64;
    assert_eq!(count(&pipeline, "requests", &[("route", "/a")]), half);
    assert_eq!(count(&pipeline, "requests", &[("route", "/b")]), half);
}

#[test]
fn test_constant_and_composite_templates() {
    let pipeline = pipeline_with_defaults(
        r#"
- name: deploys
  filter: "Level = Information"
  labels:
    - name: env
      value: production
    - name: target
      value: "{Service}@{Region}"
"#,
        DefaultLabelValues::new(),
    );

    let event = LogEvent::new(Level::Information, "deployed")
        .with_property("Service", "billing")
        .with_property("Region", "eu-west");
    pipeline.handle_event(&event);

    assert_eq!(
        count(
            &pipeline,
            "deploys",
            &[("env", "production"), ("target", "billing@eu-west")]
        ),
        1
    );
}
