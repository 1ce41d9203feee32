//! Testing utilities for the template versioning workspace
//!
//! Shared fixtures: schemas, an engine on an in-memory store with a manual
//! clock, and seeded templates and records.

#![allow(missing_docs)]

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tmpl_engine::{EngineConfig, ManualClock, TemplateEngine};
use tmpl_schema::FieldSchema;
use tmpl_store::{ActivityRecord, MemoryStore, Template, TemplateContent};

pub type TestEngine = TemplateEngine<MemoryStore, Arc<ManualClock>>;

/// `[{id: "title", kind: short-text, required}]`
pub fn title_fields() -> Vec<FieldSchema> {
    vec![FieldSchema::short_text("title").required()]
}

/// `title` renamed to `heading`
pub fn heading_fields() -> Vec<FieldSchema> {
    vec![FieldSchema::short_text("heading").required()]
}

pub fn content_with(fields: Vec<FieldSchema>, sample: Value) -> TemplateContent {
    TemplateContent::new(fields)
        .with_render_implementation("<section>{data}</section>")
        .with_sample_data(sample)
}

pub fn title_content() -> TemplateContent {
    content_with(title_fields(), json!({"title": "Sample"}))
}

pub fn heading_content() -> TemplateContent {
    content_with(heading_fields(), json!({"heading": "Sample"}))
}

/// Lesson schema with a nested step list
pub fn lesson_fields() -> Vec<FieldSchema> {
    vec![
        FieldSchema::short_text("title").required().with_label("Title"),
        FieldSchema::choice("level", ["beginner", "advanced"]),
        FieldSchema::nested_list(
            "steps",
            vec![
                FieldSchema::short_text("text").required(),
                FieldSchema::number("minutes").with_range(Some(0.0), Some(120.0)),
            ],
        ),
    ]
}

pub fn test_config() -> EngineConfig {
    let config = EngineConfig::default();
    let sandbox = config.sandbox.with_timeout_ms(1_000);
    config.with_sandbox(sandbox)
}

pub fn setup_test_engine() -> (TestEngine, Arc<ManualClock>) {
    setup_test_engine_with(test_config())
}

pub fn setup_test_engine_with(config: EngineConfig) -> (TestEngine, Arc<ManualClock>) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let engine = TemplateEngine::with_clock(MemoryStore::new(), config, Arc::clone(&clock));
    (engine, clock)
}

/// Template with `title_fields` and one record `{title: "Hi"}`, read for editing
pub fn seed_title_template(engine: &TestEngine, clock: &ManualClock) -> (Template, ActivityRecord) {
    let template = engine.create_template("Card", title_content()).unwrap();
    let record = engine
        .create_record(template.id, "Welcome card", Some("home/hero".to_string()), &json!({"title": "Hi"}))
        .unwrap();
    clock.advance(Duration::seconds(1));
    let template = engine.read_template_for_editing(template.id).unwrap();
    (template, record)
}

/// Read, advance the clock, and return the fresh template
pub fn reread(engine: &TestEngine, clock: &ManualClock, template: &Template) -> Template {
    clock.advance(Duration::seconds(1));
    engine.read_template_for_editing(template.id).unwrap()
}
