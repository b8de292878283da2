//! 报表模板集成测试
//!
//! 覆盖转换管道从模板加载到逐行输出的完整流程。

use rule_engine::{
    error_row, validate_transform_document, ConfigurationBundle, ConfigurationStore,
    EvaluationMode, JsonRecord, ReportTemplate, RuleError,
};
use serde_json::json;

fn contact() -> JsonRecord {
    JsonRecord::new(json!({
        "id": 301,
        "first_name": "  john  ",
        "last_name": "Doe",
        "email": "JOHN@Example.COM",
        "amount": 1234.5678,
        "status": "0.256",
        "message": "x".repeat(100),
        "confirmed_at": "31.12.2023",
        "created_at": "2024-01-15T10:00:00Z",
        "organization": {"name": "Acme GmbH", "city": "Berlin"},
        "address": null
    }))
}

fn template(columns: serde_json::Value) -> ReportTemplate {
    ReportTemplate::new("export").with_transform(json!({ "columns": columns }).to_string())
}

fn cell(template: &ReportTemplate, label: &str) -> String {
    template
        .build_row(&contact())
        .into_iter()
        .find(|(l, _)| l == label)
        .map(|(_, v)| v)
        .unwrap()
}

#[test]
fn test_full_row_in_column_order() {
    let template = template(json!([
        {"source": "first_name", "transformations": ["upcase", "strip"], "output": "First"},
        {"source": "last_name", "transformations": ["downcase"], "output": "Last"},
        {"source": "email", "transformations": ["downcase"], "output": "Email"},
        {"source": "organization.name", "output": "Company"},
        {"source": "amount", "format": "currency", "output": "Amount"}
    ]));

    assert_eq!(
        template.build_row(&contact()),
        vec![
            ("First".to_string(), "JOHN".to_string()),
            ("Last".to_string(), "doe".to_string()),
            ("Email".to_string(), "john@example.com".to_string()),
            ("Company".to_string(), "Acme GmbH".to_string()),
            ("Amount".to_string(), "1234.57".to_string()),
        ]
    );
    assert_eq!(
        template.header(),
        vec!["First", "Last", "Email", "Company", "Amount"]
    );
}

#[test]
fn test_truncate_caps_long_values() {
    let template = template(json!([
        {"source": "message", "transformations": ["truncate"], "output": "Message"}
    ]));

    let value = cell(&template, "Message");
    assert!(value.chars().count() <= 53);
    assert!(value.ends_with("..."));
}

#[test]
fn test_first_last_and_to_i() {
    let template = template(json!([
        {"source": "last_name", "transformations": ["first"], "output": "Initial"},
        {"source": "last_name", "transformations": ["last"], "output": "Final"},
        {"source": "amount", "transformations": ["to_i"], "output": "Whole"},
        {"source": "amount", "transformations": ["to_s"], "output": "Raw"}
    ]));

    let row = template.build_row(&contact());
    assert_eq!(row[0].1, "D");
    assert_eq!(row[1].1, "e");
    assert_eq!(row[2].1, "1234");
    assert_eq!(row[3].1, "1234.5678");
}

#[test]
fn test_formats() {
    let template = template(json!([
        {"source": "amount", "format": "integer", "output": "Integer"},
        {"source": "status", "format": "percentage", "output": "Percent"},
        {"source": "created_at", "format": "date", "output": "Created"},
        {"source": "confirmed_at", "format": "date", "output": "Confirmed"},
        {"source": "last_name", "format": "date", "output": "NotADate"},
        {"source": "last_name", "format": "currency", "output": "NotANumber"}
    ]));

    assert_eq!(cell(&template, "Integer"), "1234");
    assert_eq!(cell(&template, "Percent"), "25.6%");
    assert_eq!(cell(&template, "Created"), "2024-01-15");
    assert_eq!(cell(&template, "Confirmed"), "2023-12-31");
    assert_eq!(cell(&template, "NotADate"), "Doe");
    assert_eq!(cell(&template, "NotANumber"), "Doe");
}

#[test]
fn test_missing_source_is_column_local() {
    let template = template(json!([
        {"source": "email", "transformations": ["downcase"], "output": "Email"},
        {"source": "phone", "output": "Phone"},
        {"source": "address.city", "output": "City"},
        {"source": "organization.city", "output": "OrgCity"}
    ]));

    assert_eq!(
        template.build_row(&contact()),
        vec![
            ("Email".to_string(), "john@example.com".to_string()),
            ("Phone".to_string(), String::new()),
            ("City".to_string(), String::new()),
            ("OrgCity".to_string(), "Berlin".to_string()),
        ]
    );
}

#[test]
fn test_malformed_document_yields_sentinel_row() {
    for document in ["{\"columns\": [", "[]", r#"{"cols": []}"#] {
        let template = ReportTemplate::new("broken").with_transform(document);
        assert_eq!(template.build_row(&contact()), error_row());
    }
}

#[test]
fn test_unknown_transformation_is_skipped() {
    let template = template(json!([
        {"source": "last_name", "transformations": ["reverse", "upcase"], "output": "Last"}
    ]));
    assert_eq!(cell(&template, "Last"), "DOE");
}

#[test]
fn test_validation_rejects_unsafe_documents() {
    let errors = validate_transform_document(Some(
        &json!({
            "columns": [
                {"source": "organization.owner.password", "output": "Deep"},
                {"source": "email", "transformations": ["instance_eval"], "output": "E"}
            ]
        })
        .to_string(),
    ));
    assert_eq!(errors.len(), 2);

    let store = ConfigurationStore::new();
    let result = store.load_template(
        ReportTemplate::new("bad").with_transform(r#"{"columns": [{"source": "email"}]}"#),
    );
    assert!(matches!(result, Err(RuleError::ConfigurationInvalid(_))));
}

#[test]
fn test_legacy_template() {
    let template = ReportTemplate::new("legacy")
        .with_proc_code(r#"[["Name", record.last_name], ["Company", record.organization.name]]"#);

    assert_eq!(template.mode(), EvaluationMode::Legacy);
    assert_eq!(
        template.build_row(&contact()),
        vec![
            ("Name".to_string(), "Doe".to_string()),
            ("Company".to_string(), "Acme GmbH".to_string()),
        ]
    );

    let broken = ReportTemplate::new("legacy").with_proc_code("record.last_name +");
    assert_eq!(broken.build_row(&contact()), error_row());
}

#[test]
fn test_bundle_through_store() {
    let bundle: ConfigurationBundle = serde_json::from_value(json!({
        "templates": [
            {
                "id": "t-001",
                "name": "contacts",
                "column_width": 30,
                "transform_json": json!({
                    "columns": [{"source": "email", "transformations": ["downcase"], "output": "Email"}]
                }).to_string()
            },
            {"id": "t-002", "name": "too wide", "column_width": 5000}
        ]
    }))
    .unwrap();

    let store = ConfigurationStore::new();
    let errors = store.load_bundle(bundle);

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "t-002");
    assert_eq!(
        store.build_row("t-001", &contact()).unwrap(),
        vec![("Email".to_string(), "john@example.com".to_string())]
    );
}

#[test]
fn test_repeated_rows_are_identical() {
    let template = template(json!([
        {"source": "first_name", "transformations": ["strip", "upcase"], "output": "First"}
    ]));

    let first = template.build_row(&contact());
    for _ in 0..10 {
        assert_eq!(template.build_row(&contact()), first);
    }
}

#[test]
fn test_date_format_keeps_written_offset() {
    let record = JsonRecord::new(json!({"id": 302, "created_at": "2024-01-15T01:00:00+02:00"}));
    let template = template(json!([
        {"source": "created_at", "output": "Raw"},
        {"source": "created_at", "format": "date", "output": "Day"}
    ]));

    assert_eq!(
        template.build_row(&record),
        vec![
            ("Raw".to_string(), "2024-01-15T01:00:00+02:00".to_string()),
            ("Day".to_string(), "2024-01-15".to_string()),
        ]
    );
}
