//! 文档校验
//!
//! 纯函数，返回错误列表（为空表示合法）。保存配置时通过 `validator` 派生调用，
//! 也被 `rule-lint` 用于离线检查。与编译器共用同一份白名单和期望值检查。

use serde_json::Value;

use crate::allowlist::allow_list;
use crate::compiler::{compile_operand, json_text};
use crate::operators::LogicalOperator;
use crate::pipeline::SourcePath;

const INVALID_JSON: &str = "must be valid JSON";

/// 校验规则文档；缺失或空白文档视为合法
pub fn validate_rule_document(json: Option<&str>) -> Vec<String> {
    let document = match parse(json) {
        Ok(Some(document)) => document,
        Ok(None) => return Vec::new(),
        Err(errors) => return errors,
    };

    let mut errors = Vec::new();

    if let Some(logic) = document.get("logic").filter(|l| !l.is_null()) {
        errors.extend(validate_logic(&json_text(logic)));
    }

    let Some(conditions) = document.get("conditions").and_then(Value::as_array) else {
        errors.push("must have a conditions array".to_string());
        return errors;
    };

    for (index, condition) in conditions.iter().enumerate() {
        if !condition.is_object() {
            errors.push(format!("conditions[{}] must be an object", index));
            continue;
        }

        let field = condition.get("field").map(json_text).unwrap_or_default();
        if !allow_list().is_field_allowed(&field) {
            errors.push(format!("field '{}' not allowed", field));
        }

        let operator_name = condition.get("operator").map(json_text).unwrap_or_default();
        match allow_list().operator(&operator_name) {
            Some(operator) => {
                let value = condition.get("value").unwrap_or(&Value::Null);
                if let Err(e) = compile_operand(operator, value) {
                    errors.push(e);
                }
            }
            None => errors.push(format!("operator '{}' not allowed", operator_name)),
        }
    }

    errors
}

/// 校验转换文档；缺失或空白文档视为合法
pub fn validate_transform_document(json: Option<&str>) -> Vec<String> {
    let document = match parse(json) {
        Ok(Some(document)) => document,
        Ok(None) => return Vec::new(),
        Err(errors) => return errors,
    };

    let Some(columns) = document.get("columns").and_then(Value::as_array) else {
        return vec!["must have a columns array".to_string()];
    };

    let mut errors = Vec::new();

    for (index, column) in columns.iter().enumerate() {
        if !column.is_object() {
            errors.push(format!("columns[{}] must be an object", index));
            continue;
        }

        match column.get("source").filter(|s| !s.is_null()) {
            Some(source) => {
                if let Err(e) = SourcePath::parse(&json_text(source)) {
                    errors.push(e);
                }
            }
            None => errors.push(format!("columns[{}] source must not be null", index)),
        }

        if column.get("output").is_none_or(Value::is_null) {
            errors.push(format!("columns[{}] output must not be null", index));
        }

        match column.get("transformations") {
            None | Some(Value::Null) => {}
            Some(Value::Array(names)) => {
                for name in names.iter().map(json_text) {
                    if allow_list().transformation(&name).is_none() {
                        errors.push(format!("transformation '{}' not allowed", name));
                    }
                }
            }
            Some(_) => errors.push(format!("columns[{}] transformations must be an array", index)),
        }

        if let Some(format) = column.get("format").filter(|f| !f.is_null()) {
            let name = json_text(format);
            if allow_list().format(&name).is_none() {
                errors.push(format!("format '{}' not allowed", name));
            }
        }
    }

    errors
}

/// 列级 logic 设置的校验
pub fn validate_logic(logic: &str) -> Vec<String> {
    match LogicalOperator::parse(logic) {
        Some(_) => Vec::new(),
        None => vec![format!("logic '{}' must be AND or OR", logic)],
    }
}

fn parse(json: Option<&str>) -> Result<Option<Value>, Vec<String>> {
    match json.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|_| vec![INVALID_JSON.to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_document_is_valid() {
        assert!(validate_rule_document(None).is_empty());
        assert!(validate_rule_document(Some("  ")).is_empty());
        assert!(validate_transform_document(None).is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert_eq!(validate_rule_document(Some("{oops")), vec![INVALID_JSON]);
        assert_eq!(validate_transform_document(Some("[")), vec![INVALID_JSON]);
    }

    #[test]
    fn test_valid_rule_document() {
        let json = r#"
        {
            "logic": "OR",
            "conditions": [
                {"field": "email", "operator": "matches", "value": "@spam\\.com$"},
                {"field": "postal_code", "operator": "equals", "value": 10115},
                {"field": "email", "operator": "in_list", "value": "DATA_LIST"},
                {"field": "created_at", "operator": "less_than_days_ago", "value": 7}
            ]
        }
        "#;
        assert!(validate_rule_document(Some(json)).is_empty());
    }

    #[test]
    fn test_empty_conditions_is_valid() {
        assert!(validate_rule_document(Some(r#"{"conditions": []}"#)).is_empty());
    }

    #[test]
    fn test_missing_conditions() {
        assert_eq!(
            validate_rule_document(Some(r#"{"logic": "AND"}"#)),
            vec!["must have a conditions array"]
        );
    }

    #[test]
    fn test_disallowed_names() {
        let json = r#"
        {
            "conditions": [
                {"field": "encrypted_password", "operator": "equals", "value": "x"},
                {"field": "email", "operator": "send", "value": "x"}
            ]
        }
        "#;
        assert_eq!(
            validate_rule_document(Some(json)),
            vec![
                "field 'encrypted_password' not allowed",
                "operator 'send' not allowed"
            ]
        );
    }

    #[test]
    fn test_operand_compatibility() {
        let json = r#"
        {
            "logic": "XOR",
            "conditions": [
                {"field": "email", "operator": "matches", "value": "(unclosed"},
                {"field": "amount", "operator": "greater_than", "value": "lots"},
                {"field": "email", "operator": "in_list", "value": "a@b.c"}
            ]
        }
        "#;
        let errors = validate_rule_document(Some(json));

        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0], "logic 'XOR' must be AND or OR");
        assert!(errors[1].starts_with("pattern '(unclosed' is not a valid regex"));
        assert!(errors[2].contains("not numeric"));
        assert_eq!(errors[3], "in_list value must be DATA_LIST");
    }

    #[test]
    fn test_logic_is_case_sensitive() {
        let errors = validate_rule_document(Some(r#"{"logic": "or", "conditions": []}"#));
        assert_eq!(errors, vec!["logic 'or' must be AND or OR"]);
        assert_eq!(validate_logic(" OR "), vec!["logic ' OR ' must be AND or OR"]);
    }

    #[test]
    fn test_valid_transform_document() {
        let json = r#"
        {
            "columns": [
                {"source": "email", "transformations": ["downcase", "strip"], "output": "Email"},
                {"source": "organization.name", "output": "Organization"},
                {"source": "amount", "format": "currency", "output": "Amount"}
            ]
        }
        "#;
        assert!(validate_transform_document(Some(json)).is_empty());
    }

    #[test]
    fn test_invalid_transform_document() {
        assert_eq!(
            validate_transform_document(Some(r#"{"rows": []}"#)),
            vec!["must have a columns array"]
        );

        let json = r#"
        {
            "columns": [
                {"source": null, "output": "A"},
                {"source": "email"},
                {"source": "email", "transformations": ["eval"], "format": "hex", "output": "C"},
                {"source": "organization.owner.email", "output": "D"},
                {"source": "owner.email", "output": "E"}
            ]
        }
        "#;
        assert_eq!(
            validate_transform_document(Some(json)),
            vec![
                "columns[0] source must not be null",
                "columns[1] output must not be null",
                "transformation 'eval' not allowed",
                "format 'hex' not allowed",
                "source 'organization.owner.email' has more than two segments",
                "association 'owner' not allowed",
            ]
        );
    }
}
