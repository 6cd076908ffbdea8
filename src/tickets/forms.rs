use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::TicketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Select,
    Checkbox,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormField {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            field_type,
            required: true,
            options: Vec::new(),
        }
    }

    pub fn optional(name: &str, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Form definition stored as a JSON array on categories and transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSchema {
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Lenient decode for columns written by hand: anything that is not a
    /// field array reads as an empty form.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!([]))
    }

    /// Checks `input` against every field and reports all violations at once.
    pub fn validate(&self, input: Option<&serde_json::Value>) -> Result<(), TicketError> {
        if self.fields.is_empty() {
            return Ok(());
        }

        let empty = serde_json::Map::new();
        let values = match input {
            Some(serde_json::Value::Object(map)) => map,
            None | Some(serde_json::Value::Null) => &empty,
            Some(_) => {
                return Err(TicketError::Validation(
                    "input must be a JSON object".to_string(),
                ))
            }
        };

        let problems: Vec<String> = self
            .fields
            .iter()
            .filter_map(|field| check_field(field, values.get(&field.name)))
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TicketError::Validation(problems.join("; ")))
        }
    }
}

fn check_field(field: &FormField, value: Option<&serde_json::Value>) -> Option<String> {
    let name = field.display_name();
    let value = match value {
        Some(v) if !is_blank(v) => v,
        _ if field.required => return Some(format!("{name} is required")),
        _ => return None,
    };

    match field.field_type {
        FieldType::Number => {
            let numeric = value.is_number()
                || value
                    .as_str()
                    .map_or(false, |s| s.trim().parse::<f64>().is_ok());
            (!numeric).then(|| format!("{name} must be a number"))
        }
        FieldType::Date => {
            let valid = value
                .as_str()
                .map_or(false, |s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok());
            (!valid).then(|| format!("{name} must be a date (YYYY-MM-DD)"))
        }
        FieldType::Select => {
            let chosen = value.as_str().unwrap_or_default();
            (!field.options.is_empty() && !field.options.iter().any(|o| o == chosen))
                .then(|| format!("{name} must be one of: {}", field.options.join(", ")))
        }
        FieldType::Checkbox => (!value.is_boolean()).then(|| format!("{name} must be true or false")),
        FieldType::Text | FieldType::Textarea | FieldType::File => None,
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diagnosis_form() -> FormSchema {
        FormSchema::new(vec![
            FormField::required("diagnosis", FieldType::Textarea).with_label("Diagnosa"),
            FormField::required("cost", FieldType::Number),
            FormField::optional("finished_on", FieldType::Date),
            FormField::required("result", FieldType::Select).with_options(&["fixed", "replaced"]),
        ])
    }

    #[test]
    fn test_empty_form_accepts_anything() {
        assert!(FormSchema::default().validate(None).is_ok());
        assert!(FormSchema::default().validate(Some(&json!("free text"))).is_ok());
    }

    #[test]
    fn test_valid_input_passes() {
        let input = json!({
            "diagnosis": "PSU rusak",
            "cost": "150000",
            "finished_on": "2026-10-01",
            "result": "replaced"
        });
        assert!(diagnosis_form().validate(Some(&input)).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let input = json!({ "diagnosis": "  ", "cost": "mahal", "finished_on": "01/10/2026", "result": "lost" });
        let err = diagnosis_form().validate(Some(&input)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Diagnosa is required"));
        assert!(message.contains("cost must be a number"));
        assert!(message.contains("finished_on must be a date"));
        assert!(message.contains("result must be one of"));
    }

    #[test]
    fn test_missing_input_fails_required_fields() {
        let err = diagnosis_form().validate(None).unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));
    }

    #[test]
    fn test_schema_decodes_from_stored_json() {
        let stored = json!([
            { "name": "link", "label": "Link Zoom", "type": "text", "required": true }
        ]);
        let schema = FormSchema::from_value(&stored);
        assert_eq!(schema.fields.len(), 1);
        assert!(schema.fields[0].required);
        assert_eq!(schema.to_value(), stored);
        assert!(FormSchema::from_value(&json!({"bogus": true})).is_empty());
    }
}
