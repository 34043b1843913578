//! Enrollment inquiry model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;

/// The tracks offered by the institute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramClass {
    #[serde(rename = "Class 8th-10th Foundation")]
    Foundation,
    #[serde(rename = "Class 11th-12th (Science)")]
    SeniorScience,
    #[serde(rename = "JEE/NEET Repeater")]
    Repeater,
}

impl ProgramClass {
    pub const ALL: [ProgramClass; 3] = [
        ProgramClass::Foundation,
        ProgramClass::SeniorScience,
        ProgramClass::Repeater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramClass::Foundation => "Class 8th-10th Foundation",
            ProgramClass::SeniorScience => "Class 11th-12th (Science)",
            ProgramClass::Repeater => "JEE/NEET Repeater",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// A stored inquiry as seen in collection snapshots.
///
/// Other writers may store anything, so the class is kept as its raw label
/// and missing fields read as empty.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Inquiry {
    pub id: String,
    pub name: String,
    pub class: String,
    pub phone: String,
    pub timestamp: String,
}

impl Inquiry {
    /// Build an inquiry from a stored document. Never rejects a record.
    pub fn from_document(id: &str, data: &Map<String, Value>) -> Self {
        Self {
            id: id.to_string(),
            name: text_field(data, "name"),
            class: text_field(data, "class"),
            phone: text_field(data, "phone"),
            timestamp: text_field(data, "timestamp"),
        }
    }

    /// Creation instant, if the stored timestamp parses.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

fn text_field(data: &Map<String, Value>, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Public inquiry form as submitted by a visitor.
#[derive(Debug, Clone, Deserialize)]
pub struct InquiryForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub phone: String,
}

/// Validated inquiry ready to be written; the store assigns the id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewInquiry {
    pub name: String,
    pub class: ProgramClass,
    pub phone: String,
    pub timestamp: String,
}

impl NewInquiry {
    /// Check required fields and stamp the submission time.
    pub fn from_form(form: &InquiryForm, now: DateTime<Utc>) -> Result<Self, AppError> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        let phone = form.phone.trim();
        if phone.is_empty() {
            return Err(AppError::Validation("Phone is required".to_string()));
        }
        let class = ProgramClass::from_label(form.class.trim())
            .ok_or_else(|| AppError::Validation(format!("Unknown class: {}", form.class)))?;

        Ok(Self {
            name: name.to_string(),
            class,
            phone: phone.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn into_inquiry(self, id: String) -> Inquiry {
        Inquiry {
            id,
            name: self.name,
            class: self.class.as_str().to_string(),
            phone: self.phone,
            timestamp: self.timestamp,
        }
    }
}

/// Most recent first. Unparseable timestamps sink to the end.
pub fn sort_newest_first(inquiries: &mut [Inquiry]) {
    inquiries.sort_by(|a, b| match (a.created_at(), b.created_at()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.timestamp.cmp(&a.timestamp),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form(name: &str, class: &str, phone: &str) -> InquiryForm {
        InquiryForm {
            name: name.to_string(),
            class: class.to_string(),
            phone: phone.to_string(),
        }
    }

    fn inquiry(id: &str, timestamp: &str) -> Inquiry {
        Inquiry {
            id: id.to_string(),
            name: "Asha".to_string(),
            class: "JEE/NEET Repeater".to_string(),
            phone: "99".to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn test_program_labels_round_trip() {
        for class in ProgramClass::ALL {
            assert_eq!(ProgramClass::from_label(class.as_str()), Some(class));
            assert_eq!(
                serde_json::to_value(class).unwrap(),
                Value::String(class.as_str().to_string())
            );
        }
        assert_eq!(ProgramClass::from_label("Class 5th"), None);
    }

    #[test]
    fn test_new_inquiry_stamps_iso_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 4, 2, 10, 30, 0).unwrap();
        let new = NewInquiry::from_form(&form(" Ravi ", "JEE/NEET Repeater", "98765"), now).unwrap();
        assert_eq!(new.name, "Ravi");
        assert_eq!(new.class, ProgramClass::Repeater);
        assert_eq!(new.timestamp, "2025-04-02T10:30:00.000Z");
        assert!(DateTime::parse_from_rfc3339(&new.timestamp).is_ok());
    }

    #[test]
    fn test_new_inquiry_requires_fields() {
        let now = Utc::now();
        assert!(matches!(
            NewInquiry::from_form(&form("", "JEE/NEET Repeater", "1"), now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            NewInquiry::from_form(&form("A", "JEE/NEET Repeater", "   "), now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            NewInquiry::from_form(&form("A", "Dance", "1"), now),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_stored_fields_use_class_key() {
        let new = NewInquiry::from_form(&form("A", "Class 8th-10th Foundation", "1"), Utc::now())
            .unwrap();
        let fields = new.to_fields();
        assert_eq!(fields["class"], "Class 8th-10th Foundation");
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn test_from_document_attaches_id() {
        let mut data = Map::new();
        data.insert("name".into(), "Meera".into());
        data.insert("class".into(), "Class 11th-12th (Science)".into());
        data.insert("phone".into(), "123".into());
        data.insert("timestamp".into(), "2025-01-01T00:00:00.000Z".into());

        let inquiry = Inquiry::from_document("doc-1", &data);
        assert_eq!(inquiry.id, "doc-1");
        assert_eq!(inquiry.class, "Class 11th-12th (Science)");
    }

    #[test]
    fn test_from_document_keeps_irregular_records() {
        let mut data = Map::new();
        data.insert("name".into(), "Walk-in".into());
        data.insert("class".into(), "Crash Course".into());
        data.insert("phone".into(), serde_json::json!(9876543210u64));

        let inquiry = Inquiry::from_document("doc-2", &data);
        assert_eq!(inquiry.class, "Crash Course");
        assert_eq!(inquiry.phone, "9876543210");
        assert_eq!(inquiry.timestamp, "");
        assert!(inquiry.created_at().is_none());
    }

    #[test]
    fn test_sort_newest_first() {
        let mut list = vec![
            inquiry("a", "2025-01-01T00:00:00.000Z"),
            inquiry("b", "2025-03-01T00:00:00.000Z"),
            inquiry("c", "garbage"),
            inquiry("d", "2025-02-01T09:00:00+05:30"),
        ];
        sort_newest_first(&mut list);
        let ids: Vec<_> = list.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }
}
