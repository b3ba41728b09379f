//! Generic documents and list queries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::duration::parse_timestamp;

/// Kinds of document the service reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum DocType {
    /// Platform user; holds API credentials.
    #[strum(serialize = "User")]
    #[serde(rename = "User")]
    User,
    /// A scheduled visit to a customer site.
    #[strum(serialize = "Maintenance Visit")]
    #[serde(rename = "Maintenance Visit")]
    MaintenanceVisit,
    /// Item line on a visit.
    #[strum(serialize = "Maintenance Visit Purpose")]
    #[serde(rename = "Maintenance Visit Purpose")]
    MaintenanceVisitPurpose,
    /// A technician leaving for a visit.
    #[strum(serialize = "Visit Start Maintenance")]
    #[serde(rename = "Visit Start Maintenance")]
    VisitStart,
    /// Planned slot for a technician on a visit.
    #[strum(serialize = "Assigned Tasks")]
    #[serde(rename = "Assigned Tasks")]
    AssignedTask,
    /// On-site work interval.
    #[strum(serialize = "Punch In Punch Out")]
    #[serde(rename = "Punch In Punch Out")]
    Punch,
    /// Installed unit, with its current installation address.
    #[strum(serialize = "Serial No")]
    #[serde(rename = "Serial No")]
    SerialNo,
    /// Postal address with optional geolocation.
    #[strum(serialize = "Address")]
    #[serde(rename = "Address")]
    Address,
    /// Delivery of units to a shipping address.
    #[strum(serialize = "Delivery Note")]
    #[serde(rename = "Delivery Note")]
    DeliveryNote,
    /// Spare part to collect for a visit.
    #[strum(serialize = "Spare Items")]
    #[serde(rename = "Spare Items")]
    SpareItem,
    /// Checklist line on a visit.
    #[strum(serialize = "Maintenance Visit Checklist")]
    #[serde(rename = "Maintenance Visit Checklist")]
    Checklist,
    /// Technician position report.
    #[strum(serialize = "Live Location")]
    #[serde(rename = "Live Location")]
    LiveLocation,
    /// Uploaded file metadata.
    #[strum(serialize = "File")]
    #[serde(rename = "File")]
    File,
    /// Image attached to a visit.
    #[strum(serialize = "Attachments")]
    #[serde(rename = "Attachments")]
    Attachment,
    /// Symptom reported by a technician.
    #[strum(serialize = "Symptoms Requests")]
    #[serde(rename = "Symptoms Requests")]
    SymptomRequest,
    /// Request to move a visit.
    #[strum(serialize = "Reschedule Requests")]
    #[serde(rename = "Reschedule Requests")]
    RescheduleRequest,
    /// Ownership/location history of a serial number.
    #[strum(serialize = "Serial Card History")]
    #[serde(rename = "Serial Card History")]
    SerialCardHistory,
    /// Product master.
    #[strum(serialize = "Item")]
    #[serde(rename = "Item")]
    Item,
    /// Maintenance instructions for an item.
    #[strum(serialize = "Item Maintenance Table")]
    #[serde(rename = "Item Maintenance Table")]
    ItemMaintenance,
    /// Known symptoms and resolutions for an item.
    #[strum(serialize = "Symptom Resolution Table")]
    #[serde(rename = "Symptom Resolution Table")]
    SymptomResolution,
    /// Spare parts listed for an item.
    #[strum(serialize = "Spare Part")]
    #[serde(rename = "Spare Part")]
    SparePart,
}

/// A stored record: a kind, a unique name and free-form fields.
///
/// Child-table rows stored inline are JSON arrays of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document kind.
    pub doctype: DocType,
    /// Unique name within the doctype. Empty until inserted.
    #[serde(default)]
    pub name: String,
    /// All other fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// New unnamed document; the store assigns a name on insert.
    pub fn new(doctype: DocType) -> Self {
        Self {
            doctype,
            name: String::new(),
            fields: Map::new(),
        }
    }

    /// New document with a fixed name.
    pub fn named(doctype: DocType, name: impl Into<String>) -> Self {
        Self {
            doctype,
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Raw field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field as a non-empty string.
    pub fn str(&self, field: &str) -> Option<&str> {
        if field == "name" {
            return Some(self.name.as_str()).filter(|s| !s.is_empty());
        }
        self.get(field)?.as_str().filter(|s| !s.is_empty())
    }

    /// Whether a field holds something other than null or an empty string.
    pub fn is_set(&self, field: &str) -> bool {
        if field == "name" {
            return !self.name.is_empty();
        }
        self.get(field).is_some_and(is_set_value)
    }

    /// Child-table rows stored under `field`.
    pub fn rows(&self, field: &str) -> &[Value] {
        self.get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Flatten into a JSON object including `doctype` and `name`.
    pub fn to_value(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + 2);
        out.insert("name".to_string(), Value::String(self.name.clone()));
        out.insert("doctype".to_string(), Value::String(self.doctype.to_string()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }

    fn field_for_query(&self, field: &str) -> Option<Value> {
        if field == "name" {
            return Some(Value::String(self.name.clone()));
        }
        self.fields.get(field).cloned()
    }
}

fn is_set_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// A single field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field is a list (or JSON-encoded list) containing the value, or a
    /// plain string containing it.
    Contains(Value),
    /// Field is present and not empty.
    IsSet,
    /// Field is absent, null or empty.
    NotSet,
    /// Field lies in the inclusive range.
    Between(Value, Value),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => value == Some(expected),
            Condition::Contains(needle) => match (value, needle) {
                (Some(Value::Array(items)), _) => items.contains(needle),
                (Some(Value::String(hay)), _) => match serde_json::from_str::<Vec<Value>>(hay) {
                    Ok(items) => items.contains(needle),
                    Err(_) => needle.as_str().is_some_and(|n| hay.contains(n)),
                },
                _ => false,
            },
            Condition::IsSet => value.is_some_and(is_set_value),
            Condition::NotSet => !value.is_some_and(is_set_value),
            Condition::Between(low, high) => value.is_some_and(|v| {
                is_set_value(v)
                    && compare_values(v, low) != Ordering::Less
                    && compare_values(v, high) != Ordering::Greater
            }),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Smallest first.
    Asc,
    /// Largest first; ties keep the most recently inserted first.
    Desc,
}

/// Filters, one ordering and a limit for [`list`](super::DocumentStore::list).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Conditions, all of which must hold.
    pub filters: Vec<(String, Condition)>,
    /// Sort field and direction.
    pub order_by: Option<(String, Order)>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl Query {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition.
    pub fn filter(mut self, field: &str, condition: Condition) -> Self {
        self.filters.push((field.to_string(), condition));
        self
    }

    /// Field equals value.
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Eq(value.into()))
    }

    /// Field is set.
    pub fn is_set(self, field: &str) -> Self {
        self.filter(field, Condition::IsSet)
    }

    /// Field is not set.
    pub fn not_set(self, field: &str) -> Self {
        self.filter(field, Condition::NotSet)
    }

    /// Sort descending by field.
    pub fn latest_by(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Order::Desc));
        self
    }

    /// Sort ascending by field.
    pub fn oldest_by(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Order::Asc));
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, cond)| cond.matches(doc.field_for_query(field).as_ref()))
    }

    /// Filter, sort and truncate documents given in insertion order.
    pub fn apply<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: DoubleEndedIterator<Item = &'a Document>,
    {
        let mut out: Vec<Document> = match self.order_by {
            Some((_, Order::Desc)) => docs.rev().filter(|d| self.matches(d)).cloned().collect(),
            _ => docs.filter(|d| self.matches(d)).cloned().collect(),
        };

        if let Some((field, order)) = &self.order_by {
            out.sort_by(|a, b| {
                let ord = compare_fields(a.field_for_query(field), b.field_for_query(field));
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn compare_fields(a: Option<Value>, b: Option<Value>) -> Ordering {
    compare_values(a.as_ref().unwrap_or(&Value::Null), b.as_ref().unwrap_or(&Value::Null))
}

/// Total order over JSON values used for sorting and ranges.
///
/// Strings that both parse as timestamps compare chronologically; other
/// strings compare as text and sort before any timestamp. Nulls sort first.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
