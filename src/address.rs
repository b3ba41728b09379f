//! Postal address rendering.

use serde::{Deserialize, Deserializer, Serialize};

use crate::store::Document;

/// Marker written after every rendered line.
pub const LINE_BREAK: &str = "<br>";

/// A structured postal address.
///
/// Field names follow the stored Address document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostalAddress {
    /// First address line (required).
    #[serde(rename = "address_line1", default, deserialize_with = "null_as_empty")]
    pub line1: String,
    /// Second address line.
    #[serde(rename = "address_line2", default)]
    pub line2: Option<String>,
    /// Ward.
    #[serde(rename = "ward_name", default)]
    pub ward: Option<String>,
    /// District.
    #[serde(default)]
    pub district: Option<String>,
    /// Town (required).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub town: String,
    /// Province.
    #[serde(default)]
    pub province: Option<String>,
    /// Country (required).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub country: String,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Fax number.
    #[serde(default)]
    pub fax: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl PostalAddress {
    /// Read the address fields out of an Address document.
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Render an address as one string, one field per line.
///
/// Order is fixed. Required fields are always written, optional ones only
/// when non-empty.
pub fn format_address(address: &PostalAddress) -> String {
    let mut out = String::new();

    let mut push = |text: &str| {
        out.push_str(text);
        out.push_str(LINE_BREAK);
    };

    push(&address.line1);
    if let Some(line2) = present(&address.line2) {
        push(line2);
    }
    if let Some(ward) = present(&address.ward) {
        push(ward);
    }
    if let Some(district) = present(&address.district) {
        push(district);
    }
    push(&address.town);
    if let Some(province) = present(&address.province) {
        push(province);
    }
    push(&address.country);
    if let Some(phone) = present(&address.phone) {
        push(&format!("Phone: {phone}"));
    }
    if let Some(fax) = present(&address.fax) {
        push(&format!("Fax: {fax}"));
    }

    out
}
