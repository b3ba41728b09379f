//! Installed serial numbers and their addresses.
//!
//! Keeps each Serial No's formatted installation address in sync with its
//! delivery note, maintains the serial card history, and answers the
//! address and item lookups used when scheduling visits.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use tracing::{debug, info, instrument};

use crate::address::{format_address, PostalAddress};
use crate::error::{Result, StoreError};
use crate::store::{DocType, Document, DocumentStore, Query};

const HISTORY_FIELD: &str = "custom_serial_card_history";

/// Formatted address of an Address document, if it exists.
fn formatted_address(store: &dyn DocumentStore, name: &str) -> Result<Option<String>> {
    let address = match store.get(DocType::Address, name) {
        Ok(address) => address,
        Err(StoreError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(format_address(&PostalAddress::from_document(&address)?)))
}

/// Copy each delivered serial's shipping address onto the serial.
///
/// Returns how many serials were updated. Serials whose delivery note or
/// address is missing are left alone.
#[instrument(skip(store))]
pub fn refresh_installation_addresses(store: &dyn DocumentStore) -> Result<usize> {
    let serials = store.list(
        DocType::SerialNo,
        &Query::new().is_set("delivery_document_no"),
    )?;

    let mut updated = 0;
    for mut serial in serials {
        let Some(note_name) = serial.str("delivery_document_no").map(str::to_owned) else {
            continue;
        };
        let address_name = match store.get(DocType::DeliveryNote, &note_name) {
            Ok(note) => note.str("shipping_address_name").map(str::to_owned),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let Some(address_name) = address_name else {
            debug!(serial = %serial.name, "No shipping address");
            continue;
        };
        let Some(formatted) = formatted_address(store, &address_name)? else {
            continue;
        };

        serial.set("custom_item_current_installation_address", formatted);
        serial.set("custom_item_current_installation_address_name", address_name);
        store.update(&serial)?;
        updated += 1;
    }

    info!(updated, "Installation addresses refreshed");
    Ok(updated)
}

/// Give every serial without history its first history row.
#[instrument(skip(store))]
pub fn populate_serial_card_history(store: &dyn DocumentStore) -> Result<usize> {
    let serials = store.list(DocType::SerialNo, &Query::new())?;

    let mut created = 0;
    for serial in serials {
        let existing = store.first(
            DocType::SerialCardHistory,
            Query::new()
                .eq("parent", serial.name.as_str())
                .eq("parentfield", HISTORY_FIELD)
                .eq("parenttype", DocType::SerialNo.to_string()),
        )?;
        if existing.is_some() {
            continue;
        }

        store.insert(
            Document::new(DocType::SerialCardHistory)
                .with("parent", serial.name.as_str())
                .with("parentfield", HISTORY_FIELD)
                .with("parenttype", DocType::SerialNo.to_string())
                .with("customer", serial.get("customer").cloned().unwrap_or(Value::Null))
                .with(
                    "address",
                    serial
                        .get("custom_item_current_installation_address_name")
                        .cloned()
                        .unwrap_or(Value::Null),
                )
                .with("serial_no", serial.name.as_str()),
        )?;
        created += 1;
    }

    info!(created, "Serial card history populated");
    Ok(created)
}

/// Delete every serial card history row.
#[instrument(skip(store))]
pub fn clear_serial_card_history(store: &dyn DocumentStore) -> Result<usize> {
    let deleted = store.delete_all(DocType::SerialCardHistory)?;
    info!(deleted, "Serial card history cleared");
    Ok(deleted)
}

fn links_to_customer(address: &Document, customer: &str) -> bool {
    address.rows("links").iter().any(|link| {
        link.get("link_doctype").and_then(Value::as_str) == Some("Customer")
            && link.get("link_name").and_then(Value::as_str) == Some(customer)
    })
}

/// Fields of a customer's address records.
const ADDRESS_RECORD_FIELDS: &[&str] = &[
    "address_line1",
    "address_line2",
    "ward_name",
    "district",
    "town",
    "province",
    "country",
    "phone",
];

/// Address records linked to a customer, with their names.
#[instrument(skip(store))]
pub fn customer_address_records(
    store: &dyn DocumentStore,
    customer: &str,
) -> Result<Vec<Map<String, Value>>> {
    Ok(store
        .list(DocType::Address, &Query::new())?
        .iter()
        .filter(|address| links_to_customer(address, customer))
        .map(|address| {
            let mut record = Map::new();
            record.insert("name".to_string(), Value::from(address.name.as_str()));
            record.extend(project(address, ADDRESS_RECORD_FIELDS));
            record
        })
        .collect())
}

/// Formatted addresses linked to a customer.
#[instrument(skip(store))]
pub fn customer_addresses(store: &dyn DocumentStore, customer: &str) -> Result<Vec<String>> {
    store
        .list(DocType::Address, &Query::new())?
        .iter()
        .filter(|address| links_to_customer(address, customer))
        .map(|address| -> Result<String> {
            Ok(format_address(&PostalAddress::from_document(address)?))
        })
        .collect()
}

/// A serial installed at an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledSerial {
    pub item_code: String,
    pub item_name: String,
    /// Serial number.
    pub name: String,
}

/// Every serial installed at a formatted address, flagged or not.
#[instrument(skip(store, address))]
pub fn serials_at_address(
    store: &dyn DocumentStore,
    address: &str,
) -> Result<Vec<InstalledSerial>> {
    let serials = store.list(
        DocType::SerialNo,
        &Query::new().eq("custom_item_current_installation_address", address),
    )?;
    Ok(serials
        .into_iter()
        .map(|serial| InstalledSerial {
            item_code: serial.str("item_code").unwrap_or_default().to_string(),
            item_name: serial.str("item_name").unwrap_or_default().to_string(),
            name: serial.name,
        })
        .collect())
}

/// The full Item document.
pub fn item(store: &dyn DocumentStore, name: &str) -> Result<Document> {
    Ok(store.get(DocType::Item, name)?)
}

/// Item code of a visit's item line, if set.
pub fn visit_purpose_item_code(store: &dyn DocumentStore, purpose: &str) -> Result<Option<String>> {
    let row = store.get(DocType::MaintenanceVisitPurpose, purpose)?;
    Ok(row.str("item_code").map(str::to_owned))
}

/// A flagged item installed at an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationItem {
    pub item_code: String,
    /// `<b>{item name}</b> | {serial no}`
    pub label: String,
}

fn is_flagged(item: &Document) -> bool {
    match item.get("custom_flag") {
        Some(Value::String(flag)) => flag == "1",
        Some(Value::Number(flag)) => flag.as_i64() == Some(1),
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    }
}

/// Serials installed at a formatted address whose item is flagged.
#[instrument(skip(store, address))]
pub fn installation_items(
    store: &dyn DocumentStore,
    address: &str,
) -> Result<Vec<InstallationItem>> {
    if address.is_empty() {
        return Ok(Vec::new());
    }

    let serials = store.list(
        DocType::SerialNo,
        &Query::new().eq("custom_item_current_installation_address", address),
    )?;

    let mut items = Vec::new();
    for serial in serials {
        let Some(item_code) = serial.str("item_code") else {
            continue;
        };
        let flagged = match store.get(DocType::Item, item_code) {
            Ok(item) => is_flagged(&item),
            Err(StoreError::NotFound { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        if flagged {
            items.push(InstallationItem {
                item_code: item_code.to_string(),
                label: format!(
                    "<b>{}</b> | {}",
                    serial.str("item_name").unwrap_or_default(),
                    serial.name
                ),
            });
        }
    }
    Ok(items)
}

/// Child tables of an Item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ItemTable {
    /// Maintenance instructions.
    Maintenance,
    /// Headings and contents of the maintenance instructions.
    SiteSurvey,
    /// Known symptoms and their resolutions.
    Symptoms,
    /// Spare parts.
    SpareParts,
}

impl ItemTable {
    fn doctype(self) -> DocType {
        match self {
            ItemTable::Maintenance | ItemTable::SiteSurvey => DocType::ItemMaintenance,
            ItemTable::Symptoms => DocType::SymptomResolution,
            ItemTable::SpareParts => DocType::SparePart,
        }
    }

    fn fields(self) -> &'static [&'static str] {
        match self {
            ItemTable::Maintenance => &["heading", "content", "periodicity"],
            ItemTable::SiteSurvey => &["heading", "content"],
            ItemTable::Symptoms => &["symptom_code", "resolution", "attach_image"],
            ItemTable::SpareParts => &[
                "item_code",
                "description",
                "rate",
                "rate_eur",
                "periodicity",
                "frequency_in_years",
                "uom",
            ],
        }
    }
}

/// Rows of one of an item's child tables, reduced to that table's fields.
#[instrument(skip(store))]
pub fn item_table(
    store: &dyn DocumentStore,
    item: &str,
    table: ItemTable,
) -> Result<Vec<Map<String, Value>>> {
    let rows = store.list(table.doctype(), &Query::new().eq("parent", item))?;
    Ok(rows.iter().map(|row| project(row, table.fields())).collect())
}

/// The named fields of a document, null when absent.
fn project(doc: &Document, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            (
                field.to_string(),
                doc.get(field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}
