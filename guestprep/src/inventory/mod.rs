//! Installed-software inventory of a guest.

use crate::family::FamilyKind;
use chrono::{DateTime, Utc};
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Ordered list of installed packages, as reported by the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub family: FamilyKind,
    pub generated_at: DateTime<Utc>,
    pub packages: Vec<String>,
}

/// Output encodings for an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InventoryFormat {
    #[default]
    Xml,
    Json,
}

impl InventoryDocument {
    /// One package per non-blank line of `listing`, in order.
    pub fn from_listing(listing: &str, family: FamilyKind, description: Option<String>) -> Self {
        let packages = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            description,
            family,
            generated_at: Utc::now(),
            packages,
        }
    }

    pub fn render(&self, format: InventoryFormat) -> GuestprepResult<String> {
        match format {
            InventoryFormat::Xml => self.to_xml(),
            InventoryFormat::Json => self.to_json(),
        }
    }

    pub fn to_json(&self) -> GuestprepResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// ```xml
    /// <?xml version="1.0" encoding="UTF-8"?>
    /// <inventory family="suse" generated_at="2026-01-01T00:00:00+00:00">
    ///   <description>web server</description>
    ///   <packages>
    ///     <package name="bash-3.2-147.3"/>
    ///   </packages>
    /// </inventory>
    /// ```
    pub fn to_xml(&self) -> GuestprepResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        let generated_at = self.generated_at.to_rfc3339();

        let mut root = BytesStart::new("inventory");
        root.push_attribute(("family", self.family.as_str()));
        root.push_attribute(("generated_at", generated_at.as_str()));

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write(&mut writer, Event::Start(root))?;

        if let Some(description) = &self.description {
            write(&mut writer, Event::Start(BytesStart::new("description")))?;
            write(&mut writer, Event::Text(BytesText::new(description)))?;
            write(&mut writer, Event::End(BytesEnd::new("description")))?;
        }

        write(&mut writer, Event::Start(BytesStart::new("packages")))?;
        for package in &self.packages {
            let mut element = BytesStart::new("package");
            element.push_attribute(("name", package.as_str()));
            write(&mut writer, Event::Empty(element))?;
        }
        write(&mut writer, Event::End(BytesEnd::new("packages")))?;
        write(&mut writer, Event::End(BytesEnd::new("inventory")))?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| GuestprepError::Internal(format!("inventory XML is not UTF-8: {}", e)))
    }
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> GuestprepResult<()> {
    writer
        .write_event(event)
        .map_err(|e| GuestprepError::Internal(format!("Failed to write inventory XML: {}", e)))
}
