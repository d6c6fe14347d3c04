//! EWS SOAP envelopes and response parsing.

use super::version::ExchangeVersion;
use crate::calendar::models::Event;
use crate::error::{
    auth_error, not_found_error, transient_error, CalendarResult,
};
use chrono::{DateTime, Duration, Utc};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use tracing::warn;

/// Days of history a calendar view covers. Servers reject views spanning
/// more than two years.
pub const VIEW_PAST_DAYS: i64 = 365;
/// Days ahead a calendar view covers
pub const VIEW_FUTURE_DAYS: i64 = 364;

/// One calendar item as returned by FindItem
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
    /// Plain-text body. FindItem never returns it, see [`get_item_bodies`].
    pub body: String,
}

/// Calendar view window around `now`
pub fn view_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - Duration::days(VIEW_PAST_DAYS),
        now + Duration::days(VIEW_FUTURE_DAYS),
    )
}

fn ews_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn envelope(version: ExchangeVersion, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
               xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types"
               xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages">
  <soap:Header>
    <t:RequestServerVersion Version="{}"/>
  </soap:Header>
  <soap:Body>
{}
  </soap:Body>
</soap:Envelope>"#,
        version.schema_name(),
        body
    )
}

pub fn find_items(version: ExchangeVersion, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    envelope(
        version,
        &format!(
            r#"    <m:FindItem Traversal="Shallow">
      <m:ItemShape>
        <t:BaseShape>Default</t:BaseShape>
        <t:AdditionalProperties>
          <t:FieldURI FieldURI="calendar:Location"/>
        </t:AdditionalProperties>
      </m:ItemShape>
      <m:CalendarView StartDate="{}" EndDate="{}"/>
      <m:ParentFolderIds>
        <t:DistinguishedFolderId Id="calendar"/>
      </m:ParentFolderIds>
    </m:FindItem>"#,
            ews_time(&start),
            ews_time(&end)
        ),
    )
}

/// GetItem request for the text bodies of `ids`
pub fn get_item_bodies(version: ExchangeVersion, ids: &[String]) -> String {
    let item_ids: String = ids
        .iter()
        .map(|id| format!("        <t:ItemId Id=\"{}\"/>\n", xml_escape(id)))
        .collect();
    envelope(
        version,
        &format!(
            r#"    <m:GetItem>
      <m:ItemShape>
        <t:BaseShape>IdOnly</t:BaseShape>
        <t:BodyType>Text</t:BodyType>
        <t:AdditionalProperties>
          <t:FieldURI FieldURI="item:Body"/>
        </t:AdditionalProperties>
      </m:ItemShape>
      <m:ItemIds>
{}      </m:ItemIds>
    </m:GetItem>"#,
            item_ids
        ),
    )
}

pub fn create_item(version: ExchangeVersion, event: &Event) -> String {
    envelope(
        version,
        &format!(
            r#"    <m:CreateItem SendMeetingInvitations="SendToNone">
      <m:Items>
        <t:CalendarItem>
          <t:Subject>{}</t:Subject>
          <t:Body BodyType="Text">{}</t:Body>
          <t:Start>{}</t:Start>
          <t:End>{}</t:End>
          <t:Location>{}</t:Location>
        </t:CalendarItem>
      </m:Items>
    </m:CreateItem>"#,
            xml_escape(event.title()),
            xml_escape(event.description()),
            ews_time(&event.start()),
            ews_time(&event.end()),
            xml_escape(event.location())
        ),
    )
}

pub fn delete_item(version: ExchangeVersion, item_id: &str) -> String {
    envelope(
        version,
        &format!(
            r#"    <m:DeleteItem DeleteType="HardDelete" SendMeetingCancellations="SendToNone" AffectedTaskOccurrences="SpecifiedOccurrenceOnly">
      <m:ItemIds>
        <t:ItemId Id="{}"/>
      </m:ItemIds>
    </m:DeleteItem>"#,
            xml_escape(item_id)
        ),
    )
}

/// XML-escape special characters for safe XML output
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
}

fn check_fault(doc: &Document) -> CalendarResult<()> {
    match doc
        .root_element()
        .descendants()
        .find(|n| n.tag_name().name() == "Fault")
    {
        Some(fault) => {
            let reason = child_text(fault, "faultstring").unwrap_or("unknown fault");
            Err(transient_error(&format!("SOAP fault: {}", reason)))
        }
        None => Ok(()),
    }
}

/// `(ResponseCode, MessageText)` of every failed response message
fn error_messages(doc: &Document) -> Vec<(String, String)> {
    doc.root_element()
        .descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name().ends_with("ResponseMessage")
                && n.attribute("ResponseClass") == Some("Error")
        })
        .map(|message| {
            (
                child_text(message, "ResponseCode").unwrap_or("ErrorUnknown").to_string(),
                child_text(message, "MessageText").unwrap_or_default().to_string(),
            )
        })
        .collect()
}

/// Turn SOAP faults and error response messages into errors
fn check(doc: &Document) -> CalendarResult<()> {
    check_fault(doc)?;

    if let Some((code, text)) = error_messages(doc).into_iter().next() {
        let detail = format!("{}: {}", code, text);
        return Err(match code.as_str() {
            "ErrorItemNotFound" => not_found_error(&detail),
            "ErrorAccessDenied" => auth_error(&detail),
            _ => transient_error(&detail),
        });
    }

    Ok(())
}

fn item_id<'a>(item: Node<'a, '_>) -> Option<&'a str> {
    item.children()
        .find(|n| n.tag_name().name() == "ItemId")
        .and_then(|n| n.attribute("Id"))
}

fn parse_instant(value: &str) -> CalendarResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| transient_error(&format!("Invalid EWS timestamp '{}': {}", value, e)))
}

pub fn parse_find_items(body: &str) -> CalendarResult<Vec<Appointment>> {
    let doc = Document::parse(body)?;
    check(&doc)?;

    let mut appointments = Vec::new();
    for item in doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "CalendarItem")
    {
        let Some(id) = item_id(item) else {
            continue;
        };
        let (Some(start), Some(end)) = (child_text(item, "Start"), child_text(item, "End")) else {
            continue;
        };

        appointments.push(Appointment {
            id: id.to_string(),
            subject: child_text(item, "Subject").unwrap_or_default().to_string(),
            start: parse_instant(start)?,
            end: parse_instant(end)?,
            location: child_text(item, "Location").unwrap_or_default().to_string(),
            body: child_text(item, "Body").unwrap_or_default().to_string(),
        });
    }
    Ok(appointments)
}

/// Bodies by item id. Items that vanished since FindItem are skipped.
pub fn parse_item_bodies(body: &str) -> CalendarResult<HashMap<String, String>> {
    let doc = Document::parse(body)?;
    check_fault(&doc)?;

    for (code, text) in error_messages(&doc) {
        warn!("GetItem skipped an item: {}: {}", code, text);
    }

    Ok(doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "CalendarItem")
        .filter_map(|item| {
            let id = item_id(item)?;
            Some((id.to_string(), child_text(item, "Body").unwrap_or_default().to_string()))
        })
        .collect())
}

/// Id of the item a CreateItem call produced
pub fn parse_created_id(body: &str) -> CalendarResult<String> {
    let doc = Document::parse(body)?;
    check(&doc)?;

    doc.root_element()
        .descendants()
        .find(|n| n.tag_name().name() == "ItemId")
        .and_then(|n| n.attribute("Id"))
        .map(str::to_string)
        .ok_or_else(|| transient_error("CreateItem response carried no ItemId"))
}

pub fn parse_delete(body: &str) -> CalendarResult<()> {
    let doc = Document::parse(body)?;
    check(&doc)
}
