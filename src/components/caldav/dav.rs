//! WebDAV request bodies and multistatus parsing.

use crate::error::CalendarResult;

/// calendar-query REPORT asking for every VEVENT in the collection
pub const CALENDAR_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT"/>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#;

/// A fetched calendar resource with its ICS data
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarResource {
    pub href: String,
    pub data: String,
}

impl CalendarResource {
    /// Resource name without the `.ics` suffix, used as the event id
    pub fn name(&self) -> &str {
        let last = self
            .href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        last.strip_suffix(".ics").unwrap_or(last)
    }
}

/// Parse calendar resources from a CalDAV multistatus response
pub fn parse_multistatus(body: &str) -> CalendarResult<Vec<CalendarResource>> {
    let doc = roxmltree::Document::parse(body)?;
    let root = doc.root_element();

    let mut resources = Vec::new();
    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(|s| s.trim().to_string());

        let Some(href) = href else { continue };

        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        // Only include resources that have calendar data
        if let Some(data) = data {
            resources.push(CalendarResource { href, data });
        }
    }

    Ok(resources)
}
