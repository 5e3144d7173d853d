//! FlowMonitor trace parsing.
//!
//! The trace is read into memory once and walked as a lazy sequence of
//! `TraceElement`s in document order. Stats flows and classifier flows are
//! then merged on their `flowId` into `FlowRecord`s.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::types::{FlowRecord, UNKNOWN};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::AnalyzerError;
use crate::schema::{LostPacketsSource, TraceSchema};
use crate::utils::units::{normalize_with_bare_unit, split_time_token};

/// Attributes of one flow element, as written in the trace
pub type RawAttributes = BTreeMap<String, String>;

/// A flow element found in the trace
#[derive(Debug, Clone, PartialEq)]
pub enum TraceElement {
    /// Flow inside the stats section (counters and time sums)
    Stats(RawAttributes),
    /// Flow inside a classifier section (addresses and ports)
    Classifier(RawAttributes),
}

/// Lazy walk over the flow elements of a trace document
pub struct TraceElements<'a> {
    reader: Reader<&'a [u8]>,
    schema: &'a TraceSchema,
    stack: Vec<String>,
    saw_root: bool,
    done: bool,
}

impl<'a> TraceElements<'a> {
    pub fn new(content: &'a str, schema: &'a TraceSchema) -> Self {
        Self {
            reader: Reader::from_str(content),
            schema,
            stack: Vec::new(),
            saw_root: false,
            done: false,
        }
    }

    /// Classify an opening tag, returning an element if it is a flow we track
    fn flow_element(&self, start: &BytesStart<'_>) -> Option<Result<TraceElement, String>> {
        if start.name().as_ref() != self.schema.flow_element.as_bytes() {
            return None;
        }
        let parent = self.stack.last()?;
        let is_stats = parent == self.schema.stats_section;
        let is_classifier = self.schema.classifier_sections.contains(&parent.as_str());
        if !is_stats && !is_classifier {
            return None;
        }

        let attributes = match read_attributes(start) {
            Ok(attrs) => attrs,
            Err(e) => return Some(Err(e)),
        };

        Some(Ok(if is_stats {
            TraceElement::Stats(attributes)
        } else {
            TraceElement::Classifier(attributes)
        }))
    }
}

impl Iterator for TraceElements<'_> {
    type Item = Result<TraceElement, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    self.done = true;
                    return Some(Err(format!(
                        "{} (near byte {})",
                        e,
                        self.reader.buffer_position()
                    )));
                }
            };

            match event {
                Event::Start(start) => {
                    let found = self.flow_element(&start);
                    self.saw_root = true;
                    self.stack
                        .push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                    if let Some(item) = found {
                        if item.is_err() {
                            self.done = true;
                        }
                        return Some(item);
                    }
                }
                Event::Empty(start) => {
                    let found = self.flow_element(&start);
                    self.saw_root = true;
                    if let Some(item) = found {
                        if item.is_err() {
                            self.done = true;
                        }
                        return Some(item);
                    }
                }
                Event::End(_) => {
                    self.stack.pop();
                }
                Event::Eof => {
                    self.done = true;
                    if let Some(open) = self.stack.last() {
                        return Some(Err(format!("unexpected end of document inside <{}>", open)));
                    }
                    if !self.saw_root {
                        return Some(Err("document has no root element".to_string()));
                    }
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn read_attributes(start: &BytesStart<'_>) -> Result<RawAttributes, String> {
    let mut attributes = RawAttributes::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("malformed attribute: {}", e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("malformed value for attribute '{}': {}", key, e))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// Flow records extracted from one trace
#[derive(Debug, Clone, Default)]
pub struct ParsedTrace {
    /// Records in document order, not yet classified
    pub records: Vec<FlowRecord>,
    /// Flow elements skipped because they could not be parsed
    pub skipped: usize,
    /// Whether any classifier section was present
    pub has_classifier: bool,
}

/// Parse a trace file
pub fn parse_trace_file(
    path: &Path,
    schema: &TraceSchema,
    run: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<ParsedTrace, AnalyzerError> {
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => AnalyzerError::TraceNotFound {
            run: run.to_string(),
            path: path.to_path_buf(),
        },
        ErrorKind::InvalidData => AnalyzerError::TraceParse {
            run: run.to_string(),
            path: path.to_path_buf(),
            reason: format!("document is not valid UTF-8: {}", source),
        },
        _ => AnalyzerError::Io {
            run: run.to_string(),
            path: path.to_path_buf(),
            source,
        },
    })?;

    parse_trace_str(&content, schema, run, path, diagnostics)
}

/// Parse trace content; `path` is only used in error messages
pub fn parse_trace_str(
    content: &str,
    schema: &TraceSchema,
    run: &str,
    path: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<ParsedTrace, AnalyzerError> {
    let mut stats: Vec<(usize, RawAttributes)> = Vec::new();
    let mut classifier: HashMap<u64, RawAttributes> = HashMap::new();
    let mut has_classifier = false;
    let mut skipped = 0;

    for (ordinal, element) in TraceElements::new(content, schema).enumerate() {
        let element = element.map_err(|reason| AnalyzerError::TraceParse {
            run: run.to_string(),
            path: path.to_path_buf(),
            reason,
        })?;

        match element {
            TraceElement::Stats(attrs) => stats.push((ordinal, attrs)),
            TraceElement::Classifier(attrs) => {
                has_classifier = true;
                match attrs.get("flowId").map(|id| parse_count(id)) {
                    Some(Ok(id)) => {
                        classifier.insert(id, attrs);
                    }
                    _ => diagnostics.emit(Diagnostic::warn(
                        run,
                        format!("classifier entry #{} has no usable flowId, ignored", ordinal),
                    )),
                }
            }
        }
    }

    if !has_classifier {
        diagnostics.emit(Diagnostic::warn(
            run,
            "trace has no classifier section; every flow will be unmatched",
        ));
    }

    let mut records = Vec::with_capacity(stats.len());
    let mut seen_ids = std::collections::HashSet::new();

    for (ordinal, attrs) in stats {
        let mut record = match build_record(&attrs, schema) {
            Ok(record) => record,
            Err(reason) => {
                skipped += 1;
                diagnostics.emit(Diagnostic::warn(
                    run,
                    format!("skipping flow element #{}: {}", ordinal, reason),
                ));
                continue;
            }
        };

        if !seen_ids.insert(record.flow_id) {
            skipped += 1;
            diagnostics.emit(Diagnostic::warn(
                run,
                format!("skipping duplicate flowId {}", record.flow_id),
            ));
            continue;
        }

        if record.counters_inconsistent {
            diagnostics.emit(Diagnostic::warn(
                run,
                format!(
                    "flow {}: inconsistent counters (tx={}, rx={}, lost={})",
                    record.flow_id, record.tx_packets, record.rx_packets, record.lost_packets
                ),
            ));
        }

        match classifier.get(&record.flow_id) {
            Some(class_attrs) => apply_classifier(&mut record, class_attrs, run, diagnostics),
            None if has_classifier => diagnostics.emit(Diagnostic::debug(
                run,
                format!("flow {} has no classifier entry", record.flow_id),
            )),
            None => {}
        }

        records.push(record);
    }

    diagnostics.emit(Diagnostic::info(
        run,
        format!(
            "parsed {} flows from {} ({} skipped)",
            records.len(),
            path.display(),
            skipped
        ),
    ));

    Ok(ParsedTrace {
        records,
        skipped,
        has_classifier,
    })
}

/// Build a record from a stats flow element
fn build_record(attrs: &RawAttributes, schema: &TraceSchema) -> Result<FlowRecord, String> {
    let flow_id = match attrs.get("flowId") {
        Some(id) => parse_count(id).map_err(|e| format!("flowId: {}", e))?,
        None => return Err("missing flowId".to_string()),
    };

    let mut record = FlowRecord::empty(flow_id);
    record.tx_packets = count_attr(attrs, "txPackets")?;
    record.rx_packets = count_attr(attrs, "rxPackets")?;
    record.tx_bytes = amount_attr(attrs, "txBytes")?;
    record.rx_bytes = amount_attr(attrs, "rxBytes")?;
    record.delay_sum_ms = time_attr(attrs, "delaySum", schema)?;
    record.jitter_sum_ms = time_attr(attrs, "jitterSum", schema)?;

    let first_tx = time_attr(attrs, "timeFirstTxPacket", schema)?;
    let last_rx = time_attr(attrs, "timeLastRxPacket", schema)?;
    record.duration_ms = last_rx - first_tx;
    record.raw_duration = raw_time_attr(attrs, "timeLastRxPacket")?
        - raw_time_attr(attrs, "timeFirstTxPacket")?;

    let reported = match schema.lost_packets {
        LostPacketsSource::Derived => None,
        LostPacketsSource::Reported | LostPacketsSource::ReportedOrDerived => attrs
            .get("lostPackets")
            .map(|v| parse_count(v).map_err(|e| format!("lostPackets: {}", e)))
            .transpose()?,
    };

    match (reported, schema.lost_packets) {
        (Some(lost), _) => {
            record.lost_packets = lost;
            record.lost_reported = true;
            record.counters_inconsistent = lost > record.tx_packets;
        }
        (None, LostPacketsSource::Reported) => {}
        (None, _) => match record.tx_packets.checked_sub(record.rx_packets) {
            Some(lost) => record.lost_packets = lost,
            None => record.counters_inconsistent = true,
        },
    }

    Ok(record)
}

fn apply_classifier(
    record: &mut FlowRecord,
    attrs: &RawAttributes,
    run: &str,
    diagnostics: &dyn Diagnostics,
) {
    record.source_address = text_attr(attrs, "sourceAddress");
    record.destination_address = text_attr(attrs, "destinationAddress");
    record.protocol = text_attr(attrs, "protocol");
    record.source_port = port_attr(attrs, "sourcePort", record.flow_id, run, diagnostics);
    record.destination_port = port_attr(attrs, "destinationPort", record.flow_id, run, diagnostics);
}

fn text_attr(attrs: &RawAttributes, key: &str) -> String {
    match attrs.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

fn port_attr(
    attrs: &RawAttributes,
    key: &str,
    flow_id: u64,
    run: &str,
    diagnostics: &dyn Diagnostics,
) -> Option<u16> {
    let value = attrs.get(key)?;
    match value.trim().parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            diagnostics.emit(Diagnostic::warn(
                run,
                format!("flow {}: invalid {} '{}', treated as unknown", flow_id, key, value),
            ));
            None
        }
    }
}

/// Parse a non-negative integer counter; accepts float notation like "12.0"
fn parse_count(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(n);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => {
            // u64::MAX as f64 rounds up to 2^64, which is already out of range
            if n < u64::MAX as f64 {
                Ok(n as u64)
            } else {
                Err(format!("'{}' is out of range for a counter", value))
            }
        }
        _ => Err(format!("'{}' is not a non-negative integer", value)),
    }
}

fn count_attr(attrs: &RawAttributes, key: &str) -> Result<u64, String> {
    match attrs.get(key) {
        Some(v) => parse_count(v).map_err(|e| format!("{}: {}", key, e)),
        None => Ok(0),
    }
}

fn amount_attr(attrs: &RawAttributes, key: &str) -> Result<f64, String> {
    match attrs.get(key) {
        Some(v) => match v.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
            _ => Err(format!("{}: '{}' is not a non-negative number", key, v)),
        },
        None => Ok(0.0),
    }
}

fn time_attr(attrs: &RawAttributes, key: &str, schema: &TraceSchema) -> Result<f64, String> {
    match attrs.get(key) {
        Some(v) => normalize_with_bare_unit(v, schema.bare_time_unit)
            .map_err(|e| format!("{}: {}", key, e)),
        None => Ok(0.0),
    }
}

fn raw_time_attr(attrs: &RawAttributes, key: &str) -> Result<f64, String> {
    match attrs.get(key) {
        Some(v) => split_time_token(v)
            .map(|(value, _)| value)
            .map_err(|e| format!("{}: {}", key, e)),
        None => Ok(0.0),
    }
}
