//! Destination-port classification of flows to entities.
//!
//! Entity `i` owns destination port `port_range_start + i`. Ranges are
//! contiguous and one port wide, so at most one entity can match.

use super::types::FlowRecord;
use crate::config::{ClassifierConfig, ValidationError};
use crate::error::AnalyzerError;

/// Validated port-range rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortClassifier {
    port_range_start: u16,
    entity_count: u16,
}

impl PortClassifier {
    /// Build a classifier, rejecting empty or overflowing ranges
    pub fn new(port_range_start: u16, entity_count: u16) -> Result<Self, AnalyzerError> {
        if entity_count == 0 {
            return Err(ValidationError::InvalidClassifier(
                "entity_count must be at least 1".to_string(),
            )
            .into());
        }
        if port_range_start as u32 + entity_count as u32 > u16::MAX as u32 + 1 {
            return Err(ValidationError::InvalidClassifier(format!(
                "port range starting at {} with {} entities exceeds port 65535",
                port_range_start, entity_count
            ))
            .into());
        }
        Ok(Self {
            port_range_start,
            entity_count,
        })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, AnalyzerError> {
        Self::new(config.port_range_start, config.entity_count)
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count as usize
    }

    /// Owning entity of a destination port, `None` when unmatched
    pub fn classify(&self, port: u16) -> Option<usize> {
        let offset = port.checked_sub(self.port_range_start)?;
        (offset < self.entity_count).then_some(offset as usize)
    }

    /// Entity index for a record; flows without a destination port are unmatched
    pub fn classify_record(&self, record: &FlowRecord) -> Option<usize> {
        record.destination_port.and_then(|port| self.classify(port))
    }

    /// Classify every record in place and return the number matched.
    ///
    /// Each match is checked against the range it claims; a mismatch is an
    /// internal fault, never a data problem.
    pub fn classify_all(&self, records: &mut [FlowRecord]) -> Result<usize, AnalyzerError> {
        let mut matched = 0;
        for record in records.iter_mut() {
            record.entity_index = self.classify_record(record);
            if let (Some(index), Some(port)) = (record.entity_index, record.destination_port) {
                if index >= self.entity_count() || self.port_of(index) != Some(port) {
                    return Err(AnalyzerError::ClassificationAmbiguity { port });
                }
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// Destination port owned by entity `index`
    pub fn port_of(&self, index: usize) -> Option<u16> {
        if index >= self.entity_count() {
            return None;
        }
        u16::try_from(index)
            .ok()
            .and_then(|i| self.port_range_start.checked_add(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_round_trip() {
        let classifier = PortClassifier::new(5000, 5).unwrap();
        for (i, port) in (5000..5005).enumerate() {
            assert_eq!(classifier.classify(port), Some(i));
        }
        assert_eq!(classifier.classify(4999), None);
        assert_eq!(classifier.classify(5005), None);
        assert_eq!(classifier.classify(0), None);
    }

    #[test]
    fn test_range_at_top_of_port_space() {
        let classifier = PortClassifier::new(65534, 2).unwrap();
        assert_eq!(classifier.classify(65535), Some(1));
        assert!(PortClassifier::new(65535, 2).is_err());
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let err = PortClassifier::new(5000, 0).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidConfig(_)));
    }

    #[test]
    fn test_classify_records() {
        let classifier = PortClassifier::new(5000, 2).unwrap();
        let mut records = vec![FlowRecord::empty(1), FlowRecord::empty(2), FlowRecord::empty(3)];
        records[0].destination_port = Some(5001);
        records[1].destination_port = Some(80);

        assert_eq!(classifier.classify_all(&mut records).unwrap(), 1);
        assert_eq!(records[0].entity_index, Some(1));
        assert_eq!(records[1].entity_index, None);
        assert_eq!(records[2].entity_index, None);
    }

    #[test]
    fn test_port_of_inverts_classify() {
        let classifier = PortClassifier::new(6000, 3).unwrap();
        for index in 0..3 {
            let port = classifier.port_of(index).unwrap();
            assert_eq!(classifier.classify(port), Some(index));
        }
        assert_eq!(classifier.port_of(3), None);
    }
}
