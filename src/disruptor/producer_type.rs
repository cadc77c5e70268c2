//! Producer Type
//!
//! Selects which sequencer a ring buffer is built with.

use serde::{Deserialize, Serialize};

use crate::disruptor::DisruptorError;

/// Whether one or many threads publish into a ring buffer
///
/// # Examples
/// ```
/// use batchring::disruptor::ProducerType;
///
/// let parsed: ProducerType = "single".parse().unwrap();
/// assert!(parsed.is_single());
/// assert_eq!(ProducerType::default(), ProducerType::Multi);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// Exactly one publishing thread; claims need no compare-and-swap
    Single,

    /// Any number of publishing threads
    ///
    /// The default, since it stays correct when the single-thread guarantee
    /// does not hold.
    #[default]
    Multi,
}

impl ProducerType {
    pub fn is_single(&self) -> bool {
        matches!(self, ProducerType::Single)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, ProducerType::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerType::Single => write!(f, "single"),
            ProducerType::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for ProducerType {
    type Err = DisruptorError;

    /// Parse `single` or `multi`, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ProducerType::Single),
            "multi" => Ok(ProducerType::Multi),
            _ => Err(DisruptorError::Config(format!(
                "unknown producer type '{s}', expected 'single' or 'multi'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_type_predicates() {
        assert!(ProducerType::Single.is_single());
        assert!(!ProducerType::Single.is_multi());
        assert!(ProducerType::Multi.is_multi());
        assert!(!ProducerType::Multi.is_single());
    }

    #[test]
    fn test_default_is_multi() {
        assert_eq!(ProducerType::default(), ProducerType::Multi);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Single".parse::<ProducerType>().unwrap(), ProducerType::Single);
        assert_eq!("MULTI".parse::<ProducerType>().unwrap(), ProducerType::Multi);
        assert!(matches!(
            "both".parse::<ProducerType>(),
            Err(DisruptorError::Config(_))
        ));

        for producer_type in [ProducerType::Single, ProducerType::Multi] {
            let text = producer_type.to_string();
            assert_eq!(text.parse::<ProducerType>().unwrap(), producer_type);
        }
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProducerType::Single).unwrap(),
            "\"single\""
        );
        let parsed: ProducerType = serde_json::from_str("\"multi\"").unwrap();
        assert_eq!(parsed, ProducerType::Multi);
    }
}
