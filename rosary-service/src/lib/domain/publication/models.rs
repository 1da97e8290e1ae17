use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::domain::publication::errors::PublicationError;

/// Part of the rosary a publication belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RosaryPart {
    Joyful,
    Luminous,
    Sorrowful,
    Glorious,
}

impl RosaryPart {
    /// All parts in canonical order.
    pub const ALL: [RosaryPart; 4] = [
        RosaryPart::Joyful,
        RosaryPart::Luminous,
        RosaryPart::Sorrowful,
        RosaryPart::Glorious,
    ];

    /// Name used in URLs and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RosaryPart::Joyful => "radosna",
            RosaryPart::Luminous => "światła",
            RosaryPart::Sorrowful => "bolesna",
            RosaryPart::Glorious => "chwalebna",
        }
    }
}

impl FromStr for RosaryPart {
    type Err = PublicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|part| part.as_str() == lowered)
            .ok_or_else(|| PublicationError::InvalidPart(s.to_string()))
    }
}

impl fmt::Display for RosaryPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mystery number within a part, 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mystery(u8);

impl Mystery {
    pub const COUNT: u8 = 5;

    /// # Errors
    /// * `InvalidMystery` - Outside 1..=5
    pub fn new(value: i64) -> Result<Self, PublicationError> {
        match u8::try_from(value) {
            Ok(n) if (1..=Self::COUNT).contains(&n) => Ok(Self(n)),
            _ => Err(PublicationError::InvalidMystery(value)),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

/// Day number within a mystery, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayIndex(NonZeroU32);

impl DayIndex {
    /// # Errors
    /// * `InvalidIndex` - Zero, negative or too large
    pub fn new(value: i64) -> Result<Self, PublicationError> {
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(PublicationError::InvalidIndex(value))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

/// Unique address of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicationKey {
    pub part: RosaryPart,
    pub mystery: Mystery,
    pub index: DayIndex,
}

impl fmt::Display for PublicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.part,
            self.mystery.get(),
            self.index.get()
        )
    }
}

/// One block of publication content, rendered by the client according to `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Daily reading for one day of a mystery.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub key: PublicationKey,
    pub title: String,
    pub data: Vec<ContentItem>,
    pub quote: Option<Vec<ContentItem>>,
    pub task: Option<Vec<ContentItem>>,
}

/// Day indices available for each mystery of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartOutline {
    pub part: RosaryPart,
    /// One sorted list per mystery, mystery 1 first
    pub mysteries: Vec<Vec<u32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_round_trips_through_name() {
        for part in RosaryPart::ALL {
            assert_eq!(part.as_str().parse::<RosaryPart>().unwrap(), part);
        }
        assert_eq!("Światła".parse::<RosaryPart>().unwrap(), RosaryPart::Luminous);
        assert!(matches!(
            "radosne".parse::<RosaryPart>(),
            Err(PublicationError::InvalidPart(_))
        ));
    }

    #[test]
    fn test_mystery_bounds() {
        assert!(Mystery::new(1).is_ok());
        assert!(Mystery::new(5).is_ok());
        assert_eq!(Mystery::new(0), Err(PublicationError::InvalidMystery(0)));
        assert_eq!(Mystery::new(6), Err(PublicationError::InvalidMystery(6)));
        assert_eq!(Mystery::new(-1), Err(PublicationError::InvalidMystery(-1)));
    }

    #[test]
    fn test_day_index_starts_at_one() {
        assert_eq!(DayIndex::new(1).unwrap().get(), 1);
        assert_eq!(DayIndex::new(0), Err(PublicationError::InvalidIndex(0)));
    }

    #[test]
    fn test_content_item_uses_type_field() {
        let item: ContentItem =
            serde_json::from_str(r#"{"type":"paragraph","value":"Zdrowaś Maryjo"}"#).unwrap();
        assert_eq!(item.kind, "paragraph");
        assert!(item.options.is_none());

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "paragraph");
        assert!(json.get("options").is_none());
    }
}
