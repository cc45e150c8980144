use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The fixed set of concept tiles a museum can contain.
///
/// Wire form is kebab-case, matching the web client's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConceptType {
    Linear,
    Quadratic,
    Cubic,
    SquareRoot,
    CubeRoot,
    AbsoluteValue,
    Inverse,
    Exponential,
    Logarithmic,
    Trigonometric,
    Piecewise,
}

impl ConceptType {
    /// All concept types, in the order the client displays them.
    pub const ALL: [ConceptType; 11] = [
        ConceptType::Linear,
        ConceptType::Quadratic,
        ConceptType::Cubic,
        ConceptType::SquareRoot,
        ConceptType::CubeRoot,
        ConceptType::AbsoluteValue,
        ConceptType::Inverse,
        ConceptType::Exponential,
        ConceptType::Logarithmic,
        ConceptType::Trigonometric,
        ConceptType::Piecewise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptType::Linear => "linear",
            ConceptType::Quadratic => "quadratic",
            ConceptType::Cubic => "cubic",
            ConceptType::SquareRoot => "square-root",
            ConceptType::CubeRoot => "cube-root",
            ConceptType::AbsoluteValue => "absolute-value",
            ConceptType::Inverse => "inverse",
            ConceptType::Exponential => "exponential",
            ConceptType::Logarithmic => "logarithmic",
            ConceptType::Trigonometric => "trigonometric",
            ConceptType::Piecewise => "piecewise",
        }
    }
}

impl fmt::Display for ConceptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConceptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConceptType::ALL
            .iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("Unknown concept type '{}'", s))
    }
}

/// The saved editor state for one concept tile owned by one user.
///
/// Exactly one record exists per (owner, concept type). The version counts
/// accepted writes and never decreases; `last_synced_at` is only touched by
/// accepted writes, never by a conflict skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub concept_type: ConceptType,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    /// Opaque editor state blob; the server never interprets it.
    pub desmos_state: Option<String>,
    pub description: String,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl ConceptRecord {
    pub fn new(owner_id: impl Into<String>, concept_type: ConceptType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            concept_type,
            position_x: 0.0,
            position_y: 0.0,
            width: 300.0,
            height: 200.0,
            desmos_state: None,
            description: String::new(),
            is_complete: false,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
            version: 1,
        }
    }

    /// Merge supplied fields over this record. Fields the patch leaves out
    /// keep their prior values. Does not touch version or timestamps.
    pub fn apply(&mut self, patch: &ConceptPatch) {
        if let Some(x) = patch.position_x {
            self.position_x = x;
        }
        if let Some(y) = patch.position_y {
            self.position_y = y;
        }
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if let Some(state) = &patch.desmos_state {
            self.desmos_state = Some(state.clone());
        }
        if let Some(desc) = &patch.description {
            self.description = desc.clone();
        }
        if let Some(complete) = patch.is_complete {
            self.is_complete = complete;
        }
    }
}

/// Partial field values for a concept record.
///
/// Used both by batch sync items and the direct update path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptPatch {
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub desmos_state: Option<String>,
    pub description: Option<String>,
    pub is_complete: Option<bool>,
}

impl ConceptPatch {
    /// Basic field validation shared by sync items and direct updates.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(w) = self.width {
            if !(w > 0.0) {
                return Err(format!("width must be positive, got {}", w));
            }
        }
        if let Some(h) = self.height {
            if !(h > 0.0) {
                return Err(format!("height must be positive, got {}", h));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_type_display() {
        assert_eq!(format!("{}", ConceptType::Linear), "linear");
        assert_eq!(format!("{}", ConceptType::SquareRoot), "square-root");
        assert_eq!(format!("{}", ConceptType::AbsoluteValue), "absolute-value");
    }

    #[test]
    fn test_concept_type_from_str() {
        assert_eq!(
            ConceptType::from_str("quadratic").unwrap(),
            ConceptType::Quadratic
        );
        assert_eq!(
            ConceptType::from_str("CUBE-ROOT").unwrap(),
            ConceptType::CubeRoot
        );
    }

    #[test]
    fn test_concept_type_from_str_invalid() {
        assert!(ConceptType::from_str("hyperbolic").is_err());
        assert!(ConceptType::from_str("").is_err());
    }

    #[test]
    fn test_concept_type_json_roundtrip() {
        let json = serde_json::to_string(&ConceptType::SquareRoot).unwrap();
        assert_eq!(json, "\"square-root\"");

        let parsed: ConceptType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ConceptType::SquareRoot);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = ConceptRecord::new("user1", ConceptType::Linear);

        assert_eq!(record.owner_id, "user1");
        assert_eq!(record.version, 1);
        assert!(!record.is_complete);
        assert!(record.desmos_state.is_none());
        assert!(record.last_synced_at.is_none());
    }

    #[test]
    fn test_apply_merges_only_supplied_fields() {
        let mut record = ConceptRecord::new("user1", ConceptType::Cubic);
        record.description = "original".to_string();

        let patch = ConceptPatch {
            position_x: Some(42.0),
            is_complete: Some(true),
            ..Default::default()
        };
        record.apply(&patch);

        assert_eq!(record.position_x, 42.0);
        assert!(record.is_complete);
        // Unspecified fields retain prior values
        assert_eq!(record.description, "original");
        assert_eq!(record.width, 300.0);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn test_patch_validation() {
        assert!(ConceptPatch::default().validate().is_ok());

        let bad = ConceptPatch {
            width: Some(-10.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let zero = ConceptPatch {
            height: Some(0.0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
