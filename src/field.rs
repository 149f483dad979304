//! Per-node distance state shared by both engines

use serde::Serialize;

/// Value stored for nodes that no finite path has reached yet
pub const UNREACHED: f64 = f64::INFINITY;

/// Best known values for one node.
///
/// The three channels are minimised independently: `time` is the shortest
/// travel time, `distance` the shortest path length in meters and `hops`
/// the fewest edges. `valid` turns true once any finite contribution
/// arrives and only an explicit reset clears it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeValue {
    pub time: f64,
    pub distance: f64,
    pub hops: f64,
    pub valid: bool,
}

impl NodeValue {
    pub const UNREACHED: Self = Self {
        time: UNREACHED,
        distance: UNREACHED,
        hops: UNREACHED,
        valid: false,
    };

    pub const SOURCE: Self = Self {
        time: 0.0,
        distance: 0.0,
        hops: 0.0,
        valid: true,
    };

    /// The primary value (travel time); +inf when unreached
    pub fn value(&self) -> f64 {
        if self.valid { self.time } else { UNREACHED }
    }
}

/// Mapping from node index to its [`NodeValue`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DistanceField {
    values: Vec<NodeValue>,
}

impl DistanceField {
    /// Field after a reset: every node unreached except `source`
    pub fn reset(node_count: usize, source: usize) -> Self {
        let mut values = vec![NodeValue::UNREACHED; node_count];
        if let Some(slot) = values.get_mut(source) {
            *slot = NodeValue::SOURCE;
        }
        Self { values }
    }

    pub fn from_values(values: Vec<NodeValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[NodeValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeValue> {
        self.values.iter()
    }

    /// Number of nodes with `valid == true`
    pub fn reached_count(&self) -> usize {
        self.values.iter().filter(|v| v.valid).count()
    }

    /// Largest relative difference of the travel-time channel between two
    /// fields, or `None` if sizes or validity flags disagree.
    pub fn max_relative_difference(&self, other: &DistanceField) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        let mut worst = 0.0f64;
        for (a, b) in self.values.iter().zip(&other.values) {
            if a.valid != b.valid {
                return None;
            }
            if a.valid && a.time != b.time {
                let scale = a.time.abs().max(b.time.abs());
                worst = worst.max((a.time - b.time).abs() / scale);
            }
        }
        Some(worst)
    }

    /// Validity flags agree and travel times agree within `relative_tolerance`
    pub fn agrees_with(&self, other: &DistanceField, relative_tolerance: f64) -> bool {
        self.max_relative_difference(other)
            .is_some_and(|diff| diff <= relative_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_marks_only_source_valid() {
        let field = DistanceField::reset(4, 2);
        assert_eq!(field.get(2), Some(&NodeValue::SOURCE));
        assert_eq!(field.reached_count(), 1);
        assert!(field.get(0).unwrap().value().is_infinite());
    }

    #[test]
    fn agreement_checks_validity_and_tolerance() {
        let mut values = vec![NodeValue::SOURCE, NodeValue::UNREACHED];
        let a = DistanceField::from_values(values.clone());
        values[1] = NodeValue {
            time: 3.0,
            distance: 1.0,
            hops: 1.0,
            valid: true,
        };
        let b = DistanceField::from_values(values);
        assert!(a.agrees_with(&a, 1e-6));
        assert!(!a.agrees_with(&b, 1e-6));
        assert_eq!(b.max_relative_difference(&b), Some(0.0));
    }

    #[test]
    fn difference_is_relative_for_short_times() {
        let at = |time: f64| {
            DistanceField::from_values(vec![
                NodeValue::SOURCE,
                NodeValue {
                    time,
                    distance: 1.0,
                    hops: 1.0,
                    valid: true,
                },
            ])
        };
        let diff = at(0.5).max_relative_difference(&at(0.500_000_9)).unwrap();
        assert!(diff > 1e-6, "{diff}");
        assert!(!at(0.5).agrees_with(&at(0.500_000_9), 1e-6));
        assert!(at(1000.0).agrees_with(&at(1000.000_5), 1e-6));
        assert_eq!(at(0.0).max_relative_difference(&at(0.0)), Some(0.0));
    }

    #[test]
    fn unreached_serializes_as_null() {
        let field = DistanceField::reset(2, 0);
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(
            json,
            r#"[{"time":0.0,"distance":0.0,"hops":0.0,"valid":true},{"time":null,"distance":null,"hops":null,"valid":false}]"#
        );
    }
}
