//! Typed snapshot of component readings.
//!
//! A frame literal maps node ids to component types to component ids:
//!
//! ```text
//! { '<node>': { 'B' | 'P' | 'R': { '<id>': <raw> } }, 'master': { '<role>': <raw> } }
//! ```
//!
//! The reserved `master` node has no type level; its keys are role names
//! (`Accept`, `Decline`, `Rotary`). Every reading is flattened to one
//! [`Address`] so that merging is per leaf.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::literal::Literal;

/// Node id reserved for the master board.
pub const MASTER_NODE: &str = "master";

/// Component type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComponentKind {
    /// `B`
    Button,
    /// `P`
    Potentiometer,
    /// `R`
    Rotary,
    /// Role entry of the reserved `master` node.
    Master,
}

impl ComponentKind {
    /// Parse a type tag as it appears in a frame.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "B" => Some(Self::Button),
            "P" => Some(Self::Potentiometer),
            "R" => Some(Self::Rotary),
            _ => None,
        }
    }

    /// Wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Button => "B",
            Self::Potentiometer => "P",
            Self::Rotary => "R",
            Self::Master => MASTER_NODE,
        }
    }

    /// Whether a component of this kind can be bound to a value target.
    #[must_use]
    pub const fn is_value_handler(self) -> bool {
        matches!(self, Self::Potentiometer | Self::Rotary)
    }
}

/// Location of one reading: node → type → id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub node: String,
    pub kind: ComponentKind,
    pub id: String,
}

impl Address {
    #[must_use]
    pub fn new(node: impl Into<String>, kind: ComponentKind, id: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            kind,
            id: id.into(),
        }
    }

    /// Address of a role on the master node.
    #[must_use]
    pub fn master(role: impl Into<String>) -> Self {
        Self::new(MASTER_NODE, ComponentKind::Master, role)
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ComponentKind::Master => write!(f, "{}/{}", self.node, self.id),
            kind => write!(f, "{}/{}/{}", self.node, kind.tag(), self.id),
        }
    }
}

/// Raw value reported for one component.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Pin level, analog reading or board-side position.
    Scalar(f64),
    /// Multi-pin reading, e.g. the two quadrature pins of an encoder.
    Tuple(Vec<f64>),
}

impl RawValue {
    /// The scalar value, or the first element of a tuple.
    #[must_use]
    pub fn level(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Tuple(values) => values.first().copied().unwrap_or(0.0),
        }
    }

    /// Digital interpretation of [`level`](Self::level).
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.level() >= 0.5
    }

    /// Both quadrature pins, if this is a two-element tuple.
    #[must_use]
    pub fn pins(&self) -> Option<(bool, bool)> {
        match self {
            Self::Tuple(values) if values.len() == 2 => Some((values[0] >= 0.5, values[1] >= 0.5)),
            _ => None,
        }
    }

    fn from_literal(lit: &Literal) -> Result<Self, SchemaError> {
        match lit {
            Literal::Number(n) => Ok(Self::Scalar(*n)),
            Literal::List(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_number().ok_or(SchemaError::InvalidRawValue))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Tuple),
            _ => Err(SchemaError::InvalidRawValue),
        }
    }
}

/// Frame literal that does not match the snapshot schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchemaError {
    /// The top-level value is not a mapping.
    NotAMap,
    /// A node entry is not a mapping of type tags.
    NodeNotAMap,
    /// A type tag other than `B`, `P` or `R`.
    UnknownComponentType,
    /// A type entry is not a mapping of component ids.
    ComponentsNotAMap,
    /// A reading that is neither a number nor a non-empty list of numbers.
    InvalidRawValue,
}

impl core::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotAMap => write!(f, "frame is not a mapping"),
            Self::NodeNotAMap => write!(f, "node entry is not a mapping"),
            Self::UnknownComponentType => write!(f, "unknown component type tag"),
            Self::ComponentsNotAMap => write!(f, "component entry is not a mapping"),
            Self::InvalidRawValue => write!(f, "invalid raw component value"),
        }
    }
}

/// Best-known readings, one per [`Address`].
///
/// Addresses remember the order in which they were first seen; binding
/// logical targets to hardware follows that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    leaves: BTreeMap<Address, RawValue>,
    order: Vec<Address>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a frame literal against the schema.
    pub fn from_literal(lit: &Literal) -> Result<Self, SchemaError> {
        let Literal::Map(nodes) = lit else {
            return Err(SchemaError::NotAMap);
        };

        let mut snapshot = Self::new();
        for (node, body) in nodes {
            let Literal::Map(entries) = body else {
                return Err(SchemaError::NodeNotAMap);
            };

            if node == MASTER_NODE {
                for (role, raw) in entries {
                    snapshot.insert(Address::master(role.clone()), RawValue::from_literal(raw)?);
                }
                continue;
            }

            for (tag, components) in entries {
                let kind = ComponentKind::from_tag(tag).ok_or(SchemaError::UnknownComponentType)?;
                let Literal::Map(components) = components else {
                    return Err(SchemaError::ComponentsNotAMap);
                };
                for (id, raw) in components {
                    snapshot.insert(
                        Address::new(node.clone(), kind, id.clone()),
                        RawValue::from_literal(raw)?,
                    );
                }
            }
        }
        Ok(snapshot)
    }

    /// Set one reading, appending the address to discovery order if new.
    pub fn insert(&mut self, address: Address, value: RawValue) {
        if !self.leaves.contains_key(&address) {
            self.order.push(address.clone());
        }
        self.leaves.insert(address, value);
    }

    /// Merge a newer snapshot leaf by leaf.
    ///
    /// Readings present in `newer` overwrite; everything else keeps its
    /// last-known value.
    pub fn merge(&mut self, newer: Snapshot) {
        let Snapshot { mut leaves, order } = newer;
        for address in order {
            if let Some(value) = leaves.remove(&address) {
                self.insert(address, value);
            }
        }
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&RawValue> {
        self.leaves.get(address)
    }

    /// Reading of a role on the master node.
    #[must_use]
    pub fn master(&self, role: &str) -> Option<&RawValue> {
        self.get(&Address::master(role))
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.leaves.contains_key(address)
    }

    /// Addresses in discovery order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.order.iter()
    }

    /// Readings in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &RawValue)> {
        self.order
            .iter()
            .filter_map(|addr| self.leaves.get(addr).map(|value| (addr, value)))
    }

    /// Number of components of `kind` outside the master node.
    #[must_use]
    pub fn count(&self, kind: ComponentKind) -> usize {
        self.order.iter().filter(|addr| addr.kind == kind).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::literal::parse_literal;
    use alloc::vec;

    fn snapshot(text: &str) -> Snapshot {
        Snapshot::from_literal(&parse_literal(text.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_from_literal_flattens_nodes() {
        let snap = snapshot(
            "{'master': {'Accept': 1, 'Rotary': [0, 1]}, '3': {'P': {'0': 512}, 'R': {1: 7.5}}}",
        );
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.master("Accept"), Some(&RawValue::Scalar(1.0)));
        assert_eq!(
            snap.master("Rotary"),
            Some(&RawValue::Tuple(vec![0.0, 1.0]))
        );
        assert_eq!(
            snap.get(&Address::new("3", ComponentKind::Potentiometer, "0")),
            Some(&RawValue::Scalar(512.0))
        );
        assert_eq!(
            snap.get(&Address::new("3", ComponentKind::Rotary, "1")),
            Some(&RawValue::Scalar(7.5))
        );
    }

    #[test]
    fn test_discovery_order_follows_frame() {
        let snap = snapshot("{'9': {'R': {'0': 0}}, '2': {'P': {'0': 0}, 'B': {'0': 0}}}");
        let order: Vec<String> = snap.addresses().map(|a| std::format!("{a}")).collect();
        assert_eq!(order, vec!["9/R/0", "2/P/0", "2/B/0"]);
    }

    #[test]
    fn test_merge_keeps_last_known_values() {
        let mut acc = snapshot("{'1': {'P': {'x': 1}}}");
        acc.merge(snapshot("{'1': {'P': {'y': 2}}}"));
        assert_eq!(
            acc.get(&Address::new("1", ComponentKind::Potentiometer, "x")),
            Some(&RawValue::Scalar(1.0))
        );
        assert_eq!(
            acc.get(&Address::new("1", ComponentKind::Potentiometer, "y")),
            Some(&RawValue::Scalar(2.0))
        );
    }

    #[test]
    fn test_merge_overwrites_present_leaves_only() {
        let mut acc = snapshot("{'master': {'Accept': 0, 'Decline': 0}, '1': {'P': {'0': 10}}}");
        acc.merge(snapshot("{'master': {'Accept': 1}}"));
        assert_eq!(acc.master("Accept"), Some(&RawValue::Scalar(1.0)));
        assert_eq!(acc.master("Decline"), Some(&RawValue::Scalar(0.0)));
        assert_eq!(acc.len(), 3);
        // Order is not disturbed by overwrites
        assert_eq!(acc.addresses().next(), Some(&Address::master("Accept")));
    }

    #[test]
    fn test_schema_rejections() {
        let check = |text: &str| Snapshot::from_literal(&parse_literal(text.as_bytes()).unwrap());
        assert_eq!(check("[1, 2]"), Err(SchemaError::NotAMap));
        assert_eq!(check("{'1': 5}"), Err(SchemaError::NodeNotAMap));
        assert_eq!(check("{'1': {'X': {'0': 1}}}"), Err(SchemaError::UnknownComponentType));
        assert_eq!(check("{'1': {'P': 3}}"), Err(SchemaError::ComponentsNotAMap));
        assert_eq!(check("{'1': {'P': {'0': []}}}"), Err(SchemaError::InvalidRawValue));
        assert_eq!(check("{'master': {'Rotary': [1, {}]}}"), Err(SchemaError::InvalidRawValue));
    }

    #[test]
    fn test_raw_value_helpers() {
        assert!(RawValue::Scalar(1.0).is_high());
        assert!(!RawValue::Scalar(0.0).is_high());
        assert_eq!(RawValue::Tuple(vec![1.0, 0.0]).pins(), Some((true, false)));
        assert_eq!(RawValue::Tuple(vec![1.0]).pins(), None);
        assert_eq!(RawValue::Scalar(3.0).pins(), None);
        assert_eq!(RawValue::Tuple(vec![4.0, 2.0]).level(), 4.0);
    }

    #[test]
    fn test_count_by_kind() {
        let snap = snapshot("{'1': {'P': {'0': 1, '1': 2}, 'R': {'0': 0}}, 'master': {'Accept': 0}}");
        assert_eq!(snap.count(ComponentKind::Potentiometer), 2);
        assert_eq!(snap.count(ComponentKind::Rotary), 1);
        assert_eq!(snap.count(ComponentKind::Button), 0);
    }
}
