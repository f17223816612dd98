use std::fmt;

use crate::needle::Needle;

pub type CarrierId = u32;

/// An ordered, non-empty set of carrier ids drawn together for one yarn-to-needle op.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CarrierSet {
    ids: Vec<CarrierId>,
}

impl CarrierSet {
    pub fn new(ids: Vec<CarrierId>) -> CarrierSet {
        CarrierSet { ids }
    }

    pub fn single(id: CarrierId) -> CarrierSet {
        CarrierSet { ids: vec![id] }
    }

    pub fn ids(&self) -> &[CarrierId] {
        &self.ids
    }

    /// The carrier count value a `;;Carriers` header line would report for this set.
    pub fn max_id(&self) -> CarrierId {
        self.ids.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for CarrierSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let strs: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", strs.join(" "))
    }
}

/// Lifecycle state of a single yarn carrier.
#[derive(Clone, Debug)]
pub struct CarrierState {
    pub id: CarrierId,
    pub active: bool,
    pub hooked: bool,
    pub position: Option<Needle>,
}

impl CarrierState {
    pub fn new(id: CarrierId) -> CarrierState {
        CarrierState {
            id,
            active: false,
            hooked: false,
            position: None,
        }
    }
}
