//! Per-graph random priority weights.
//!
//! One `f32` per catalog service, indexed by [`ServiceId`]. Weights are drawn
//! once when an individual is created and never change afterwards, so the
//! candidate order they induce (ascending weight, ties by service index) is
//! fixed for the lifetime of a graph.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::id::ServiceId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights(Vec<f32>);

impl Weights {
    /// Draws one uniform weight in `[0, 1)` per catalog service.
    pub fn random<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        Weights((0..len).map(|_| rng.gen::<f32>()).collect())
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        Weights(values)
    }

    /// Weight of a service, `None` if the index is outside the vector.
    pub fn get(&self, id: ServiceId) -> Option<f32> {
        self.0.get(id.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}
