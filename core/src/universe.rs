//! Planets and the distance metric between them.
//!
//! Galaxy generation lives outside the core; this is the minimal
//! in-memory map the engine needs to run.

use crate::{
    error::{SimError, SimResult},
    types::{EmpireId, LocationId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Planet {
    pub id:    LocationId,
    pub name:  String,
    pub x:     f64,
    pub y:     f64,
    #[serde(default)]
    pub owner: Option<EmpireId>,
    /// Procedurally rendered terrain grid. Large; light state drops it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<Vec<Vec<u8>>>,
}

impl Planet {
    pub fn new(id: &str, name: &str, x: f64, y: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            x,
            y,
            owner: None,
            surface: None,
        }
    }

    pub fn owned_by(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_surface(mut self, surface: Vec<Vec<u8>>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Copy with the surface grid stripped.
    pub fn without_surface(&self) -> Self {
        Self { surface: None, ..self.clone() }
    }
}

/// What the core needs from the galaxy map.
pub trait Universe {
    /// Distance between two locations, or `None` if either is unknown.
    fn distance(&self, a: &str, b: &str) -> Option<f64>;

    fn planet(&self, id: &str) -> Option<&Planet>;

    fn planets_owned_by(&self, owner: &str) -> Vec<&Planet>;

    /// Returns the previous owner.
    fn set_planet_owner(&mut self, id: &str, owner: Option<EmpireId>) -> SimResult<Option<EmpireId>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Galaxy {
    planets: BTreeMap<LocationId, Planet>,
}

impl Galaxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_planets(planets: impl IntoIterator<Item = Planet>) -> Self {
        Self {
            planets: planets.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn add_planet(&mut self, planet: Planet) {
        self.planets.insert(planet.id.clone(), planet);
    }

    pub fn planets(&self) -> impl Iterator<Item = &Planet> {
        self.planets.values()
    }

    pub fn len(&self) -> usize {
        self.planets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planets.is_empty()
    }
}

impl Universe for Galaxy {
    fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let pa = self.planets.get(a)?;
        let pb = self.planets.get(b)?;
        Some(((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt())
    }

    fn planet(&self, id: &str) -> Option<&Planet> {
        self.planets.get(id)
    }

    fn planets_owned_by(&self, owner: &str) -> Vec<&Planet> {
        self.planets
            .values()
            .filter(|p| p.owner.as_deref() == Some(owner))
            .collect()
    }

    fn set_planet_owner(&mut self, id: &str, owner: Option<EmpireId>) -> SimResult<Option<EmpireId>> {
        let planet = self
            .planets
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownPlanet { id: id.to_string() })?;
        Ok(std::mem::replace(&mut planet.owner, owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn galaxy() -> Galaxy {
        Galaxy::from_planets([
            Planet::new("sol", "Sol", 0.0, 0.0).owned_by("red"),
            Planet::new("vega", "Vega", 30.0, 40.0),
        ])
    }

    #[test]
    fn euclidean_distance() {
        let g = galaxy();
        assert_eq!(g.distance("sol", "vega"), Some(50.0));
        assert_eq!(g.distance("sol", "sol"), Some(0.0));
        assert_eq!(g.distance("sol", "nowhere"), None);
    }

    #[test]
    fn ownership_changes_hands() {
        let mut g = galaxy();
        let prev = g.set_planet_owner("vega", Some("red".into())).unwrap();
        assert_eq!(prev, None);
        assert_eq!(g.planets_owned_by("red").len(), 2);
        assert!(g.set_planet_owner("nowhere", None).is_err());
    }
}
