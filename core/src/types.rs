//! Shared primitive types used across the entire simulation.

/// A simulation tick. Advanced only by the engine; cleared only by reset.
pub type Tick = u64;

/// A stable, unique identifier for any unit or structure.
pub type EntityId = String;

/// An opaque empire (player faction) identifier.
pub type EmpireId = String;

/// A planet or other addressable location in the galaxy.
pub type LocationId = String;

/// A fleet in transit. Minted as `fleet-<uuid>`.
pub type FleetId = String;

/// The canonical run identifier.
pub type RunId = String;
