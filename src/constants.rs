//! # Constants and type definitions for Spinfit
//!
//! This module centralizes the **physical constants**, **unit aliases**, and **track
//! identifiers** used throughout the `spinfit` library.
//!
//! ## Overview
//!
//! - Thermodynamic and hydrodynamic constants used by the rotational-diffusion model
//! - Default image scale (pixel → meter)
//! - Core type aliases used across the crate
//! - The `-1` sentinel marking the unassigned bucket
//!
//! These definitions are used by all main modules, including grouping, refinement,
//! diffusion and rotation extraction.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.38e-23;

/// Temperature of the medium (K), water at 20 °C
pub const MEDIUM_TEMPERATURE: f64 = 293.0;

/// Dynamic viscosity of the medium (Pa·s), water at 20 °C
pub const MEDIUM_VISCOSITY: f64 = 1.0e-3;

/// Default microscope scale: meters per pixel
pub const DEFAULT_PIXEL_TO_METER: f64 = 0.185e-6;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-12;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Length in image pixels
pub type Pixel = f64;
/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Length in meters
pub type Meter = f64;
/// Time in seconds
pub type Second = f64;
/// Ordinal frame index ("Slice" in the particle-analysis table)
pub type FrameIndex = u32;

/// Identifier of a track.
///
/// Non-negative values are real tracks; [`UNASSIGNED`] is the reject bucket.
pub type TrackId = i32;

/// Sentinel track ID for detections that belong to no track.
pub const UNASSIGNED: TrackId = -1;
