//! The OpenFOAM cases we know how to run, and the mesh sizes of the motorbike case.

use crate::error::BenchError;

/// A case template shipped with OpenFOAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseDefinition {
    /// The name used on the command line.
    pub key: &'static str,
    /// Path of the template, relative to the OpenFOAM install root.
    pub path: &'static str,
}

impl CaseDefinition {
    /// The name of the case's directory once copied into the run directory (e.g. `motorBike`).
    pub fn dir_name(&self) -> &'static str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }
}

/// A named mesh size for the motorbike case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionPreset {
    pub key: &'static str,
    /// Block mesh cell counts, `"X Y Z"`.
    pub dimensions: &'static str,
}

pub const CASES: &[CaseDefinition] = &[
    CaseDefinition {
        key: "motorbike",
        path: "tutorials/incompressible/simpleFoam/motorBike",
    },
    CaseDefinition {
        key: "pipe_cyclic",
        path: "tutorials/incompressible/simpleFoam/pipeCyclic",
    },
];

pub const DEFAULT_CASE: &str = "motorbike";

/// The only case the dimension presets apply to.
pub const MOTORBIKE: &str = "motorbike";

pub const MOTORBIKE_DIMENSIONS: &[DimensionPreset] = &[
    DimensionPreset {
        key: "small",
        dimensions: "20 8 8",
    },
    DimensionPreset {
        key: "medium",
        dimensions: "40 16 16",
    },
    DimensionPreset {
        key: "large",
        dimensions: "80 32 32",
    },
    DimensionPreset {
        key: "x-large",
        dimensions: "160 64 64",
    },
];

pub const DEFAULT_MOTORBIKE_DIMENSIONS: &str = "small";

/// Check that every default key is in its own table. Call this before doing anything else.
pub fn check_defaults() -> Result<(), BenchError> {
    check_defaults_in(CASES, DEFAULT_CASE, MOTORBIKE_DIMENSIONS, DEFAULT_MOTORBIKE_DIMENSIONS)
}

fn check_defaults_in(
    cases: &[CaseDefinition],
    default_case: &'static str,
    presets: &[DimensionPreset],
    default_preset: &'static str,
) -> Result<(), BenchError> {
    if !cases.iter().any(|c| c.key == default_case) {
        return Err(BenchError::InconsistentTemplates {
            table: "case",
            key: default_case,
        });
    }
    if !presets.iter().any(|p| p.key == default_preset) {
        return Err(BenchError::InconsistentTemplates {
            table: "motorbike dimensions",
            key: default_preset,
        });
    }
    Ok(())
}

pub fn case_keys() -> Vec<&'static str> {
    let mut keys: Vec<_> = CASES.iter().map(|c| c.key).collect();
    keys.sort();
    keys
}

pub fn preset_keys() -> Vec<&'static str> {
    let mut keys: Vec<_> = MOTORBIKE_DIMENSIONS.iter().map(|p| p.key).collect();
    keys.sort();
    keys
}

/// Look up a case by name.
pub fn case(key: &str) -> Result<&'static CaseDefinition, BenchError> {
    CASES
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| BenchError::UnknownTemplateKey {
            table: "case",
            key: key.into(),
            known: case_keys().join(", "),
        })
}

/// Look up the dimensions of a motorbike size.
pub fn motorbike_dimensions(key: &str) -> Result<&'static str, BenchError> {
    MOTORBIKE_DIMENSIONS
        .iter()
        .find(|p| p.key == key)
        .map(|p| p.dimensions)
        .ok_or_else(|| BenchError::UnknownTemplateKey {
            table: "motorbike dimensions",
            key: key.into(),
            known: preset_keys().join(", "),
        })
}

/// Check that `dims` is three positive integers and normalize the spacing (e.g. `" 40  16 16"`
/// becomes `"40 16 16"`).
pub fn parse_dimensions(dims: &str) -> Result<String, BenchError> {
    let invalid = || BenchError::InvalidDimensions {
        dimensions: dims.into(),
    };

    let parts = dims
        .split_whitespace()
        .map(|part| match part.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if parts.len() != 3 {
        return Err(invalid());
    }

    Ok(format!("{} {} {}", parts[0], parts[1], parts[2]))
}
