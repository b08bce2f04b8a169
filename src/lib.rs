//! Bidirectional translation between Simulink MDL containers (MathWorks
//! OPC text packages) and the OC real-time-control DSL.
//!
//! The forward path parses an MDL container into a block-graph IR,
//! schedules each system, and emits OC text plus a metadata sidecar that
//! captures everything codegen cannot recover. The reverse path parses
//! the OC text, lifts the update bodies back into the IR, and emits an
//! MDL container, byte-identical to the original when the sidecar is
//! present.

pub mod blocks;
pub mod codegen;
pub mod discretize;
pub mod error;
pub mod generator;
pub mod layout;
pub mod lift;
pub mod metadata;
pub mod model;
pub mod ocparse;
pub mod ocwrite;
pub mod opc;
pub mod parser;
pub mod schedule;
pub mod yamlgen;
