//! Extension tree data model.
//!
//! # Responsibility
//! - Define the parsed shapes shared by the descriptor reader, the tree and
//!   the item builder.
//!
//! # Invariants
//! - Codon conditions are ordered innermost declaration first.
//! - Condition scope never crosses a nested path boundary.

pub mod addin;
pub mod codon;
pub mod condition;
