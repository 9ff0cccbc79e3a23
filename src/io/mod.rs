//! Conversion of physical element data into the per-unit parameters consumed
//! by [`GridModel`](crate::prelude::GridModel).

pub mod converter;
