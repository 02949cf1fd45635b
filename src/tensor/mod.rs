//! Operand descriptions
//!
//! This module provides the `TensorView` handed to kernel factories and the
//! `Layout` that implements the broadcasting rule.

mod layout;
mod view;

pub use layout::{Layout, Shape, Strides, broadcast_shapes, checked_elem_count};
pub use view::TensorView;
