//! `boneguide-geometry` – transform and alignment math.
//!
//! Stateless helpers shared by the wire codec, the overlay loader and the
//! tracking engine.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and [`Mat4`][transform::Mat4], plus the camera-relative helpers
//!   ([`forward_vector`][transform::forward_vector],
//!   [`position_in_front_of_camera`][transform::position_in_front_of_camera],
//!   [`apply_offset`][transform::apply_offset]) and the row-major wire
//!   conversion.
//! - [`aabb`] – [`Aabb`][aabb::Aabb]: axis-aligned bounding boxes used to
//!   size-check overlay models.

pub mod aabb;
pub mod transform;

pub use aabb::Aabb;
pub use transform::{
    Mat4, Quaternion, Vec3, apply_offset, forward_vector, position_in_front_of_camera,
    quaternion_from_transform,
};
