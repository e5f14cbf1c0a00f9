//! Overlay model loading: decodes the bone mesh sent by the pose server and
//! rejects models whose physical size is implausible.
//!
//! ```
//! use boneguide_overlay::{SizeEnvelope, load_and_validate};
//!
//! let err = load_and_validate(b"garbage", &SizeEnvelope::default()).unwrap_err();
//! assert!(matches!(err, boneguide_overlay::ValidationError::Decode(_)));
//! ```

pub mod loader;

pub use loader::{Dimension, OverlayModel, SizeEnvelope, ValidationError, load_and_validate};
