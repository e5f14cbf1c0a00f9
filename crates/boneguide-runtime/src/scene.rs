//! The host application's side of the engine: rendering and the camera.

use boneguide_overlay::OverlayModel;
use boneguide_types::Frame;

/// Implemented by whatever owns the AR scene.
///
/// Calls come from the engine's coordinator task and must not block for long.
/// Overlay placement is published through [`Engine::subscribe`](crate::Engine::subscribe)
/// rather than pushed here.
pub trait SceneHost: Send + Sync {
    /// Adds the validated model to the scene.  Replaces any previous overlay.
    fn attach_overlay(&self, model: &OverlayModel);

    /// Removes the overlay, if any.
    fn remove_overlay(&self);

    /// Most recent camera frame, or `None` while the camera is not ready.
    fn current_frame(&self) -> Option<Frame>;
}
