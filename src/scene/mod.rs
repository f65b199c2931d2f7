//! Scene Collaborator Seams
//!
//! The render cores do not own or traverse a scene graph. Each frame they
//! receive ordered lists of drawable nodes and ask each node to test itself
//! against a frustum and to issue its own draw calls:
//!
//! - [`SceneNode`]: a drawable with bounds, a shadow-casting flag and a draw hook
//! - [`RenderLists`]: the per-frame opaque and transparent node lists
//! - [`Frustum`]: plane-based culling volume of the camera or a light
//! - [`ShadowLight`] / [`LightScanner`]: the shadow-casting light of the frame

pub mod camera;
pub mod light;
pub mod node;

pub use camera::Frustum;
pub use light::{LightScanner, NoLight, ShadowLight};
pub use node::{RenderLists, SceneNode};
