use glam::{Mat4, Vec3};

use crate::scene::Frustum;

/// The shadow-casting light of a frame, as seen by the shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowLight {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ShadowLight {
    /// Orthographic light looking along `direction`, covering a sphere of
    /// `radius` around `center`.
    #[must_use]
    pub fn directional(direction: Vec3, center: Vec3, radius: f32) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let up = if direction.abs().dot(Vec3::Y) > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = center - direction * radius * 2.0;
        Self {
            view: Mat4::look_at_rh(eye, center, up),
            projection: Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0),
        }
    }

    /// World to light clip space.
    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(self.view, self.projection)
    }
}

/// Supplies the shadow-casting light once per frame.
///
/// Returning `None` means no light source was found; the shadow map is not
/// rendered and the opaque pass runs without shadows.
pub trait LightScanner {
    fn scan(&mut self) -> Option<ShadowLight>;
}

impl<F> LightScanner for F
where
    F: FnMut() -> Option<ShadowLight>,
{
    fn scan(&mut self) -> Option<ShadowLight> {
        self()
    }
}

/// A scanner that never finds a light.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLight;

impl LightScanner for NoLight {
    fn scan(&mut self) -> Option<ShadowLight> {
        None
    }
}
