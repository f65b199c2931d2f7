//! Built-in Fullscreen Passes
//!
//! WGSL implementations of the passes that do not depend on scene geometry:
//!
//! | Pass | Inputs (binding ← device slot) |
//! |------|--------------------------------|
//! | `ssao` | 0 ← constants 0, 1 ← texture 0 (depth-normal), 2 ← texture 1 (noise), 3 ← sampler 0, 4 ← sampler 1 |
//! | `ssao_blur_h` / `ssao_blur_v` | 0 ← constants 0, 1 ← texture 0 (source), 2 ← texture 1 (depth-normal), 3 ← sampler 0 |
//! | `oit_composite` | 0 ← texture 0 (accumulation), 1 ← texture 1 (revealage) |
//! | `peel_final` | 0 ← texture 0 (min-max), 1 ← texture 1 (front), 2 ← texture 2 (back) |
//! | `screen_quad` / `screen_cursor` | 0 ← constants 0, 1 ← texture 0, 2 ← sampler 0 |
//!
//! Geometry passes (`shadow_depth`, `ssao_depth_normal`, `oit_accumulate`,
//! `peel_*`, `opaque`) depend on the application's vertex formats and are
//! registered by the application into the same [`PassTable`].
//!
//! The OIT composite reads single-sampled targets; a multisampled output
//! needs an application-supplied `oit_composite`.

use wgpu::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, SamplerBindingType, TextureSampleType,
};

use crate::renderer::backend::{PassBinding, ShaderPassDesc, WgpuDevice};
use crate::renderer::pipeline::technique::{PassTable, passes, slots};

const SSAO_WGSL: &str = include_str!("shaders/program/ssao.wgsl");
const SSAO_BLUR_H_WGSL: &str = include_str!("shaders/program/ssao_blur_h.wgsl");
const SSAO_BLUR_V_WGSL: &str = include_str!("shaders/program/ssao_blur_v.wgsl");
const OIT_COMPOSITE_WGSL: &str = include_str!("shaders/program/oit_composite.wgsl");
const PEEL_FINAL_WGSL: &str = include_str!("shaders/program/peel_final.wgsl");
const SCREEN_QUAD_WGSL: &str = include_str!("shaders/program/screen_quad.wgsl");
const SCREEN_CURSOR_WGSL: &str = include_str!("shaders/program/screen_cursor.wgsl");

const FILTERABLE: TextureSampleType = TextureSampleType::Float { filterable: true };
const UNFILTERABLE: TextureSampleType = TextureSampleType::Float { filterable: false };

fn texture(binding: u32, slot: u32, sample_type: TextureSampleType) -> PassBinding {
    PassBinding::Texture {
        binding,
        slot,
        sample_type,
        multisampled: false,
    }
}

fn sampler(binding: u32, slot: u32, kind: SamplerBindingType) -> PassBinding {
    PassBinding::Sampler { binding, slot, kind }
}

/// Straight-alpha "over" blending.
const ALPHA_OVER: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
};

fn blur_bindings() -> Vec<PassBinding> {
    vec![
        PassBinding::Uniform { binding: 0, slot: 0 },
        texture(1, 0, FILTERABLE),
        texture(2, 1, FILTERABLE),
        sampler(3, 0, SamplerBindingType::NonFiltering),
    ]
}

fn quad_bindings() -> Vec<PassBinding> {
    vec![
        PassBinding::Uniform { binding: 0, slot: 0 },
        texture(1, 0, FILTERABLE),
        sampler(2, 0, SamplerBindingType::Filtering),
    ]
}

/// Registers every built-in fullscreen pass on `device`.
///
/// The returned table names the passes and their slots; merge the
/// application's geometry passes into it before attaching the cores.
pub fn register_fullscreen_passes(device: &mut WgpuDevice) -> PassTable {
    let mut table = PassTable::new();

    // --- SSAO ---
    let ssao = device.register_pass(ShaderPassDesc::fullscreen(
        "SSAO",
        SSAO_WGSL,
        vec![
            PassBinding::Uniform { binding: 0, slot: 0 },
            texture(1, 0, FILTERABLE),
            texture(2, 1, FILTERABLE),
            sampler(3, 0, SamplerBindingType::NonFiltering),
            sampler(4, 1, SamplerBindingType::NonFiltering),
        ],
    ));
    table.insert_pass(passes::SSAO, ssao);
    table.insert_slot(passes::SSAO, slots::SSAO_CONSTANTS, 0);
    table.insert_slot(passes::SSAO, slots::DEPTH_NORMAL, 0);
    table.insert_slot(passes::SSAO, slots::NOISE, 1);

    let blur_h = device.register_pass(ShaderPassDesc::fullscreen("SSAO Blur H", SSAO_BLUR_H_WGSL, blur_bindings()));
    let blur_v = device.register_pass(ShaderPassDesc::fullscreen("SSAO Blur V", SSAO_BLUR_V_WGSL, blur_bindings()));
    table.insert_pass(passes::SSAO_BLUR_H, blur_h);
    table.insert_pass(passes::SSAO_BLUR_V, blur_v);
    table.insert_slot(passes::SSAO_BLUR_H, slots::SSAO_CONSTANTS, 0);
    table.insert_slot(passes::SSAO_BLUR_H, slots::SOURCE, 0);
    table.insert_slot(passes::SSAO_BLUR_H, slots::DEPTH_NORMAL, 1);

    // --- Weighted OIT composite ---
    let composite = device.register_pass(
        ShaderPassDesc::fullscreen(
            "OIT Composite",
            OIT_COMPOSITE_WGSL,
            vec![texture(0, 0, UNFILTERABLE), texture(1, 1, UNFILTERABLE)],
        )
        .with_blend(vec![Some(ALPHA_OVER)]),
    );
    table.insert_pass(passes::OIT_COMPOSITE, composite);
    table.insert_slot(passes::OIT_COMPOSITE, slots::ACCUMULATION, 0);
    table.insert_slot(passes::OIT_COMPOSITE, slots::REVEALAGE, 1);

    // --- Depth peeling final ---
    let peel_final = device.register_pass(ShaderPassDesc::fullscreen(
        "Peel Final",
        PEEL_FINAL_WGSL,
        vec![
            texture(0, 0, UNFILTERABLE),
            texture(1, 1, UNFILTERABLE),
            texture(2, 2, UNFILTERABLE),
        ],
    ));
    table.insert_pass(passes::PEEL_FINAL, peel_final);
    table.insert_slot(passes::PEEL_FINAL, slots::MIN_MAX, 0);
    table.insert_slot(passes::PEEL_FINAL, slots::FRONT, 1);
    table.insert_slot(passes::PEEL_FINAL, slots::BACK, 2);

    // --- Screen clone ---
    let quad = device.register_pass(ShaderPassDesc::fullscreen("Screen Quad", SCREEN_QUAD_WGSL, quad_bindings()));
    let cursor = device.register_pass(
        ShaderPassDesc::fullscreen("Screen Cursor", SCREEN_CURSOR_WGSL, quad_bindings())
            .with_blend(vec![Some(ALPHA_OVER)]),
    );
    table.insert_pass(passes::SCREEN_QUAD, quad);
    table.insert_pass(passes::SCREEN_CURSOR, cursor);
    table.insert_slot(passes::SCREEN_QUAD, slots::QUAD_CONSTANTS, 0);
    table.insert_slot(passes::SCREEN_QUAD, slots::CAPTURE, 0);
    table.insert_slot(passes::SCREEN_CURSOR, slots::CURSOR, 0);

    log::debug!("registered {} built-in fullscreen passes", table.len());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_have_entry_points() {
        for source in [
            SSAO_WGSL,
            SSAO_BLUR_H_WGSL,
            SSAO_BLUR_V_WGSL,
            OIT_COMPOSITE_WGSL,
            PEEL_FINAL_WGSL,
            SCREEN_QUAD_WGSL,
            SCREEN_CURSOR_WGSL,
        ] {
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
    }

    #[test]
    fn test_cursor_pass_blends_over_quad() {
        let desc = ShaderPassDesc::fullscreen("Screen Cursor", SCREEN_CURSOR_WGSL, quad_bindings())
            .with_blend(vec![Some(ALPHA_OVER)]);
        assert!(desc.vertex_layouts.is_empty());
        assert!(desc.depth.is_none());
        assert_eq!(desc.blend, vec![Some(ALPHA_OVER)]);
        assert_eq!(desc.bindings[0], PassBinding::Uniform { binding: 0, slot: 0 });
        assert!(matches!(
            desc.bindings[1],
            PassBinding::Texture { binding: 1, slot: 0, multisampled: false, .. }
        ));
    }
}
