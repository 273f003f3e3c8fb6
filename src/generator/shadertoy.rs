//! Wrapping a Shadertoy `mainImage` snippet as a pixel-only material.

use anyhow::{Result, bail};

use super::error::GenerateError;
use super::glsl::{Token, find_keyword};
use super::material::Material;
use super::types::{DataType, Rate, ShaderStage, Trait, TraitId};
use super::utils::wildcard_match;

const MAIN_IMAGE: &str = "*void*mainImage*(*out*vec4*,*in*vec2*)*";

/// Shadertoy's fragment origin is the bottom-left corner.
const FRAGCOORD: &str = "FRAGCOORD";

struct Global {
    name: &'static str,
    key: TraitId,
    /// Shadertoy-typed expression around the bound input (`$INPUT`).
    wrap: &'static str,
}

const GLOBALS: [Global; 5] = [
    Global {
        name: "iTime",
        key: TraitId::Time,
        wrap: "$INPUT",
    },
    Global {
        name: "iResolution",
        key: TraitId::Resolution,
        wrap: "vec3($INPUT, 1.0)",
    },
    Global {
        name: "iChannel0",
        key: TraitId::Texture,
        wrap: "$INPUT",
    },
    Global {
        name: "iView",
        key: TraitId::View,
        wrap: "$INPUT",
    },
    Global {
        name: "iMouse",
        key: TraitId::MousePosition,
        wrap: "vec4($INPUT, 0.0, 0.0)",
    },
];

impl Material {
    /// Build a material around Shadertoy fragment code.
    ///
    /// Recognized globals are bound to material inputs through `#define`s;
    /// anything else the snippet uses is left for the GLSL compiler to
    /// report. Call [`Material::generate`] afterwards as usual.
    pub fn from_shadertoy(code: &str) -> Result<Material> {
        if !wildcard_match(MAIN_IMAGE, code) {
            bail!(GenerateError::Config(
                "shadertoy code must define void mainImage(out vec4, in vec2)".to_string()
            ));
        }
        let stage = ShaderStage::Pixel;
        let mut mat = Material::new(Rate::Pixel);

        let resolution = mat.add_input(Rate::Pixel, &Trait::new(TraitId::Resolution), false)?;
        mat.define(
            stage,
            &format!("{FRAGCOORD} vec2(gl_FragCoord.x, {resolution}.y - gl_FragCoord.y)"),
        );
        for global in &GLOBALS {
            if find_keyword(code, global.name).is_none() {
                continue;
            }
            let input = mat.add_input(Rate::Pixel, &Trait::new(global.key), false)?;
            mat.define(stage, &format!("{} {}", global.name, global.wrap.replace("$INPUT", &input)));
            log::debug!("shadertoy global {} bound to {input}", global.name);
        }

        mat.commit(stage, Token::Functions, code.trim())?;
        let color = mat.add_output(
            Rate::Pixel,
            &Trait::typed(TraitId::Color, DataType::Vec4),
            false,
        )?;
        mat.mark_wired(Rate::Pixel, &color);
        mat.commit(stage, Token::Texturize, &format!("mainImage({color}, {FRAGCOORD});"))?;
        Ok(mat)
    }
}
