//! The fixed enumeration of shader sources and includes, and the
//! output paths derived from them. Nothing here scans directories;
//! the source set is spelled out so that build and clean agree
//! exactly on what the pipeline owns.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// stage name as glslangValidator's `-S` flag expects it
    pub fn glslang_stage(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Fragment => "fs",
        }
    }
}

/// One entry in the fixed source enumeration.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource {
    pub name: &'static str,
    pub stage: ShaderStage,
}

impl ShaderSource {
    const fn vs(name: &'static str) -> Self {
        ShaderSource {
            name,
            stage: ShaderStage::Vertex,
        }
    }

    const fn fs(name: &'static str) -> Self {
        ShaderSource {
            name,
            stage: ShaderStage::Fragment,
        }
    }

    /// e.g. `blit.vs.glsl`
    pub fn file_name(&self) -> String {
        format!("{}.{}.glsl", self.name, self.stage.suffix())
    }

    pub fn source_path(&self, shaders_dir: &Path) -> PathBuf {
        shaders_dir.join(self.file_name())
    }

    pub fn gl3_path(&self, target_dir: &Path) -> PathBuf {
        target_dir.join("gl3").join(self.file_name())
    }

    pub fn metal_path(&self, target_dir: &Path) -> PathBuf {
        let file_name = format!("{}.{}.metal", self.name, self.stage.suffix());
        target_dir.join("metal").join(file_name)
    }

    /// Intermediate SPIR-V fed to the MSL cross-compiler. Derived per
    /// stage, so a vertex shader can never pick up a fragment rule.
    pub fn spirv_path(&self, build_dir: &Path) -> PathBuf {
        let file_name = format!("{}.{}.spv", self.name, self.stage.suffix());
        build_dir.join("metal").join(file_name)
    }
}

pub const SHADERS: &[ShaderSource] = &[
    ShaderSource::vs("blit"),
    ShaderSource::fs("blit"),
    ShaderSource::vs("clear"),
    ShaderSource::fs("clear"),
    ShaderSource::vs("debug_solid"),
    ShaderSource::fs("debug_solid"),
    ShaderSource::vs("debug_texture"),
    ShaderSource::fs("debug_texture"),
    ShaderSource::vs("fill"),
    ShaderSource::fs("fill"),
    ShaderSource::vs("reproject"),
    ShaderSource::fs("reproject"),
    ShaderSource::vs("stencil"),
    ShaderSource::fs("stencil"),
    ShaderSource::vs("tile"),
    ShaderSource::fs("tile"),
];

/// Shared include files. Every output depends on all of these in
/// addition to its own source file.
pub const INCLUDES: &[&str] = &[
    "constants.inc.glsl",
    "sampling.inc.glsl",
    "tile_vertex.inc.glsl",
];

pub fn include_paths(shaders_dir: &Path) -> Vec<PathBuf> {
    INCLUDES
        .iter()
        .map(|file_name| shaders_dir.join(file_name))
        .collect()
}

/// The full set of distribution outputs, in build order.
pub fn outputs(target_dir: &Path) -> Vec<PathBuf> {
    SHADERS
        .iter()
        .flat_map(|shader| [shader.gl3_path(target_dir), shader.metal_path(target_dir)])
        .collect()
}

/// The SPIR-V intermediates under the scratch build dir.
pub fn intermediates(build_dir: &Path) -> Vec<PathBuf> {
    SHADERS
        .iter()
        .map(|shader| shader.spirv_path(build_dir))
        .collect()
}
