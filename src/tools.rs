//! Wrappers around the two external compilers. Both are black boxes to
//! us: glslangValidator handles preprocessing and SPIR-V generation,
//! spirv-cross turns the SPIR-V into MSL. A non-zero exit from either
//! becomes an error carrying the tool's stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, bail};
use log::*;

use crate::manifest::ShaderStage;

pub const GLSLANG_ENV: &str = "GLSLANGVALIDATOR";
pub const SPIRV_CROSS_ENV: &str = "SPIRV_CROSS";

/// The Metal path compiles with the framebuffer origin flipped; the gl3
/// path does not get this define.
pub const ORIGIN_DEFINE: &str = "-DFG_ORIGIN_UPPER_LEFT=1";

/// MSL 2.1, in spirv-cross's packed-decimal form.
pub const MSL_VERSION: &str = "020100";

pub fn glslang_binary() -> PathBuf {
    std::env::var_os(GLSLANG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("glslangValidator"))
}

pub fn spirv_cross_binary() -> PathBuf {
    std::env::var_os(SPIRV_CROSS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("spirv-cross"))
}

/// Whether a tool binary answers `--version`. Used for diagnostics
/// before a build starts, not as a gate.
pub fn probe(binary: &Path) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn run(command: &mut Command) -> anyhow::Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("running {command:?}");

    let output = command
        .output()
        .with_context(|| format!("failed to run {program}"))?;

    if !output.status.success() {
        bail!(
            "{program} exited with {}:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }

    Ok(output)
}

/// Preprocessor-only pass; stdout is the expanded GLSL.
pub fn preprocess(
    glslang: &Path,
    source: &Path,
    stage: ShaderStage,
    include_dir: &Path,
) -> anyhow::Result<String> {
    let output = run(Command::new(glslang)
        .arg("--auto-map-locations")
        .arg(format!("-I{}", include_dir.display()))
        .args(["-S", stage.glslang_stage()])
        .arg("-E")
        .arg(source))?;

    let text = String::from_utf8(output.stdout)
        .with_context(|| format!("preprocessed output of {} was not utf-8", source.display()))?;

    // glslang echoes the input name, exactly as passed, ahead of the
    // preprocessed text
    let as_passed = source.to_string_lossy();
    let file_name = source.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let first_line = text.lines().next();
    if first_line == Some(as_passed.as_ref())
        || (!file_name.is_empty() && first_line == Some(file_name))
    {
        let rest = match text.split_once('\n') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        };
        return Ok(rest);
    }

    Ok(text)
}

/// SPIR-V generation under OpenGL semantics (`-G`), with the
/// origin-convention define the Metal backend expects.
pub fn compile_spirv(
    glslang: &Path,
    source: &Path,
    stage: ShaderStage,
    include_dir: &Path,
    spirv_out: &Path,
) -> anyhow::Result<()> {
    run(Command::new(glslang)
        .arg("--auto-map-locations")
        .arg(format!("-I{}", include_dir.display()))
        .arg(ORIGIN_DEFINE)
        .arg("-G")
        .args(["-S", stage.glslang_stage()])
        .arg("-o")
        .arg(spirv_out)
        .arg(source))?;
    Ok(())
}

/// Cross-compiles a SPIR-V binary to MSL; stdout is the MSL text.
pub fn cross_compile_msl(spirv_cross: &Path, spirv: &Path) -> anyhow::Result<String> {
    let output = run(Command::new(spirv_cross)
        .arg("--msl")
        .args(["--msl-version", MSL_VERSION])
        .arg("--msl-argument-buffers")
        .arg(spirv))?;

    String::from_utf8(output.stdout)
        .with_context(|| format!("MSL output for {} was not utf-8", spirv.display()))
}
