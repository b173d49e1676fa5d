//! Drives the two transforms over the enumerated source set. Each
//! output depends on its single source file plus all shared includes;
//! an output is rebuilt only when missing or older than a dependency.
//! Targets write disjoint files, so there is nothing to lock.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use log::*;
use serde::Serialize;

use crate::manifest::{self, SHADERS, ShaderSource};
use crate::normalize;
use crate::tools;

pub struct Config {
    /// where the `.glsl` sources and includes live
    pub shaders_dir: PathBuf,
    /// distribution root; outputs land in `gl3/` and `metal/` under it
    pub target_dir: PathBuf,
    /// scratch root for SPIR-V intermediates
    pub build_dir: PathBuf,
    pub glslang: PathBuf,
    pub spirv_cross: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

        let target_dir = std::env::var_os("TARGET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| manifest_dir.join("resources").join("shaders"));

        Config {
            shaders_dir: manifest_dir.join("shaders"),
            target_dir,
            build_dir: manifest_dir.join("build"),
            glslang: tools::glslang_binary(),
            spirv_cross: tools::spirv_cross_binary(),
        }
    }
}

/// Builds every stale output. Stops at the first failure, after
/// discarding whatever partial file that target produced.
pub fn build_all(config: &Config) -> anyhow::Result<()> {
    let includes = manifest::include_paths(&config.shaders_dir);

    let mut rebuilt = 0;
    for shader in SHADERS {
        rebuilt += build_shader(config, shader, &includes)?;
    }

    if rebuilt == 0 {
        info!("all shader outputs up to date");
    } else {
        info!("rebuilt {rebuilt} shader outputs");
    }
    Ok(())
}

fn build_shader(
    config: &Config,
    shader: &ShaderSource,
    includes: &[PathBuf],
) -> anyhow::Result<usize> {
    let source = shader.source_path(&config.shaders_dir);
    let mut rebuilt = 0;

    let gl3_out = shader.gl3_path(&config.target_dir);
    if is_stale(&gl3_out, &source, includes)? {
        debug!("emitting {}", gl3_out.display());
        emit_gl3(config, shader, &source, &gl3_out)
            .map_err(|err| discard_partial(&gl3_out, err))
            .with_context(|| format!("building {}", gl3_out.display()))?;
        rebuilt += 1;
    }

    let metal_out = shader.metal_path(&config.target_dir);
    if is_stale(&metal_out, &source, includes)? {
        debug!("emitting {}", metal_out.display());
        emit_metal(config, shader, &source, &metal_out)
            .map_err(|err| discard_partial(&metal_out, err))
            .with_context(|| format!("building {}", metal_out.display()))?;
        rebuilt += 1;
    }

    Ok(rebuilt)
}

fn emit_gl3(
    config: &Config,
    shader: &ShaderSource,
    source: &Path,
    out: &Path,
) -> anyhow::Result<()> {
    ensure_parent(out)?;
    let preprocessed =
        tools::preprocess(&config.glslang, source, shader.stage, &config.shaders_dir)?;
    write_file(out, normalize::gl3_source(&preprocessed))
}

fn emit_metal(
    config: &Config,
    shader: &ShaderSource,
    source: &Path,
    out: &Path,
) -> anyhow::Result<()> {
    let spirv = shader.spirv_path(&config.build_dir);
    ensure_parent(&spirv)?;
    ensure_parent(out)?;

    tools::compile_spirv(
        &config.glslang,
        source,
        shader.stage,
        &config.shaders_dir,
        &spirv,
    )
    .map_err(|err| discard_partial(&spirv, err))?;

    // past this point a failure invalidates the intermediate too
    let msl = tools::cross_compile_msl(&config.spirv_cross, &spirv)
        .map_err(|err| discard_partial(&spirv, err))?;
    write_file(out, normalize::metal_source(&msl)).map_err(|err| discard_partial(&spirv, err))
}

/// A failed target must leave no output behind, including a stale file
/// from a previous successful build.
fn discard_partial(path: &Path, err: anyhow::Error) -> anyhow::Error {
    if fs::remove_file(path).is_ok() {
        warn!("discarded {}", path.display());
    }
    err
}

fn is_stale(output: &Path, source: &Path, includes: &[PathBuf]) -> anyhow::Result<bool> {
    let Some(output_time) = mtime(output)? else {
        return Ok(true);
    };

    let source_time =
        mtime(source)?.with_context(|| format!("missing shader source {}", source.display()))?;
    if source_time > output_time {
        return Ok(true);
    }

    for include in includes {
        let include_time = mtime(include)?
            .with_context(|| format!("missing shader include {}", include.display()))?;
        if include_time > output_time {
            return Ok(true);
        }
    }

    Ok(false)
}

fn mtime(path: &Path) -> anyhow::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("stat {}", path.display())),
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: String) -> anyhow::Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Removes exactly the enumerated outputs and intermediates. Files that
/// are already gone are not an error; nothing else is touched.
pub fn clean(config: &Config) -> anyhow::Result<()> {
    let mut removed = 0;

    let outputs = manifest::outputs(&config.target_dir)
        .into_iter()
        .chain(manifest::intermediates(&config.build_dir));

    for path in outputs {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed {}", path.display());
                removed += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("removing {}", path.display()));
            }
        }
    }

    info!("removed {removed} generated files");
    Ok(())
}

/// The pipeline's resolved internal variables, for the diagnostic
/// CLI target.
#[derive(Debug, Serialize)]
pub struct PipelineVars {
    pub shaders: Vec<String>,
    pub includes: Vec<String>,
    pub shaders_dir: PathBuf,
    pub target_dir: PathBuf,
    pub build_dir: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub glslang: PathBuf,
    pub spirv_cross: PathBuf,
    pub msl_version: &'static str,
}

pub fn variables(config: &Config) -> PipelineVars {
    PipelineVars {
        shaders: SHADERS.iter().map(|shader| shader.file_name()).collect(),
        includes: manifest::INCLUDES.iter().map(|s| s.to_string()).collect(),
        shaders_dir: config.shaders_dir.clone(),
        target_dir: config.target_dir.clone(),
        build_dir: config.build_dir.clone(),
        outputs: manifest::outputs(&config.target_dir),
        glslang: config.glslang.clone(),
        spirv_cross: config.spirv_cross.clone(),
        msl_version: tools::MSL_VERSION,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;

    use crate::normalize::{GLSL_VERSION_HEADER, PROVENANCE_COMMENT};

    struct TestPipeline {
        root: PathBuf,
        config: Config,
        tool_log: PathBuf,
    }

    impl Drop for TestPipeline {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn write_stub(path: &Path, script: &str) {
        fs::write(path, script).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Stands up a pipeline rooted in a temp dir, with stub scripts in
    /// place of the real compilers. The glslang stub cats the source
    /// back for `-E` and writes a placeholder binary for `-o`; the
    /// spirv-cross stub prints a canned MSL snippet. Both append their
    /// argv to a log so tests can count invocations.
    fn stub_pipeline() -> TestPipeline {
        let root = std::env::temp_dir().join(format!("filigree-shaders-{}", uuid::Uuid::new_v4()));
        let shaders_dir = root.join("shaders");
        fs::create_dir_all(&shaders_dir).unwrap();

        for shader in SHADERS {
            let body = "#version 330\n#line 1\nvoid main() {\n}\n";
            fs::write(shader.source_path(&shaders_dir), body).unwrap();
        }
        for include in manifest::INCLUDES {
            fs::write(shaders_dir.join(include), "// shared\n").unwrap();
        }

        let tool_log = root.join("tools.log");

        let glslang = root.join("glslang-stub");
        write_stub(
            &glslang,
            &format!(
                r#"#!/bin/sh
echo "glslang $@" >> "{log}"
out=""
prev=""
last=""
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then out="$arg"; fi
    prev="$arg"
    last="$arg"
done
case " $* " in
*" -E "*) echo "$last"; cat "$last"; exit 0;;
esac
printf 'spirv' > "$out"
"#,
                log = tool_log.display()
            ),
        );

        let spirv_cross = root.join("spirv-cross-stub");
        write_stub(
            &spirv_cross,
            &format!(
                r##"#!/bin/sh
echo "spirv-cross $@" >> "{log}"
echo "#include <metal_stdlib>"
echo "using namespace metal;"
"##,
                log = tool_log.display()
            ),
        );

        let config = Config {
            shaders_dir,
            target_dir: root.join("resources").join("shaders"),
            build_dir: root.join("build"),
            glslang,
            spirv_cross,
        };

        TestPipeline {
            root,
            config,
            tool_log,
        }
    }

    /// Puts later writes in a strictly newer mtime tick, even on
    /// filesystems with coarse timestamps.
    fn next_mtime_tick() {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    fn tool_invocations(pipeline: &TestPipeline) -> usize {
        match fs::read_to_string(&pipeline.tool_log) {
            Ok(log) => log.lines().count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn build_produces_every_output() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();

        for path in manifest::outputs(&pipeline.config.target_dir) {
            assert!(path.is_file(), "missing {}", path.display());
        }
        for path in manifest::intermediates(&pipeline.config.build_dir) {
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    #[test]
    fn gl3_outputs_are_normalized() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();

        for shader in SHADERS {
            let emitted =
                fs::read_to_string(shader.gl3_path(&pipeline.config.target_dir)).unwrap();
            let mut lines = emitted.lines();

            assert_eq!(lines.next(), Some(GLSL_VERSION_HEADER));
            assert_eq!(lines.next(), Some(PROVENANCE_COMMENT));
            for line in lines {
                assert!(!line.trim_start().starts_with("#version"));
                assert!(!line.trim_start().starts_with("#line"));
            }

            // the stub echoes the source path as passed, like the real
            // tool; it must not leak into the output
            let source = shader.source_path(&pipeline.config.shaders_dir);
            assert!(
                !emitted.contains(&source.display().to_string()),
                "echoed path leaked into {}",
                shader.file_name()
            );
        }
    }

    #[test]
    fn metal_outputs_carry_provenance() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();

        for shader in SHADERS {
            let emitted =
                fs::read_to_string(shader.metal_path(&pipeline.config.target_dir)).unwrap();
            assert_eq!(emitted.lines().next(), Some(PROVENANCE_COMMENT));
        }
    }

    #[test]
    fn fresh_outputs_are_not_rebuilt() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();

        let after_first = tool_invocations(&pipeline);
        build_all(&pipeline.config).unwrap();
        assert_eq!(tool_invocations(&pipeline), after_first);
    }

    #[test]
    fn touched_include_triggers_rebuild() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();
        let after_first = tool_invocations(&pipeline);

        // rewrite bumps the include's mtime past the outputs
        next_mtime_tick();
        let include = pipeline.config.shaders_dir.join(manifest::INCLUDES[0]);
        fs::write(&include, "// shared, edited\n").unwrap();

        build_all(&pipeline.config).unwrap();
        assert!(tool_invocations(&pipeline) > after_first);
    }

    #[test]
    fn failed_tool_leaves_no_output() {
        let pipeline = stub_pipeline();
        write_stub(&pipeline.config.glslang, "#!/bin/sh\nexit 1\n");

        // a stale leftover from an earlier build must go away too
        let first = &SHADERS[0];
        let gl3_out = first.gl3_path(&pipeline.config.target_dir);
        fs::create_dir_all(gl3_out.parent().unwrap()).unwrap();
        fs::write(&gl3_out, "stale\n").unwrap();

        // bump the source past the leftover so the target is stale
        next_mtime_tick();
        let source = first.source_path(&pipeline.config.shaders_dir);
        fs::write(&source, "#version 330\nvoid main() {\n}\n").unwrap();

        assert!(build_all(&pipeline.config).is_err());
        assert!(!gl3_out.exists());
    }

    #[test]
    fn failed_cross_compile_discards_the_metal_file() {
        let pipeline = stub_pipeline();
        write_stub(&pipeline.config.spirv_cross, "#!/bin/sh\nexit 1\n");

        let first = &SHADERS[0];
        let metal_out = first.metal_path(&pipeline.config.target_dir);
        fs::create_dir_all(metal_out.parent().unwrap()).unwrap();
        fs::write(&metal_out, "stale\n").unwrap();

        next_mtime_tick();
        let source = first.source_path(&pipeline.config.shaders_dir);
        fs::write(&source, "#version 330\nvoid main() {\n}\n").unwrap();

        assert!(build_all(&pipeline.config).is_err());
        assert!(!metal_out.exists());

        // the intermediate is invalidated along with the output
        let spirv = first.spirv_path(&pipeline.config.build_dir);
        assert!(!spirv.exists());
    }

    #[test]
    fn clean_removes_exactly_the_enumerated_set() {
        let pipeline = stub_pipeline();
        build_all(&pipeline.config).unwrap();

        let stray = pipeline.config.target_dir.join("gl3").join("NOTICE");
        fs::write(&stray, "hands off\n").unwrap();

        clean(&pipeline.config).unwrap();

        for path in manifest::outputs(&pipeline.config.target_dir) {
            assert!(!path.exists(), "survived clean: {}", path.display());
        }
        for path in manifest::intermediates(&pipeline.config.build_dir) {
            assert!(!path.exists(), "survived clean: {}", path.display());
        }
        assert!(stray.is_file());
    }

    #[test]
    fn clean_of_a_clean_tree_is_fine() {
        let pipeline = stub_pipeline();
        clean(&pipeline.config).unwrap();
    }

    #[test]
    fn variables_enumerate_the_source_set() {
        let pipeline = stub_pipeline();
        let vars = variables(&pipeline.config);

        assert_eq!(vars.shaders.len(), SHADERS.len());
        assert_eq!(vars.outputs.len(), SHADERS.len() * 2);
        assert!(vars.shaders.contains(&"fill.fs.glsl".to_string()));

        let json = serde_json::to_string(&vars).unwrap();
        assert!(json.contains("fill.fs.glsl"));
    }
}
