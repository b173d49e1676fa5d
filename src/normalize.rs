//! Text post-processing for the emitted shaders. The preprocessed GLSL
//! comes back with the source's own `#version` pragma, `#line` markers,
//! and the include-directive extension pragma still in place; all of
//! those are stripped before the distribution header goes on.

/// Marks every emitted file as machine generated.
pub const PROVENANCE_COMMENT: &str =
    "// Automatically generated from files in filigree/shaders/. Do not edit!";

/// Replaces the version pragma of each GLSL source.
pub const GLSL_VERSION_HEADER: &str = "#version 330";

fn is_stripped_pragma(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("#version")
        || line.starts_with("#line")
        || line.starts_with("#extension GL_GOOGLE_include_directive")
}

/// Blanks stripped pragmas rather than dropping them, so driver
/// diagnostics keep pointing at the right lines.
pub fn strip_pragmas(preprocessed: &str) -> String {
    let mut out = String::with_capacity(preprocessed.len());
    for line in preprocessed.lines() {
        if !is_stripped_pragma(line) {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

pub fn gl3_source(preprocessed: &str) -> String {
    let mut out = String::with_capacity(preprocessed.len() + 128);
    out.push_str(GLSL_VERSION_HEADER);
    out.push('\n');
    out.push_str(PROVENANCE_COMMENT);
    out.push('\n');
    out.push_str(&strip_pragmas(preprocessed));
    out
}

pub fn metal_source(cross_compiled: &str) -> String {
    let mut out = String::with_capacity(cross_compiled.len() + 128);
    out.push_str(PROVENANCE_COMMENT);
    out.push('\n');
    out.push_str(cross_compiled);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
