use std::borrow::Cow;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::ShaderStage;

use crate::types::ShaderPair;

/// Name the user's `main` is renamed to inside the wrapped fragment shader.
const USER_ENTRY_POINT: &str = "fragview_user_main";

/// Loose uniforms the sketch conventions declare; they are served from the UBO.
const BUILTIN_UNIFORMS: [&str; 5] = [
    "u_time",
    "u_resolution",
    "u_time_delta",
    "u_frame",
    "modelViewProjectionMatrix",
];

/// Mesh attributes besides `position` and their locations. Must match the
/// vertex layout in `gpu::pipeline`.
const MESH_ATTRIBUTES: [(&str, u32); 3] = [("color", 1), ("normal", 2), ("texcoord", 3)];

/// A vertex/fragment pair rewritten into Vulkan-style GLSL 450.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    vertex: String,
    fragment: String,
}

impl ShaderProgram {
    /// Reads both stages from disk and wraps them.
    pub fn load(pair: &ShaderPair) -> Result<Self> {
        let vertex = fs::read_to_string(&pair.vertex).with_context(|| {
            format!("failed to read vertex shader at {}", pair.vertex.display())
        })?;
        let fragment = fs::read_to_string(&pair.fragment).with_context(|| {
            format!(
                "failed to read fragment shader at {}",
                pair.fragment.display()
            )
        })?;
        Self::from_sources(&vertex, &fragment).with_context(|| {
            format!(
                "failed to prepare shader pair {} / {}",
                pair.vertex.display(),
                pair.fragment.display()
            )
        })
    }

    pub fn from_sources(vertex: &str, fragment: &str) -> Result<Self> {
        Ok(Self {
            vertex: wrap_vertex_shader(vertex)?,
            fragment: wrap_fragment_shader(fragment)?,
        })
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment
    }

    /// Runs both wrapped stages through naga's GLSL front-end and validator.
    ///
    /// This needs no GPU, which makes it usable from `fragview check` and tests.
    pub fn validate(&self) -> Result<()> {
        for (stage, label, source) in [
            (ShaderStage::Vertex, "vertex", self.vertex.as_str()),
            (ShaderStage::Fragment, "fragment", self.fragment.as_str()),
        ] {
            let module = Frontend::default()
                .parse(&Options::from(stage), source)
                .map_err(|err| anyhow!("{label} shader failed to parse: {err:?}"))?;
            Validator::new(ValidationFlags::all(), Capabilities::all())
                .validate(&module)
                .map_err(|err| anyhow!("{label} shader failed validation: {err:?}"))?;
        }
        Ok(())
    }

    /// Writes the wrapped sources to `dir` to aid debugging compile failures.
    pub fn dump(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory {}", dir.display()))?;
        for (name, source) in [
            ("wrapped.vert", &self.vertex),
            ("wrapped.frag", &self.fragment),
        ] {
            let path = dir.join(name);
            fs::write(&path, source)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        tracing::info!(dir = %dir.display(), "dumped wrapped shader sources");
        Ok(())
    }

    pub(crate) fn create_modules(
        &self,
        device: &wgpu::Device,
    ) -> Result<(wgpu::ShaderModule, wgpu::ShaderModule)> {
        let vertex = create_module(device, ShaderStage::Vertex, "sketch vertex", &self.vertex)?;
        let fragment = create_module(
            device,
            ShaderStage::Fragment,
            "sketch fragment",
            &self.fragment,
        )?;
        Ok((vertex, fragment))
    }
}

/// Compiles one wrapped stage, surfacing validation errors instead of panicking.
fn create_module(
    device: &wgpu::Device,
    stage: ShaderStage,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        bail!("{label} shader failed to compile: {err}");
    }
    Ok(module)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Vertex,
    Fragment,
}

/// Produces a self-contained GLSL 450 vertex shader from sketch code.
///
/// The `#version` line and loose built-in uniforms are dropped, the `position`
/// attribute is bound to location 0, the other mesh attributes to their fixed
/// locations and `out`/`varying` declarations receive sequential locations.
fn wrap_vertex_shader(source: &str) -> Result<String> {
    let rewritten = rewrite_declarations(source, Stage::Vertex)?;
    if find_entry_point(&rewritten.body).is_none() {
        bail!("vertex shader has no `void main()` entry point");
    }
    Ok(format!(
        "{UNIFORM_BLOCK}{VERTEX_PRELUDE}\n#line 1\n{body}",
        body = rewritten.body
    ))
}

/// Produces a self-contained GLSL 450 fragment shader from sketch code.
///
/// Besides the declaration rewrites, the user `main` is renamed and invoked
/// from an injected entry point that remaps `gl_FragCoord` to a bottom-left
/// origin. Shaders without an `out` declaration get one aliased to
/// `gl_FragColor`.
fn wrap_fragment_shader(source: &str) -> Result<String> {
    let rewritten = rewrite_declarations(source, Stage::Fragment)?;
    let entry = find_entry_point(&rewritten.body)
        .ok_or_else(|| anyhow!("fragment shader has no `void main()` entry point"))?;
    let body = format!(
        "{}{USER_ENTRY_POINT}{}",
        &rewritten.body[..entry],
        &rewritten.body[entry + "main".len()..]
    );
    let output = if rewritten.has_output {
        ""
    } else {
        FRAG_COLOR_OUTPUT
    };
    Ok(format!(
        "{UNIFORM_BLOCK}{FRAGMENT_PRELUDE}{output}\n#line 1\n{body}{FRAGMENT_FOOTER}"
    ))
}

struct Rewritten {
    body: String,
    has_output: bool,
}

/// Rewrites declarations line by line. Dropped lines are kept as blanks so that
/// compiler diagnostics still point at the user's line numbers.
///
/// Only global statements terminated by `;` are considered declarations;
/// parameter lists and function bodies pass through untouched.
fn rewrite_declarations(source: &str, stage: Stage) -> Result<Rewritten> {
    let code = code_only(source);
    let mut body = String::with_capacity(source.len());
    let mut skipped_version = false;
    let mut next_location = 0u32;
    let mut has_output = false;
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    for (line, code_line) in source.lines().zip(code.lines()) {
        let global = brace_depth == 0 && paren_depth == 0;
        for byte in code_line.bytes() {
            match byte {
                b'{' => brace_depth += 1,
                b'}' => brace_depth = brace_depth.saturating_sub(1),
                b'(' => paren_depth += 1,
                b')' => paren_depth = paren_depth.saturating_sub(1),
                _ => {}
            }
        }

        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            body.push('\n');
            continue;
        }

        let statement = code_line.trim();
        if !global || !statement.ends_with(';') {
            body.push_str(line);
            body.push('\n');
            continue;
        }

        if let Some(rest) = strip_keyword(statement, "uniform") {
            if declared_name(rest).is_some_and(|name| BUILTIN_UNIFORMS.contains(&name)) {
                body.push('\n');
                continue;
            }
        }

        let inbound = strip_keyword(statement, "in")
            .or_else(|| strip_keyword(statement, "attribute"))
            .or_else(|| {
                (stage == Stage::Fragment)
                    .then(|| strip_keyword(statement, "varying"))
                    .flatten()
            });
        let outbound = strip_keyword(statement, "out").or_else(|| {
            (stage == Stage::Vertex)
                .then(|| strip_keyword(statement, "varying"))
                .flatten()
        });

        match (stage, inbound, outbound) {
            (Stage::Vertex, Some(rest), _) => {
                if declared_name(rest) != Some("position") {
                    let location = vertex_attribute_location(rest)?;
                    body.push_str(&format!("layout(location = {location}) in {rest}"));
                }
                body.push('\n');
                continue;
            }
            (Stage::Vertex, _, Some(rest)) => {
                body.push_str(&format!("layout(location = {next_location}) out {rest}\n"));
                next_location += 1;
                continue;
            }
            (Stage::Fragment, Some(rest), _) => {
                body.push_str(&format!("layout(location = {next_location}) in {rest}\n"));
                next_location += 1;
                continue;
            }
            (Stage::Fragment, _, Some(rest)) => {
                body.push_str(&format!("layout(location = 0) out {rest}\n"));
                has_output = true;
                continue;
            }
            _ => {}
        }

        body.push_str(line);
        body.push('\n');
    }

    Ok(Rewritten { body, has_output })
}

/// Location of a mesh attribute other than `position`. The vertex buffer
/// supplies floats, so the declaration must use a float type.
fn vertex_attribute_location(declaration: &str) -> Result<u32> {
    let name = declared_name(declaration).unwrap_or_default();
    let Some(&(_, location)) = MESH_ATTRIBUTES
        .iter()
        .find(|(attribute, _)| *attribute == name)
    else {
        bail!(
            "vertex input `{name}` is not supplied; available attributes are position, color, normal and texcoord"
        );
    };
    if !matches!(
        declared_type(declaration),
        Some("float" | "vec2" | "vec3" | "vec4")
    ) {
        bail!("vertex input `{name}` must be declared as float, vec2, vec3 or vec4");
    }
    Ok(location)
}

/// Returns the text after `keyword` when the line starts with it as a whole word.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Name declared by a `<qualifiers> <type> <name>[;]` statement.
fn declared_name(rest: &str) -> Option<&str> {
    let statement = rest.split(';').next()?;
    let name = statement.split_whitespace().last()?;
    name.split('[').next()
}

/// Type of a `<qualifiers> <type> <name>[;]` statement.
fn declared_type(rest: &str) -> Option<&str> {
    let statement = rest.split(';').next()?;
    let mut tokens = statement.split_whitespace().rev();
    tokens.next()?;
    tokens.next()
}

fn is_identifier(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Copy of `source` with comments and preprocessor lines blanked to spaces.
///
/// Byte offsets and line breaks are unchanged, so positions found in the
/// result index straight into `source`.
fn code_only(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut code = bytes.to_vec();
    let mut index = 0;
    while index < bytes.len() {
        match (bytes[index], bytes.get(index + 1)) {
            (b'/', Some(b'/')) => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    code[index] = b' ';
                    index += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let end = source[index + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |offset| index + 2 + offset + 2);
                for byte in &mut code[index..end] {
                    if *byte != b'\n' {
                        *byte = b' ';
                    }
                }
                index = end;
            }
            _ => index += 1,
        }
    }

    for line in code.split_mut(|byte| *byte == b'\n') {
        if line.iter().find(|byte| !byte.is_ascii_whitespace()) == Some(&b'#') {
            line.fill(b' ');
        }
    }
    String::from_utf8_lossy(&code).into_owned()
}

/// Byte offset of the `main` identifier in the first `void main(` definition,
/// ignoring comments and preprocessor lines.
fn find_entry_point(source: &str) -> Option<usize> {
    let code = code_only(source);
    let bytes = code.as_bytes();
    let mut search = 0;
    while let Some(found) = code[search..].find("main") {
        let start = search + found;
        let end = start + "main".len();
        search = end;

        let isolated = (start == 0 || !is_identifier(bytes[start - 1]))
            && (end >= bytes.len() || !is_identifier(bytes[end]));
        if !isolated {
            continue;
        }

        let prefix = code[..start].trim_end();
        let Some(before_void) = prefix.strip_suffix("void") else {
            continue;
        };
        if before_void.bytes().last().is_some_and(is_identifier) {
            continue;
        }
        if !code[end..].trim_start().starts_with('(') {
            continue;
        }
        return Some(start);
    }
    None
}

/// Uniform block shared by both stages. The layout must match
/// [`FrameUniforms`](crate::gpu::FrameUniforms).
const UNIFORM_BLOCK: &str = r"#version 450
layout(std140, set = 0, binding = 0) uniform FragviewParams {
    mat4 _modelViewProjectionMatrix;
    vec2 _u_resolution;
    float _u_time;
    float _u_time_delta;
    int _u_frame;
} fragview_ubo;

#define modelViewProjectionMatrix fragview_ubo._modelViewProjectionMatrix
#define u_resolution fragview_ubo._u_resolution
#define u_time fragview_ubo._u_time
#define u_time_delta fragview_ubo._u_time_delta
#define u_frame fragview_ubo._u_frame
";

const VERTEX_PRELUDE: &str = r"
layout(location = 0) in vec4 position;
";

const FRAGMENT_PRELUDE: &str = r"
vec4 fragview_frag_coord;
#define gl_FragCoord fragview_frag_coord
";

const FRAG_COLOR_OUTPUT: &str = r"
layout(location = 0) out vec4 fragview_frag_color;
#define gl_FragColor fragview_frag_color
";

/// Entry point that captures the builtin `gl_FragCoord`, flips it to a
/// bottom-left origin and runs the sketch's own `main`.
const FRAGMENT_FOOTER: &str = r"
void main() {
    #undef gl_FragCoord
    vec4 builtin_frag_coord = gl_FragCoord;
    fragview_frag_coord = vec4(
        builtin_frag_coord.x,
        u_resolution.y - builtin_frag_coord.y,
        builtin_frag_coord.z,
        builtin_frag_coord.w
    );
    fragview_user_main();
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const SKETCH_VERTEX: &str = include_str!("../../../shaders/shader.vert");
    const SKETCH_FRAGMENT: &str = include_str!("../../../shaders/shader.frag");

    #[test]
    fn wrap_strips_builtin_uniforms() {
        let wrapped = wrap_fragment_shader(SKETCH_FRAGMENT).unwrap();
        assert!(!wrapped.contains("uniform float u_time;"));
        assert!(!wrapped.contains("uniform vec2 u_resolution;"));
        assert!(!wrapped.contains("#version 150"));
        assert!(wrapped.starts_with("#version 450"));
        assert!(wrapped.contains("layout(location = 0) out vec4 outputColor;"));
        assert!(wrapped.contains("void fragview_user_main()"));
        assert!(!wrapped.contains("fragview_frag_color"));
    }

    #[test]
    fn wrap_keeps_user_uniforms_and_line_count() {
        let source = "#version 150\nuniform float u_time;\nuniform float u_timeScale;\nvoid main() {}\n";
        let rewritten = rewrite_declarations(source, Stage::Fragment).unwrap();
        assert_eq!(rewritten.body.lines().count(), source.lines().count());
        assert!(rewritten.body.contains("uniform float u_timeScale;"));
        assert!(!rewritten.body.contains("uniform float u_time;"));
    }

    #[test]
    fn vertex_wrap_binds_position_and_numbers_varyings() {
        let source = r"#version 120
attribute vec4 position;
varying vec2 v_uv;
varying float v_shade;
void main() {
    v_uv = position.xy;
    v_shade = 1.0;
    gl_Position = modelViewProjectionMatrix * position;
}
";
        let wrapped = wrap_vertex_shader(source).unwrap();
        assert!(wrapped.contains("layout(location = 0) in vec4 position;"));
        assert!(!wrapped.contains("attribute vec4 position;"));
        assert!(wrapped.contains("layout(location = 0) out vec2 v_uv;"));
        assert!(wrapped.contains("layout(location = 1) out float v_shade;"));
        assert!(wrapped.contains("void main()"));

        let program = ShaderProgram::from_sources(source, SKETCH_FRAGMENT).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn vertex_mesh_attributes_get_fixed_locations() {
        let source = r"#version 150
uniform mat4 modelViewProjectionMatrix;
in vec4 position;
in vec2 texcoord;
in vec4 color;
out vec2 v_uv;
out vec4 v_color;
void main() {
    v_uv = texcoord;
    v_color = color;
    gl_Position = modelViewProjectionMatrix * position;
}
";
        let wrapped = wrap_vertex_shader(source).unwrap();
        assert!(wrapped.contains("layout(location = 3) in vec2 texcoord;"));
        assert!(wrapped.contains("layout(location = 1) in vec4 color;"));
        assert!(wrapped.contains("layout(location = 0) out vec2 v_uv;"));
        assert!(wrapped.contains("layout(location = 1) out vec4 v_color;"));

        let program = ShaderProgram::from_sources(source, SKETCH_FRAGMENT).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn unsupplied_vertex_inputs_are_rejected() {
        let unknown = "in vec3 tangent;\nvoid main() { gl_Position = vec4(tangent, 1.0); }\n";
        let err = wrap_vertex_shader(unknown).unwrap_err();
        assert!(err.to_string().contains("`tangent` is not supplied"), "{err}");

        let integer = "in ivec2 texcoord;\nvoid main() { gl_Position = vec4(texcoord, 0, 1); }\n";
        let err = wrap_vertex_shader(integer).unwrap_err();
        assert!(err.to_string().contains("float, vec2, vec3 or vec4"), "{err}");
    }

    #[test]
    fn parameter_lists_are_not_rewritten() {
        let source = r"#version 150
out vec4 outputColor;
void shade(
    out vec4 fragColor,
    in vec2 fragCoord
) {
    fragColor = vec4(fragCoord / u_resolution, 0.0, 1.0);
}
void main() {
    vec4 color;
    shade(color, gl_FragCoord.xy);
    outputColor = color;
}
";
        let wrapped = wrap_fragment_shader(source).unwrap();
        assert!(wrapped.contains("\n    out vec4 fragColor,\n"));
        assert!(wrapped.contains("\n    in vec2 fragCoord\n"));
        assert!(wrapped.contains("layout(location = 0) out vec4 outputColor;"));

        let program = ShaderProgram::from_sources(SKETCH_VERTEX, source).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn fragment_wrap_aliases_gl_frag_color() {
        let source = r"varying vec2 v_uv;
void main(void)
{
    gl_FragColor = vec4(v_uv, 0.0, 1.0);
}
";
        let wrapped = wrap_fragment_shader(source).unwrap();
        assert!(wrapped.contains("layout(location = 0) in vec2 v_uv;"));
        assert!(wrapped.contains("#define gl_FragColor fragview_frag_color"));
        assert!(wrapped.contains("void fragview_user_main(void)"));

        let program = ShaderProgram::from_sources(SKETCH_VERTEX, source).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn commented_entry_points_are_skipped() {
        assert_eq!(find_entry_point("// void main()\nvoid main() {}"), Some(20));
        assert_eq!(find_entry_point("/* void main() {} */ void main() {}"), Some(26));
        assert_eq!(find_entry_point("#define ENTRY void main()\n"), None);

        let source = r"#version 150
out vec4 outputColor;
// helper used by void main() below
vec4 tint() { return vec4(0.5); }
/*
void main() { outputColor = vec4(1.0); }
*/
void main() {
    outputColor = tint();
}
";
        let wrapped = wrap_fragment_shader(source).unwrap();
        assert!(wrapped.contains("// helper used by void main() below"));
        assert!(wrapped.contains("void fragview_user_main() {\n    outputColor = tint();"));

        let program = ShaderProgram::from_sources(SKETCH_VERTEX, source).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn missing_entry_point_is_rejected() {
        let err = wrap_fragment_shader("void mainImage(out vec4 c, in vec2 p) {}").unwrap_err();
        assert!(err.to_string().contains("entry point"));
        assert!(wrap_vertex_shader("float domain() { return 1.0; }").is_err());
    }

    #[test]
    fn entry_point_search_respects_word_boundaries() {
        assert_eq!(find_entry_point("void main() {}"), Some(5));
        assert_eq!(find_entry_point("void  main\n(void) {}"), Some(6));
        assert_eq!(find_entry_point("int main() {}"), None);
        assert_eq!(find_entry_point("void domain() {}"), None);
        assert_eq!(find_entry_point("void mainly() {}"), None);
        assert_eq!(find_entry_point("avoid main() {}"), None);
    }

    #[test]
    fn declared_names_ignore_qualifiers_and_arrays() {
        assert_eq!(declared_name("highp float u_time;"), Some("u_time"));
        assert_eq!(declared_name("vec2 u_resolution ;"), Some("u_resolution"));
        assert_eq!(declared_name("float weights[4];"), Some("weights"));
    }

    #[test]
    fn default_sketch_shaders_pass_naga_validation() {
        let program = ShaderProgram::from_sources(SKETCH_VERTEX, SKETCH_FRAGMENT).unwrap();
        program.validate().unwrap();
    }

    #[test]
    fn dump_writes_both_stages() {
        let dir = tempfile::tempdir().unwrap();
        let program = ShaderProgram::from_sources(SKETCH_VERTEX, SKETCH_FRAGMENT).unwrap();
        program.dump(dir.path()).unwrap();
        let vertex = fs::read_to_string(dir.path().join("wrapped.vert")).unwrap();
        let fragment = fs::read_to_string(dir.path().join("wrapped.frag")).unwrap();
        assert_eq!(vertex, program.vertex_source());
        assert_eq!(fragment, program.fragment_source());
    }
}
