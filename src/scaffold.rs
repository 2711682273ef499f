//! Scaffold generator: wraps annotated lines into complete generated sources
//! and synthesizes the wrapper unit

use crate::unit::{SourceUnit, BODY_INDENT, GENERATED_EXT, LINE_MARKER};
use std::path::Path;

/// Class name used when the entry file's stem sanitizes to nothing.
const FALLBACK_NAME: &str = "sketch";

/// Sanitized class name for an entry file: the base name without extension,
/// every non-alphanumeric character replaced by `_`. Deterministic, so
/// regenerated temp files overwrite their previous incarnations.
pub fn sanitize_script_name(entry: &Path) -> String {
    let stem = entry
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Prefix for generated file names: the sanitized class name, lowercased.
pub fn generated_prefix(entry: &Path) -> String {
    sanitize_script_name(entry).to_lowercase()
}

/// Render a user-derived unit into its complete compilable source text.
///
/// Layout: original-path comment, class declaration, a body function holding
/// the annotated lines, then the closing glue that binds the class
/// environment and runs the body. Every code line carries its original line
/// number as a trailing `--@ N` marker.
pub fn render_unit(unit: &mut SourceUnit, class_name: &str) {
    let mut out = String::new();
    match &unit.original_path {
        Some(path) => out.push_str(&format!("-- {}\n", path.display())),
        None => out.push_str("--\n"),
    }
    out.push_str(&format!("local class, env = sketch.declare(\"{}\")\n", class_name));
    out.push_str("local body = function()\n");
    for line in &unit.lines {
        out.push_str(&format!(
            "{}{} {} {}\n",
            BODY_INDENT, line.text, LINE_MARKER, line.original_line
        ));
    }
    out.push_str("end\n");
    out.push_str("setfenv(body, env)\n");
    out.push_str("body()\n");
    out.push_str("return class\n");
    unit.rendered = out;
}

/// Synthesize the wrapper unit: the default constructor that creates the
/// instance, binds the class environment back-reference, and runs any
/// initialization statements accumulated during parsing (an extension point,
/// usually empty).
pub fn make_wrapper(file_prefix: &str, class_name: &str, init_statements: &[String]) -> SourceUnit {
    let mut unit = SourceUnit::new(None, format!("{}_wrapper.{}", file_prefix, GENERATED_EXT));
    let mut out = String::new();
    out.push_str("--\n");
    out.push_str(&format!("local class, env = sketch.declare(\"{}\")\n", class_name));
    out.push_str("function class.new()\n");
    out.push_str("    local self = setmetatable({}, { __index = class })\n");
    out.push_str("    sketch.bind(class, self)\n");
    for statement in init_statements {
        out.push_str(&format!("{}{}\n", BODY_INDENT, statement));
    }
    out.push_str("    return self\n");
    out.push_str("end\n");
    out.push_str("return class\n");
    unit.rendered = out;
    unit
}

/// Parse the original-path comment the scaffold writes as line 1 of every
/// generated file. Returns `None` for the wrapper unit's bare `--` marker.
pub fn parse_path_comment(first_line: &str) -> Option<&str> {
    let rest = first_line.trim_end().strip_prefix("--")?;
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::AnnotatedLine;
    use std::path::PathBuf;

    #[test]
    fn sanitization_table() {
        let cases = [
            ("my sketch!.np", "my_sketch_"),
            ("plain.np", "plain"),
            ("7seg.np", "7seg"),
            ("größe.np", "größe"),
            ("a-b.c.np", "a_b_c"),
            ("", "sketch"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                sanitize_script_name(Path::new(input)),
                expected,
                "input: {:?}",
                input
            );
        }
    }

    #[test]
    fn sanitization_is_deterministic() {
        let a = sanitize_script_name(Path::new("My Sketch.np"));
        let b = sanitize_script_name(Path::new("My Sketch.np"));
        assert_eq!(a, b);
        assert_eq!(generated_prefix(Path::new("My Sketch.np")), "my_sketch");
    }

    #[test]
    fn rendered_unit_carries_markers_and_path_comment() {
        let mut unit = SourceUnit::new(Some(PathBuf::from("/w/main.np")), "m_src0.lua".into());
        unit.lines.push(AnnotatedLine { text: "x = 1".into(), original_line: 3 });
        unit.lines.push(AnnotatedLine { text: "y = 2".into(), original_line: 7 });
        render_unit(&mut unit, "Main");

        let lines: Vec<&str> = unit.rendered.lines().collect();
        assert_eq!(lines[0], "-- /w/main.np");
        assert_eq!(lines[1], "local class, env = sketch.declare(\"Main\")");
        assert_eq!(lines[2], "local body = function()");
        assert_eq!(lines[3], "    x = 1 --@ 3");
        assert_eq!(lines[4], "    y = 2 --@ 7");
        assert_eq!(lines[5], "end");
        assert_eq!(*lines.last().unwrap(), "return class");
    }

    #[test]
    fn wrapper_has_no_path_and_emits_init_statements() {
        let unit = make_wrapper("m", "Main", &["count = 0".to_string()]);
        assert!(unit.is_wrapper());
        assert_eq!(unit.generated_name, "m_wrapper.lua");
        let lines: Vec<&str> = unit.rendered.lines().collect();
        assert_eq!(lines[0], "--");
        assert!(unit.rendered.contains("function class.new()"));
        assert!(unit.rendered.contains("    count = 0\n"));
        assert!(unit.rendered.contains("sketch.bind(class, self)"));
    }

    #[test]
    fn path_comment_round_trip() {
        assert_eq!(parse_path_comment("-- /w/main.np"), Some("/w/main.np"));
        assert_eq!(parse_path_comment("--"), None);
        assert_eq!(parse_path_comment("x = 1"), None);
    }
}
