//! Kernel source text.
//!
//! Every kernel is OpenCL-C built from two pieces: a geometry preamble of
//! `#define`s per bound field, and an operation body taken from a `%slot%`
//! template or rendered line by line.
//!
//! # Geometry vocabulary
//!
//! For a field bound as `name`:
//!
//! ```c
//! #define name_layers 1
//! #define name_rows 64
//! #define name_columns 64
//! #define name_layerStride 4096
//! #define name_rowStride 64
//! #define name_tensorStride 4096
//! #define name_partStride 0
//! #define name_tensorElements 1
//! #define readName(_layer,_row,_column,_tensorElement) ...
//! #define writeName(_layer,_row,_column,_tensorElement,_value) ...
//! ```
//!
//! Complex fields additionally get `readNameImag` / `writeNameImag`, which
//! address the imaginary plane `name_partStride` words after the real one.

use itertools::Itertools;
use weft_dtype::{FieldLayout, FieldType};

use crate::error::{Result, UnresolvedPlaceholderSnafu};

/// Capitalise the first letter: `image` → `Image`.
fn accessor_suffix(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Geometry constants and accessors of one field.
pub fn geometry_macros(name: &str, field_type: &FieldType) -> Vec<String> {
    let layout = FieldLayout::of(field_type);
    let suffix = accessor_suffix(name);
    let offset = format!(
        "(_tensorElement)*{name}_tensorStride + (_layer)*{name}_layerStride + (_row)*{name}_rowStride + (_column)"
    );

    let mut lines = vec![
        format!("// {name}: {field_type}"),
        format!("#define {name}_layers {}", layout.layers),
        format!("#define {name}_rows {}", layout.rows),
        format!("#define {name}_columns {}", layout.columns),
        format!("#define {name}_layerStride {}", layout.layer_stride),
        format!("#define {name}_rowStride {}", layout.row_stride),
        format!("#define {name}_tensorStride {}", layout.tensor_stride),
        format!("#define {name}_partStride {}", layout.part_stride),
        format!("#define {name}_tensorElements {}", layout.tensor_elements),
        format!("#define read{suffix}(_layer,_row,_column,_tensorElement) {name}[{offset}]"),
        format!("#define write{suffix}(_layer,_row,_column,_tensorElement,_value) {name}[{offset}] = (_value)"),
    ];
    if field_type.element().is_complex() {
        lines.push(format!(
            "#define read{suffix}Imag(_layer,_row,_column,_tensorElement) {name}[{name}_partStride + {offset}]"
        ));
        lines.push(format!(
            "#define write{suffix}Imag(_layer,_row,_column,_tensorElement,_value) {name}[{name}_partStride + {offset}] = (_value)"
        ));
    }
    lines
}

/// Fill `%slot%` placeholders in `template`.
///
/// Any `%identifier%` left after substitution is an error. A lone `%` (the
/// modulo operator) is not a placeholder.
pub fn fill_template(template: &str, slots: &[(&str, String)]) -> Result<String> {
    let mut text = template.to_string();
    for (slot, value) in slots {
        text = text.replace(&format!("%{slot}%"), value);
    }
    if let Some(placeholder) = find_placeholder(&text) {
        return UnresolvedPlaceholderSnafu { placeholder }.fail();
    }
    Ok(text)
}

fn find_placeholder(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(open) = text[start..].find('%').map(|i| start + i) {
        let body_start = open + 1;
        let body_len = bytes[body_start..].iter().take_while(|b| b.is_ascii_alphanumeric() || **b == b'_').count();
        let close = body_start + body_len;
        if body_len > 0 && bytes.get(close) == Some(&b'%') && !bytes[body_start].is_ascii_digit() {
            return Some(text[body_start..close].to_string());
        }
        start = body_start;
    }
    None
}

/// Line-oriented source assembly.
#[derive(Debug, Default)]
pub struct SourceWriter {
    lines: Vec<String>,
    indent: usize,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl AsRef<str>) -> &mut Self {
        let line = line.as_ref();
        if line.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{line}", "    ".repeat(self.indent)));
        }
        self
    }

    pub fn lines<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
        self
    }

    /// Emit `header {` and indent until the matching [`Self::close`].
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        let header = header.as_ref();
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(format!("{header} {{"));
        }
        self.indent += 1;
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self.line("}")
    }

    pub fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    pub fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Kernel parameter list: `__global const float* a, __global float* out`.
pub fn parameter_list(inputs: &[&str], outputs: &[&str]) -> String {
    inputs
        .iter()
        .map(|name| format!("__global const float* restrict {name}"))
        .chain(outputs.iter().map(|name| format!("__global float* restrict {name}")))
        .join(", ")
}
