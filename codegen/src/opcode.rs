//! Operation identities and their literal parameters.

use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;

use crate::error::{Error, UnknownOpcodeSnafu};

/// Single-operand point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnaryOp {
    Negate,
    Abs,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tanh,
    Sigmoid,
}

impl UnaryOp {
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Self::Negate => -x,
            Self::Abs => x.abs(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// OpenCL-C expression applying the operation to `x`.
    pub fn render(&self, x: &str) -> String {
        match self {
            Self::Negate => format!("(-{x})"),
            Self::Abs => format!("fabs({x})"),
            Self::Exp => format!("exp({x})"),
            Self::Log => format!("log({x})"),
            Self::Sqrt => format!("sqrt({x})"),
            Self::Sin => format!("sin({x})"),
            Self::Cos => format!("cos({x})"),
            Self::Tanh => format!("tanh({x})"),
            Self::Sigmoid => format!("(1.0f / (1.0f + exp(-{x})))"),
        }
    }
}

/// Two-operand point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Max,
    Min,
}

impl BinaryOp {
    pub fn apply(&self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => a / b,
            Self::Max => a.max(b),
            Self::Min => a.min(b),
        }
    }

    pub fn render(&self, a: &str, b: &str) -> String {
        match self {
            Self::Add => format!("({a} + {b})"),
            Self::Subtract => format!("({a} - {b})"),
            Self::Multiply => format!("({a} * {b})"),
            Self::Divide => format!("({a} / {b})"),
            Self::Max => format!("fmax({a}, {b})"),
            Self::Min => format!("fmin({a}, {b})"),
        }
    }

    /// Whether the operation is defined on complex operands.
    pub const fn complex_defined(&self) -> bool {
        matches!(self, Self::Add | Self::Subtract | Self::Multiply | Self::Divide)
    }

    /// Complex form on `(re, im)` pairs.
    pub fn apply_complex(&self, (ar, ai): (f32, f32), (br, bi): (f32, f32)) -> (f32, f32) {
        match self {
            Self::Add => (ar + br, ai + bi),
            Self::Subtract => (ar - br, ai - bi),
            Self::Multiply => (ar * br - ai * bi, ar * bi + ai * br),
            Self::Divide => {
                let denominator = br * br + bi * bi;
                ((ar * br + ai * bi) / denominator, (ai * br - ar * bi) / denominator)
            }
            Self::Max | Self::Min => (f32::NAN, f32::NAN),
        }
    }
}

/// Reductions over a whole field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ReduceOp {
    Sum,
    Max,
}

impl ReduceOp {
    pub const fn identity(&self) -> f32 {
        match self {
            Self::Sum => 0.0,
            Self::Max => f32::NEG_INFINITY,
        }
    }

    pub fn combine(&self, a: f32, b: f32) -> f32 {
        match self {
            Self::Sum => a + b,
            Self::Max => a.max(b),
        }
    }

    pub const fn identity_literal(&self) -> &'static str {
        match self {
            Self::Sum => "0.0f",
            Self::Max => "-INFINITY",
        }
    }

    pub fn render(&self, a: &str, b: &str) -> String {
        match self {
            Self::Sum => format!("{a} + {b}"),
            Self::Max => format!("fmax({a}, {b})"),
        }
    }
}

/// Treatment of samples outside the field for convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BorderPolicy {
    /// Samples outside the field read as zero.
    Zero,
    /// Indices wrap around.
    Cyclic,
    /// Indices clamp to the nearest edge.
    Clamp,
}

impl BorderPolicy {
    /// Resolve a possibly out-of-range index; `None` reads as zero.
    pub fn resolve(&self, index: isize, extent: usize) -> Option<usize> {
        let extent = extent as isize;
        match self {
            Self::Zero => (0..extent).contains(&index).then_some(index as usize),
            Self::Cyclic => Some(index.rem_euclid(extent) as usize),
            Self::Clamp => Some(index.clamp(0, extent - 1) as usize),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FftDirection {
    Forward,
    /// Inverse transform, scaled by `1 / N`.
    Inverse,
}

/// Operation identity plus literal parameters.
///
/// Accelerator operations are synthesized into kernels; the remaining
/// variants identify host-side kernels of a circuit.
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    Unary(UnaryOp),
    /// Multiply by a constant.
    Scale(f32),
    /// Add a constant.
    Offset(f32),
    /// Real binary operation; the second operand may be a 0-D scalar field.
    Binary(BinaryOp),
    /// Binary operation on complex fields.
    ComplexBinary(BinaryOp),
    /// Sum of the tensor elements at each point.
    TensorReduce,
    /// Whole-field reduction to a 0-D field, per tensor element.
    FieldReduce(ReduceOp),
    /// Direct 2-D convolution of an image with an odd-sized kernel.
    Convolve(BorderPolicy),
    /// Correlation of an image with a same-sized field, producing a
    /// `size x size` filter.
    FilterAdjoint { size: usize },
    Fft(FftDirection),
    /// Field holding fixed initial values.
    Constant,
    /// Values read from an external sensor.
    Sensor { name: String },
    /// Values handed to an external actuator.
    Actuator { name: String },
    /// Computation supplied by the application and run on the host.
    Host { name: String },
    /// One-cycle delayed copy of a driver register.
    Recurrence,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Whether the operation runs on the host rather than as an accelerator kernel.
    pub fn is_host_side(&self) -> bool {
        matches!(
            self,
            Self::Constant | Self::Sensor { .. } | Self::Actuator { .. } | Self::Host { .. } | Self::Recurrence
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary(op) => write!(f, "{op}"),
            Self::Scale(factor) => write!(f, "scale({factor})"),
            Self::Offset(offset) => write!(f, "offset({offset})"),
            Self::Binary(op) => write!(f, "{op}"),
            Self::ComplexBinary(op) => write!(f, "complex_{op}"),
            Self::FieldReduce(op) => write!(f, "field_reduce_{op}"),
            Self::Convolve(border) => write!(f, "convolve({border})"),
            Self::FilterAdjoint { size } => write!(f, "filter_adjoint({size})"),
            Self::Fft(direction) => write!(f, "fft_{direction}"),
            Self::Sensor { name } => write!(f, "sensor({name})"),
            Self::Actuator { name } => write!(f, "actuator({name})"),
            Self::Host { name } => write!(f, "host({name})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Split `family(argument)` into its parts.
fn call(text: &str) -> Option<(&str, &str)> {
    let (family, rest) = text.split_once('(')?;
    Some((family, rest.strip_suffix(')')?))
}

fn find<T: IntoEnumIterator + fmt::Display>(name: &str) -> Option<T> {
    T::iter().find(|candidate| candidate.to_string() == name)
}

/// Parses the [`Display`](fmt::Display) form back into an opcode.
impl FromStr for Opcode {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownOpcodeSnafu { name: text.to_string() }.build();

        if let Some((family, argument)) = call(text) {
            return match family {
                "scale" => argument.parse().map(Self::Scale).map_err(|_| unknown()),
                "offset" => argument.parse().map(Self::Offset).map_err(|_| unknown()),
                "convolve" => find(argument).map(Self::Convolve).ok_or_else(unknown),
                "filter_adjoint" => argument.parse().map(|size| Self::FilterAdjoint { size }).map_err(|_| unknown()),
                "sensor" => Ok(Self::Sensor { name: argument.to_string() }),
                "actuator" => Ok(Self::Actuator { name: argument.to_string() }),
                "host" => Ok(Self::Host { name: argument.to_string() }),
                _ => Err(unknown()),
            };
        }
        if let Some(op) = text.strip_prefix("complex_") {
            return find(op).map(Self::ComplexBinary).ok_or_else(unknown);
        }
        if let Some(op) = text.strip_prefix("field_reduce_") {
            return find(op).map(Self::FieldReduce).ok_or_else(unknown);
        }
        if let Some(direction) = text.strip_prefix("fft_") {
            return find(direction).map(Self::Fft).ok_or_else(unknown);
        }
        match text {
            "tensor_reduce" => Ok(Self::TensorReduce),
            "constant" => Ok(Self::Constant),
            "recurrence" => Ok(Self::Recurrence),
            _ => find(text).map(Self::Unary).or_else(|| find(text).map(Self::Binary)).ok_or_else(unknown),
        }
    }
}
