/// Kind of the scalars stored in a field.
///
/// Accelerator-side storage is always `f32` words: complex fields use two planes
/// (real block followed by imaginary block) and pixel fields are normalised to
/// `[0, 1]`. Host-side storage keeps pixels as one byte per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display, strum::IntoStaticStr)]
pub enum ElementKind {
    Float,
    Complex,
    Pixel,
}

impl ElementKind {
    /// Number of `f32` planes per element on the accelerator.
    pub const fn parts(&self) -> usize {
        match self {
            Self::Complex => 2,
            Self::Float | Self::Pixel => 1,
        }
    }

    /// Bytes per host-side scalar word.
    pub const fn host_bytes(&self) -> usize {
        match self {
            Self::Float | Self::Complex => 4,
            Self::Pixel => 1,
        }
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::Complex)
    }

    /// Element kind produced when values of this kind flow through arithmetic.
    ///
    /// Pixels are read as normalised floats, so arithmetic on them yields floats.
    pub const fn arithmetic(&self) -> Self {
        match self {
            Self::Pixel => Self::Float,
            other => *other,
        }
    }
}
