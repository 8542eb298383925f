use snafu::Snafu;

use crate::allocator::MemorySide;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Operation requires memory on the other side of the host/accelerator boundary.
    #[snafu(display("{operation} needs {expected} memory, buffer lives in {actual} memory"))]
    WrongSide { operation: &'static str, expected: MemorySide, actual: MemorySide },

    #[snafu(display("out of accelerator memory: requested {requested} bytes, {available} available"))]
    OutOfMemory { requested: usize, available: usize },

    /// Invalid device specification.
    #[snafu(display("invalid device: {device}"))]
    InvalidDevice { device: String },

    /// Buffer contents are borrowed elsewhere (kernel bound the same buffer twice).
    #[snafu(display("buffer already borrowed: {reason}"))]
    Borrowed { reason: String },
}
