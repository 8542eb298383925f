use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// More field dimensions than the closed set supports.
    #[snafu(display("field shape {shape:?} has {dims} dimensions, at most {max} are supported"))]
    TooManyFieldDimensions { shape: Vec<usize>, dims: usize, max: usize },

    /// More tensor dimensions than the closed set supports.
    #[snafu(display("tensor shape {shape:?} has order {order}, at most {max} is supported"))]
    TensorOrderTooHigh { shape: Vec<usize>, order: usize, max: usize },

    #[snafu(display("zero extent in shape {shape:?}"))]
    ZeroExtent { shape: Vec<usize> },
}
