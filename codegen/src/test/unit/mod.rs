pub mod filter_adjoint;
pub mod pointwise;
pub mod reduce;
pub mod synth;
pub mod workgroup;
