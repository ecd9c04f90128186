//! Helpers on `nalgebra_sparse` CSC matrices used to assemble Jacobians.
pub(crate) mod conj;
pub(crate) mod slice;
pub(crate) mod stack;
