pub(crate) mod conj;
pub(crate) mod slice;
