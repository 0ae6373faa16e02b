pub(crate) mod checkpoint;
pub(crate) mod shared;
pub(crate) mod sync;
pub(crate) mod validate;
