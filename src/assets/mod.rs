// Asset access: packaged archives and plain files behind one open-for-reading seam.

pub mod archive;
pub mod container;
pub mod tail;
