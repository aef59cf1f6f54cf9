pub mod archive;
pub mod paging;
