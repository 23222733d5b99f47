pub mod download;
pub mod tarball;
