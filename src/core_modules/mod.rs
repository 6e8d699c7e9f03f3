pub mod blob;
pub mod chunk;
pub mod chunks;
pub mod components;
pub mod disjoint_set;
pub mod files;
pub mod gap;
pub mod imaging;
pub mod mask;
pub mod tracker;
