pub mod ask;
pub mod clear;
pub mod index;
pub mod search;
pub mod stats;
