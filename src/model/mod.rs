pub mod db;
pub mod group;
pub mod mongodb;
pub mod search;
pub mod subscription;
