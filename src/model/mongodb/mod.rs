mod groups;

pub use groups::MongoGroupDb;
