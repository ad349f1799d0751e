//! Repository traits shared by every model

mod repository;

pub use repository::{BaseRepository, CrudRepository};
