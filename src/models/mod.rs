pub mod ogp;

pub use ogp::{FetchOgpRequest, OgpRecord};
