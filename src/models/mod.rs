pub mod media;
pub mod record;

pub use media::ExternalMedia;
pub use record::{AnimeDetailRow, DetailRow, MangaDetailRow, NormalizedRecord, TitleRow};
