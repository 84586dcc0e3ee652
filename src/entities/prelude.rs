pub use super::anime_details::Entity as AnimeDetails;
pub use super::authors::Entity as Authors;
pub use super::genres::Entity as Genres;
pub use super::manga_details::Entity as MangaDetails;
pub use super::studios::Entity as Studios;
pub use super::sync_runs::Entity as SyncRuns;
pub use super::title_authors::Entity as TitleAuthors;
pub use super::title_genres::Entity as TitleGenres;
pub use super::title_studios::Entity as TitleStudios;
pub use super::titles::Entity as Titles;
