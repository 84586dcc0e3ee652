use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "titles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub source: String,
    pub content_type: String,
    pub external_id: i32,
    pub title: String,
    pub title_english: Option<String>,
    pub title_native: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub synopsis: Option<String>,
    pub cover_image: Option<String>,
    /// 0-10.
    pub score: Option<f32>,
    pub popularity: Option<i32>,
    pub favourites: Option<i32>,
    pub release_year: Option<i32>,
    pub start_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::anime_details::Entity")]
    AnimeDetails,
    #[sea_orm(has_one = "super::manga_details::Entity")]
    MangaDetails,
    #[sea_orm(has_many = "super::title_genres::Entity")]
    TitleGenres,
    #[sea_orm(has_many = "super::title_studios::Entity")]
    TitleStudios,
    #[sea_orm(has_many = "super::title_authors::Entity")]
    TitleAuthors,
}

impl Related<super::anime_details::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AnimeDetails.def()
    }
}

impl Related<super::manga_details::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MangaDetails.def()
    }
}

impl Related<super::genres::Entity> for Entity {
    fn to() -> RelationDef {
        super::title_genres::Relation::Genres.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::title_genres::Relation::Titles.def().rev())
    }
}

impl Related<super::studios::Entity> for Entity {
    fn to() -> RelationDef {
        super::title_studios::Relation::Studios.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::title_studios::Relation::Titles.def().rev())
    }
}

impl Related<super::authors::Entity> for Entity {
    fn to() -> RelationDef {
        super::title_authors::Relation::Authors.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::title_authors::Relation::Titles.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
