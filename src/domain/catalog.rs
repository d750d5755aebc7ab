//! The closed set of reviewable subject kinds.
//!
//! Every reviewable thing lives in one `subjects` table tagged with a
//! `SubjectKind`, so a review row always names exactly one subject and the
//! kind it was written against. There is no per-kind table to mix up.

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "subject_kind", rename_all = "snake_case")]
pub enum SubjectKind {
    Project,
    Song,
    Cover,
    MusicVideo,
    Podcast,
    Outfit,
    Event,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 7] = [
        SubjectKind::Project,
        SubjectKind::Song,
        SubjectKind::Cover,
        SubjectKind::MusicVideo,
        SubjectKind::Podcast,
        SubjectKind::Outfit,
        SubjectKind::Event,
    ];

    /// Kinds covered by the music search surface. A mutation to any of
    /// these drops every cached music search result.
    pub const MUSIC: [SubjectKind; 4] = [
        SubjectKind::Project,
        SubjectKind::Song,
        SubjectKind::Cover,
        SubjectKind::MusicVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Project => "project",
            SubjectKind::Song => "song",
            SubjectKind::Cover => "cover",
            SubjectKind::MusicVideo => "music_video",
            SubjectKind::Podcast => "podcast",
            SubjectKind::Outfit => "outfit",
            SubjectKind::Event => "event",
        }
    }

    pub fn is_music(self) -> bool {
        Self::MUSIC.contains(&self)
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SubjectKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "project" => Ok(SubjectKind::Project),
            "song" => Ok(SubjectKind::Song),
            "cover" => Ok(SubjectKind::Cover),
            "music_video" => Ok(SubjectKind::MusicVideo),
            "podcast" => Ok(SubjectKind::Podcast),
            "outfit" => Ok(SubjectKind::Outfit),
            "event" => Ok(SubjectKind::Event),
            _ => Err(()),
        }
    }
}
