mod characters;
mod notifications;
mod stories;
mod users;

pub(crate) use characters::{query_all_characters, query_character};
pub(crate) use stories::{query_story, query_story_part};
