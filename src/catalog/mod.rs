//! Movie catalog domain types.

mod filters;
mod movie;

pub use filters::{
    FilterError, Filters, Metadata, SortDirection, MAX_PAGE, MAX_PAGE_SIZE, MOVIE_SORT_SAFELIST,
};
pub use movie::{Movie, MovieFields, Runtime};

/// A filtered, paged movie listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieQuery {
    /// Every word must appear in the title, case-insensitively. Empty matches all.
    pub title: String,
    /// Every genre listed must be present on the movie.
    pub genres: Vec<String>,
    pub filters: Filters,
}

impl MovieQuery {
    pub fn matches(&self, movie: &Movie) -> bool {
        let title = movie.title.to_lowercase();
        let title_words: Vec<&str> = title.split_whitespace().collect();
        let title_ok = self
            .title
            .to_lowercase()
            .split_whitespace()
            .all(|word| title_words.contains(&word));

        title_ok && self.genres.iter().all(|g| movie.genres.contains(g))
    }
}
