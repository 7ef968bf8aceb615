//! Movie records.

use chrono::{DateTime, Datelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::validation::{unique, Validator};

/// Running time in minutes, carried over the wire as `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} mins", self.0))
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl std::str::FromStr for Runtime {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const INVALID: &str = "invalid runtime format, expected \"<minutes> mins\"";
        let mut parts = s.split(' ');
        let (Some(minutes), Some("mins"), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(INVALID);
        };
        minutes.parse().map(Runtime).map_err(|_| INVALID)
    }
}

/// The mutable fields of a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFields {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

impl MovieFields {
    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.title.is_empty(), "title", "must be provided");
        v.check(self.title.len() <= 500, "title", "must not be more than 500 bytes long");

        v.check(self.year != 0, "year", "must be provided");
        v.check(self.year >= 1888, "year", "must be greater than 1888");
        v.check(self.year <= Utc::now().year(), "year", "must not be in the future");

        v.check(self.runtime.0 != 0, "runtime", "must be provided");
        v.check(self.runtime.0 > 0, "runtime", "must be a positive integer");

        v.check(!self.genres.is_empty(), "genres", "must contain at least 1 genre");
        v.check(self.genres.len() <= 5, "genres", "must not contain more than 5 genres");
        v.check(unique(&self.genres), "genres", "must not contain duplicate values");
    }
}

/// A stored movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero_runtime")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    pub fn fields(&self) -> MovieFields {
        MovieFields {
            title: self.title.clone(),
            year: self.year,
            runtime: self.runtime,
            genres: self.genres.clone(),
        }
    }

    pub fn apply(&mut self, fields: MovieFields) {
        self.title = fields.title;
        self.year = fields.year;
        self.runtime = fields.runtime;
        self.genres = fields.genres;
    }
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn is_zero_runtime(r: &Runtime) -> bool {
    r.0 == 0
}
